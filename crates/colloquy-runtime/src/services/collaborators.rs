//! Capabilities shared by every plugin and owned outside the runtime.
//!
//! The runtime does not implement speech, entity resolution, credentials or
//! HTTP. It only threads these handles from the host into each plugin's
//! services.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::fs::PluginFileSystem;
use crate::strong_name::PluginStrongName;

/// Failure reported by an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{service}: {message}")]
pub struct CollaboratorError {
    /// Collaborator that failed.
    pub service: &'static str,
    /// Description of the failure.
    pub message: String,
}

impl CollaboratorError {
    /// Creates an error for `service`.
    #[must_use]
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
        }
    }
}

/// A candidate chosen by an [`EntityResolver`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EntityMatch {
    /// Index into the candidate list.
    pub candidate: usize,
    /// Match confidence in `[0, 1]`.
    pub confidence: f32,
}

/// Resolves free text against a list of candidate names.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    /// Ranks `candidates` against `input`, best first.
    async fn resolve(
        &self,
        input: &str,
        candidates: &[String],
        locale: &str,
    ) -> Result<Vec<EntityMatch>, CollaboratorError>;
}

/// Renders SSML to audio.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Synthesises `ssml` for `locale`.
    async fn synthesize(&self, ssml: &str, locale: &str) -> Result<Vec<u8>, CollaboratorError>;
}

/// Creates speech recognisers on demand.
pub trait SpeechRecognizerFactory: Send + Sync {
    /// Reports whether recognition is available for `locale`.
    fn is_locale_supported(&self, locale: &str) -> bool;
}

/// Issues OAuth tokens on behalf of a plugin.
#[async_trait]
pub trait OAuthManager: Send + Sync {
    /// Returns a valid token for `user_id`, or `None` if the user has not
    /// authorised `plugin`.
    async fn token(
        &self,
        user_id: &str,
        plugin: &PluginStrongName,
    ) -> Result<Option<String>, CollaboratorError>;
}

/// Minimal HTTP request description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Method, for example `GET`.
    pub method: String,
    /// Absolute URL.
    pub url: String,
    /// Request headers.
    pub headers: BTreeMap<String, String>,
    /// Request body.
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// A `GET` request for `url`.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            method: "GET".to_owned(),
            url: url.into(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }
}

/// Minimal HTTP response description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Response body.
    pub body: Vec<u8>,
}

/// An HTTP client handed to plugins.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends `request`.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, CollaboratorError>;
}

/// Builds HTTP clients, typically with per-plugin policy applied.
pub trait HttpClientFactory: Send + Sync {
    /// Creates a client for `plugin`.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] when the plugin may not make requests.
    fn create(&self, plugin: &PluginStrongName) -> Result<Arc<dyn HttpClient>, CollaboratorError>;
}

/// A loaded language-generation engine for one plugin.
#[cfg_attr(test, mockall::automock)]
pub trait LanguageGenerator: Send + Sync {
    /// Renders template `name` with `variables` in `locale`.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] for unknown templates or locales.
    fn render(
        &self,
        name: &str,
        variables: &BTreeMap<String, String>,
        locale: &str,
    ) -> Result<String, CollaboratorError>;
}

/// Builds a [`LanguageGenerator`] from a plugin's own files.
#[cfg_attr(test, mockall::automock)]
pub trait LanguageGenerationBuilder: Send + Sync {
    /// Builds the engine for `plugin` reading templates from `files`.
    ///
    /// # Errors
    ///
    /// Returns [`CollaboratorError`] when the templates cannot be loaded.
    fn build(
        &self,
        plugin: &PluginStrongName,
        files: Arc<dyn PluginFileSystem>,
    ) -> Result<Arc<dyn LanguageGenerator>, CollaboratorError>;
}

/// Handles to the collaborators shared by every plugin of a host.
#[derive(Clone, Default)]
pub struct SharedCollaborators {
    entity_resolver: Option<Arc<dyn EntityResolver>>,
    speech_synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    speech_recognizers: Option<Arc<dyn SpeechRecognizerFactory>>,
    oauth: Option<Arc<dyn OAuthManager>>,
    http: Option<Arc<dyn HttpClientFactory>>,
}

impl SharedCollaborators {
    /// No collaborators.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the entity resolver.
    #[must_use]
    pub fn with_entity_resolver(mut self, resolver: Arc<dyn EntityResolver>) -> Self {
        self.entity_resolver = Some(resolver);
        self
    }

    /// Sets the speech synthesiser.
    #[must_use]
    pub fn with_speech_synthesizer(mut self, synthesizer: Arc<dyn SpeechSynthesizer>) -> Self {
        self.speech_synthesizer = Some(synthesizer);
        self
    }

    /// Sets the speech recogniser factory.
    #[must_use]
    pub fn with_speech_recognizers(mut self, factory: Arc<dyn SpeechRecognizerFactory>) -> Self {
        self.speech_recognizers = Some(factory);
        self
    }

    /// Sets the OAuth manager.
    #[must_use]
    pub fn with_oauth(mut self, oauth: Arc<dyn OAuthManager>) -> Self {
        self.oauth = Some(oauth);
        self
    }

    /// Sets the HTTP client factory.
    #[must_use]
    pub fn with_http(mut self, http: Arc<dyn HttpClientFactory>) -> Self {
        self.http = Some(http);
        self
    }

    /// Entity resolver, if configured.
    #[must_use]
    pub const fn entity_resolver(&self) -> Option<&Arc<dyn EntityResolver>> {
        self.entity_resolver.as_ref()
    }

    /// Speech synthesiser, if configured.
    #[must_use]
    pub const fn speech_synthesizer(&self) -> Option<&Arc<dyn SpeechSynthesizer>> {
        self.speech_synthesizer.as_ref()
    }

    /// Speech recogniser factory, if configured.
    #[must_use]
    pub const fn speech_recognizers(&self) -> Option<&Arc<dyn SpeechRecognizerFactory>> {
        self.speech_recognizers.as_ref()
    }

    /// OAuth manager, if configured.
    #[must_use]
    pub const fn oauth(&self) -> Option<&Arc<dyn OAuthManager>> {
        self.oauth.as_ref()
    }

    /// HTTP client factory, if configured.
    #[must_use]
    pub const fn http(&self) -> Option<&Arc<dyn HttpClientFactory>> {
        self.http.as_ref()
    }
}

impl fmt::Debug for SharedCollaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedCollaborators")
            .field("entity_resolver", &self.entity_resolver.is_some())
            .field("speech_synthesizer", &self.speech_synthesizer.is_some())
            .field("speech_recognizers", &self.speech_recognizers.is_some())
            .field("oauth", &self.oauth.is_some())
            .field("http", &self.http.is_some())
            .finish()
    }
}
