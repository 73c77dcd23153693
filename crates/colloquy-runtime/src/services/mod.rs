//! Per-plugin service templates and the per-request services built from them.
//!
//! A [`ServiceTemplate`] is constructed once when a plugin loads and holds
//! everything that is expensive or shared: the plugin's scoped file system,
//! its language-generation engine and the host's collaborators. Each request
//! combines an `Arc` of that template with a [`RequestContext`] to produce a
//! [`PluginServices`] value owned by that request alone. The template is
//! never mutated; unloading replaces it in the provider's cache.

mod collaborators;
mod factory;
mod state;

use std::fmt;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::Span;
use uuid::Uuid;

use crate::fs::PluginFileSystem;
use crate::strong_name::PluginStrongName;

pub use collaborators::{
    CollaboratorError, EntityMatch, EntityResolver, HttpClient, HttpClientFactory, HttpRequest,
    HttpResponse, LanguageGenerationBuilder, LanguageGenerator, OAuthManager, SharedCollaborators,
    SpeechRecognizerFactory, SpeechSynthesizer,
};
pub use factory::{DefaultServiceContextFactory, ServiceContextFactory};
#[cfg(test)]
pub(crate) use collaborators::{MockLanguageGenerationBuilder, MockLanguageGenerator};
#[cfg(test)]
pub(crate) use factory::MockServiceContextFactory;
pub use state::{
    ContextualEntity, DialogAction, DialogActionCache, Entity, EntityContext, IdCache,
    KeyValueStore, SideEffects, WebData, WebDataCache,
};

/// Mount point of a plugin's static views inside its file system.
pub const VIEWS_MOUNT: &str = "views";

/// Mount point of a plugin's private data inside its file system.
pub const DATA_MOUNT: &str = "data";

/// Directory of the host content tree holding per-plugin views.
pub const CONTENT_VIEWS_ROOT: &str = "views";

/// Directory of the host content tree holding per-plugin data.
pub const CONTENT_DATA_ROOT: &str = "plugindata";

const SERVICES_TARGET: &str = "colloquy_runtime::services";

/// Expensive, shared part of a plugin's services.
pub struct ServiceTemplate {
    strong_name: PluginStrongName,
    file_system: Arc<dyn PluginFileSystem>,
    data_directory: Utf8PathBuf,
    language_generator: Option<Arc<dyn LanguageGenerator>>,
    collaborators: SharedCollaborators,
}

impl ServiceTemplate {
    /// Creates a template over `file_system` with data under [`DATA_MOUNT`].
    #[must_use]
    pub fn new(strong_name: PluginStrongName, file_system: Arc<dyn PluginFileSystem>) -> Self {
        Self {
            strong_name,
            file_system,
            data_directory: Utf8PathBuf::from(DATA_MOUNT),
            language_generator: None,
            collaborators: SharedCollaborators::default(),
        }
    }

    /// Overrides the data directory.
    #[must_use]
    pub fn with_data_directory(mut self, data_directory: impl Into<Utf8PathBuf>) -> Self {
        self.data_directory = data_directory.into();
        self
    }

    /// Attaches a language-generation engine.
    #[must_use]
    pub fn with_language_generator(mut self, generator: Arc<dyn LanguageGenerator>) -> Self {
        self.language_generator = Some(generator);
        self
    }

    /// Attaches shared collaborators.
    #[must_use]
    pub fn with_collaborators(mut self, collaborators: SharedCollaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    /// Plugin the template belongs to.
    #[must_use]
    pub const fn strong_name(&self) -> &PluginStrongName {
        &self.strong_name
    }
}

impl fmt::Debug for ServiceTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceTemplate")
            .field("strong_name", &self.strong_name)
            .field("data_directory", &self.data_directory)
            .field("language_generator", &self.language_generator.is_some())
            .field("collaborators", &self.collaborators)
            .finish_non_exhaustive()
    }
}

/// Request-specific values substituted into a template.
///
/// Everything except the cancellation token is serialisable so the context
/// can cross into a guest process, where a fresh token is attached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestContext {
    /// Trace identifier propagated into logs.
    #[serde(default)]
    pub trace_id: Option<Uuid>,
    /// Session state at the start of the turn.
    #[serde(default)]
    pub session: KeyValueStore,
    /// Plugin-scoped profile data.
    #[serde(default)]
    pub local_profile: KeyValueStore,
    /// Profile data shared across plugins.
    #[serde(default)]
    pub global_profile: KeyValueStore,
    /// Entity context at the start of the turn.
    #[serde(default)]
    pub entity_context: EntityContext,
    /// Entities the orchestrator considers relevant.
    #[serde(default)]
    pub contextual_entities: Vec<ContextualEntity>,
    /// Cancellation signal for the request.
    #[serde(skip)]
    pub cancellation: CancellationToken,
}

impl RequestContext {
    /// An empty context with a fresh trace id.
    #[must_use]
    pub fn traced() -> Self {
        Self {
            trace_id: Some(Uuid::new_v4()),
            ..Self::default()
        }
    }

    /// Uses `token` as the cancellation signal.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// Capabilities handed to a plugin for one call.
///
/// Cloning is cheap and the clones share the request's stores, so the
/// executor can read back what the plugin wrote.
#[derive(Clone)]
pub struct PluginServices {
    template: Arc<ServiceTemplate>,
    trace_id: Option<Uuid>,
    span: Span,
    session: Arc<Mutex<KeyValueStore>>,
    local_profile: Arc<Mutex<KeyValueStore>>,
    global_profile: Arc<Mutex<KeyValueStore>>,
    entity_context: Arc<Mutex<EntityContext>>,
    contextual_entities: Arc<[ContextualEntity]>,
    dialog_actions: Arc<Mutex<DialogActionCache>>,
    web_data: Arc<Mutex<WebDataCache>>,
    cancellation: CancellationToken,
}

impl PluginServices {
    /// Combines a template with request-specific state.
    ///
    /// The dialog-action and web-data caches always start empty.
    #[must_use]
    pub fn new(template: Arc<ServiceTemplate>, request: RequestContext) -> Self {
        let span = tracing::info_span!(
            target: SERVICES_TARGET,
            "plugin_request",
            plugin = %template.strong_name(),
            trace_id = tracing::field::Empty,
        );
        if let Some(trace_id) = request.trace_id {
            span.record("trace_id", tracing::field::display(trace_id));
        }
        Self {
            template,
            trace_id: request.trace_id,
            span,
            session: Arc::new(Mutex::new(request.session)),
            local_profile: Arc::new(Mutex::new(request.local_profile)),
            global_profile: Arc::new(Mutex::new(request.global_profile)),
            entity_context: Arc::new(Mutex::new(request.entity_context)),
            contextual_entities: request.contextual_entities.into(),
            dialog_actions: Arc::new(Mutex::new(DialogActionCache::default())),
            web_data: Arc::new(Mutex::new(WebDataCache::default())),
            cancellation: request.cancellation,
        }
    }

    /// Services for lifecycle hooks, which run outside any request.
    #[must_use]
    pub fn for_lifecycle(template: Arc<ServiceTemplate>) -> Self {
        Self::new(template, RequestContext::default())
    }

    /// Plugin the services belong to.
    #[must_use]
    pub fn strong_name(&self) -> &PluginStrongName {
        self.template.strong_name()
    }

    /// The plugin's file system.
    #[must_use]
    pub fn file_system(&self) -> &Arc<dyn PluginFileSystem> {
        &self.template.file_system
    }

    /// Directory of the plugin's private data within [`Self::file_system`].
    #[must_use]
    pub fn data_directory(&self) -> &Utf8Path {
        &self.template.data_directory
    }

    /// The plugin's language-generation engine, if one was built.
    #[must_use]
    pub fn language_generator(&self) -> Option<&Arc<dyn LanguageGenerator>> {
        self.template.language_generator.as_ref()
    }

    /// Host collaborators.
    #[must_use]
    pub fn collaborators(&self) -> &SharedCollaborators {
        &self.template.collaborators
    }

    /// Trace identifier of the request.
    #[must_use]
    pub const fn trace_id(&self) -> Option<Uuid> {
        self.trace_id
    }

    /// Span that plugin calls for this request run in.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// Session state.
    #[must_use]
    pub fn session(&self) -> MutexGuard<'_, KeyValueStore> {
        self.session.lock()
    }

    /// Plugin-scoped profile.
    #[must_use]
    pub fn local_profile(&self) -> MutexGuard<'_, KeyValueStore> {
        self.local_profile.lock()
    }

    /// Profile shared across plugins.
    #[must_use]
    pub fn global_profile(&self) -> MutexGuard<'_, KeyValueStore> {
        self.global_profile.lock()
    }

    /// Entity context.
    #[must_use]
    pub fn entity_context(&self) -> MutexGuard<'_, EntityContext> {
        self.entity_context.lock()
    }

    /// Entities the orchestrator marked as relevant.
    #[must_use]
    pub fn contextual_entities(&self) -> &[ContextualEntity] {
        &self.contextual_entities
    }

    /// Actions registered in this request.
    #[must_use]
    pub fn dialog_actions(&self) -> MutexGuard<'_, DialogActionCache> {
        self.dialog_actions.lock()
    }

    /// Web data published in this request.
    #[must_use]
    pub fn web_data(&self) -> MutexGuard<'_, WebDataCache> {
        self.web_data.lock()
    }

    /// Cancellation signal of the request.
    #[must_use]
    pub const fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Copies everything written through these services.
    #[must_use]
    pub fn side_effects(&self) -> SideEffects {
        SideEffects {
            session: self.session.lock().clone(),
            local_profile: self.local_profile.lock().clone(),
            global_profile: self.global_profile.lock().clone(),
            entity_context: self.entity_context.lock().clone(),
            dialog_actions: self.dialog_actions.lock().clone(),
            web_data: self.web_data.lock().clone(),
        }
    }
}

impl fmt::Debug for PluginServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginServices")
            .field("strong_name", self.strong_name())
            .field("trace_id", &self.trace_id)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests;
