//! Placement-transparent access to plugins.
//!
//! Callers hold an `Arc<dyn PluginProvider>` and cannot tell whether the
//! plugins run in-process ([`InProcessPluginProvider`]) or in a guest process
//! ([`crate::isolation::IsolatedPluginProvider`]).

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::definition::LoadedPluginInformation;
use crate::dialog::{
    CrossDomainContext, CrossDomainRequestData, CrossDomainResponseResponse,
    DialogProcessingResponse, QueryWithContext, TriggerProcessingResponse,
};
use crate::error::PluginError;
use crate::loader::PluginLoader;
use crate::services::{PluginServices, RequestContext, ServiceContextFactory, ServiceTemplate};
use crate::strong_name::PluginStrongName;
use crate::view::CachedAsset;

const PROVIDER_TARGET: &str = "colloquy_runtime::provider";

/// Lifecycle, dialog and view operations on a set of plugins.
#[async_trait]
pub trait PluginProvider: Send + Sync {
    /// Plugins this provider can load, sorted.
    async fn available_plugins(&self) -> Result<Vec<PluginStrongName>, PluginError>;

    /// Loads a plugin and reports its metadata.
    async fn load(
        &self,
        strong_name: &PluginStrongName,
    ) -> Result<LoadedPluginInformation, PluginError>;

    /// Unloads a plugin. Returns `false` when its unload hook failed.
    async fn unload(&self, strong_name: &PluginStrongName) -> Result<bool, PluginError>;

    /// Runs one dialog turn at `entry_point`, or at the default entry point
    /// when it is empty.
    async fn launch(
        &self,
        strong_name: &PluginStrongName,
        entry_point: &str,
        query: QueryWithContext,
        context: RequestContext,
    ) -> Result<DialogProcessingResponse, PluginError>;

    /// Asks a plugin whether it wants to react to a query.
    async fn trigger(
        &self,
        strong_name: &PluginStrongName,
        query: QueryWithContext,
        context: RequestContext,
    ) -> Result<TriggerProcessingResponse, PluginError>;

    /// Asks a plugin which slots it needs for a hand-off.
    async fn cross_domain_request(
        &self,
        strong_name: &PluginStrongName,
        target_intent: &str,
    ) -> Result<Option<CrossDomainRequestData>, PluginError>;

    /// Hands a conversation to a plugin.
    async fn cross_domain_response(
        &self,
        strong_name: &PluginStrongName,
        context: CrossDomainContext,
        request: RequestContext,
    ) -> Result<CrossDomainResponseResponse, PluginError>;

    /// Fetches a static view asset.
    async fn fetch_view_data(
        &self,
        strong_name: &PluginStrongName,
        path: &str,
        if_modified_since: Option<OffsetDateTime>,
    ) -> Result<Option<CachedAsset>, PluginError>;
}

enum TemplateSlot {
    Ready(Arc<ServiceTemplate>),
    Unloaded,
}

/// Provider running plugins on the caller's runtime.
///
/// Service templates are built on first load and dropped on unload; each
/// call clones the current template into fresh per-request services.
pub struct InProcessPluginProvider {
    loader: Arc<PluginLoader>,
    factory: Arc<dyn ServiceContextFactory>,
    templates: DashMap<PluginStrongName, TemplateSlot>,
}

impl InProcessPluginProvider {
    /// Creates a provider over `loader` building templates with `factory`.
    #[must_use]
    pub fn new(loader: Arc<PluginLoader>, factory: Arc<dyn ServiceContextFactory>) -> Self {
        Self {
            loader,
            factory,
            templates: DashMap::new(),
        }
    }

    /// The loader holding the registered plugins.
    #[must_use]
    pub const fn loader(&self) -> &Arc<PluginLoader> {
        &self.loader
    }

    /// Reports whether a usable template exists for `strong_name`.
    #[must_use]
    pub fn has_template(&self, strong_name: &PluginStrongName) -> bool {
        matches!(
            self.templates.get(strong_name).as_deref(),
            Some(TemplateSlot::Ready(_))
        )
    }

    fn template(&self, strong_name: &PluginStrongName) -> Result<Arc<ServiceTemplate>, PluginError> {
        match self.templates.get(strong_name).as_deref() {
            Some(TemplateSlot::Ready(template)) => Ok(Arc::clone(template)),
            Some(TemplateSlot::Unloaded) | None => Err(PluginError::NotLoaded {
                strong_name: strong_name.clone(),
            }),
        }
    }

    fn clone_services(
        &self,
        strong_name: &PluginStrongName,
        context: RequestContext,
    ) -> Result<PluginServices, PluginError> {
        self.loader.require_registered(strong_name)?;
        let template = self.template(strong_name)?;
        Ok(PluginServices::new(template, context))
    }

    fn template_for_load(
        &self,
        strong_name: &PluginStrongName,
    ) -> Result<Arc<ServiceTemplate>, PluginError> {
        self.loader.require_registered(strong_name)?;
        if let Ok(template) = self.template(strong_name) {
            return Ok(template);
        }
        let template = Arc::new(self.factory.build_template(strong_name)?);
        self.templates
            .insert(strong_name.clone(), TemplateSlot::Ready(Arc::clone(&template)));
        debug!(target: PROVIDER_TARGET, plugin = %strong_name, "service template built");
        Ok(template)
    }
}

impl fmt::Debug for InProcessPluginProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InProcessPluginProvider")
            .field("loader", &self.loader)
            .field("templates", &self.templates.len())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl PluginProvider for InProcessPluginProvider {
    async fn available_plugins(&self) -> Result<Vec<PluginStrongName>, PluginError> {
        Ok(self.loader.available_plugins())
    }

    async fn load(
        &self,
        strong_name: &PluginStrongName,
    ) -> Result<LoadedPluginInformation, PluginError> {
        let template = self.template_for_load(strong_name)?;
        let services = PluginServices::for_lifecycle(template);
        let loaded = self.loader.load(strong_name, &services).await;
        if let Err(error) = &loaded {
            warn!(target: PROVIDER_TARGET, plugin = %strong_name, %error, "plugin load failed");
            if self.loader.executor().phase(strong_name).is_none() {
                self.templates
                    .insert(strong_name.clone(), TemplateSlot::Unloaded);
            }
        }
        loaded
    }

    async fn unload(&self, strong_name: &PluginStrongName) -> Result<bool, PluginError> {
        self.loader.require_registered(strong_name)?;
        let Ok(template) = self.template(strong_name) else {
            return Err(PluginError::Lifecycle {
                strong_name: strong_name.clone(),
                message: "unload without matching load".to_owned(),
            });
        };
        let services = PluginServices::for_lifecycle(template);
        let unloaded = self.loader.unload(strong_name, &services).await;
        if self.loader.executor().phase(strong_name).is_none() {
            self.templates
                .insert(strong_name.clone(), TemplateSlot::Unloaded);
        }
        unloaded
    }

    async fn launch(
        &self,
        strong_name: &PluginStrongName,
        entry_point: &str,
        query: QueryWithContext,
        context: RequestContext,
    ) -> Result<DialogProcessingResponse, PluginError> {
        let services = self.clone_services(strong_name, context)?;
        self.loader
            .invoke(strong_name, entry_point, query, services)
            .await
    }

    async fn trigger(
        &self,
        strong_name: &PluginStrongName,
        query: QueryWithContext,
        context: RequestContext,
    ) -> Result<TriggerProcessingResponse, PluginError> {
        let services = self.clone_services(strong_name, context)?;
        self.loader.trigger(strong_name, &query, &services).await
    }

    async fn cross_domain_request(
        &self,
        strong_name: &PluginStrongName,
        target_intent: &str,
    ) -> Result<Option<CrossDomainRequestData>, PluginError> {
        self.loader.require_registered(strong_name)?;
        drop(self.template(strong_name)?);
        self.loader
            .cross_domain_request(strong_name, target_intent)
            .await
    }

    async fn cross_domain_response(
        &self,
        strong_name: &PluginStrongName,
        context: CrossDomainContext,
        request: RequestContext,
    ) -> Result<CrossDomainResponseResponse, PluginError> {
        let services = self.clone_services(strong_name, request)?;
        self.loader
            .cross_domain_response(strong_name, &context, &services)
            .await
    }

    async fn fetch_view_data(
        &self,
        strong_name: &PluginStrongName,
        path: &str,
        if_modified_since: Option<OffsetDateTime>,
    ) -> Result<Option<CachedAsset>, PluginError> {
        self.loader
            .fetch_view_data(strong_name, path, if_modified_since)
    }
}
