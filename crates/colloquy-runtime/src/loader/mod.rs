//! Plugin registry and the entry point for lifecycle and dialog calls.
//!
//! The [`PluginLoader`] owns the set of registered plugin instances, checks
//! that no two registered plugins claim the same linguistic domain, and delegates
//! execution to its [`PluginExecutor`]. It also serves static view assets
//! from the host's content tree.

use std::collections::HashMap;
use std::sync::Arc;

use camino::Utf8Path;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::definition::{
    ConversationTree, DialogPlugin, LoadedPluginInformation, PluginInformation, PluginInstance,
};
use crate::dialog::{
    CrossDomainContext, CrossDomainRequestData, CrossDomainResponseResponse,
    DialogProcessingResponse, QueryWithContext, TriggerProcessingResponse,
};
use crate::error::PluginError;
use crate::executor::PluginExecutor;
use crate::fs::{FsError, PluginFileSystem, normalise};
use crate::services::{CONTENT_VIEWS_ROOT, PluginServices};
use crate::strong_name::PluginStrongName;
use crate::view::{CachedAsset, mime_type_for};

const LOADER_TARGET: &str = "colloquy_runtime::loader";

/// A registered plugin and the metadata built on its first load.
struct RegisteredPlugin {
    instance: PluginInstance,
    conversation_tree: OnceCell<Option<ConversationTree>>,
    plugin_information: OnceCell<Option<PluginInformation>>,
}

impl RegisteredPlugin {
    fn new(instance: PluginInstance) -> Self {
        Self {
            instance,
            conversation_tree: OnceCell::new(),
            plugin_information: OnceCell::new(),
        }
    }
}

/// Registry of plugin instances.
pub struct PluginLoader {
    executor: PluginExecutor,
    plugins: RwLock<HashMap<PluginStrongName, Arc<RegisteredPlugin>>>,
    content: Arc<dyn PluginFileSystem>,
}

impl PluginLoader {
    /// Creates an empty loader serving views from `content`.
    #[must_use]
    pub fn new(executor: PluginExecutor, content: Arc<dyn PluginFileSystem>) -> Self {
        Self {
            executor,
            plugins: RwLock::new(HashMap::new()),
            content,
        }
    }

    /// The executor running this loader's plugins.
    #[must_use]
    pub const fn executor(&self) -> &PluginExecutor {
        &self.executor
    }

    /// Registers a plugin. A plugin with the same strong name is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidEntryPoints`] when the plugin declares
    /// continuations the host cannot call.
    pub fn register<P: DialogPlugin>(&self, plugin: Arc<P>) -> Result<PluginStrongName, PluginError> {
        self.register_instance(PluginInstance::new(plugin))
    }

    /// Registers an already wrapped plugin instance.
    ///
    /// # Errors
    ///
    /// As for [`Self::register`].
    pub fn register_instance(&self, instance: PluginInstance) -> Result<PluginStrongName, PluginError> {
        let strong_name = instance.strong_name().clone();
        instance
            .entry_points()
            .validate()
            .map_err(|violations| PluginError::InvalidEntryPoints {
                strong_name: strong_name.clone(),
                violations: violations.iter().map(ToString::to_string).collect(),
            })?;
        let previous = self
            .plugins
            .write()
            .insert(strong_name.clone(), Arc::new(RegisteredPlugin::new(instance)));
        info!(
            target: LOADER_TARGET,
            plugin = %strong_name,
            replaced = previous.is_some(),
            "plugin registered"
        );
        Ok(strong_name)
    }

    /// Removes a registration. Returns whether one existed.
    #[must_use]
    pub fn unregister(&self, strong_name: &PluginStrongName) -> bool {
        self.plugins.write().remove(strong_name).is_some()
    }

    /// Reports whether `strong_name` is registered.
    #[must_use]
    pub fn is_registered(&self, strong_name: &PluginStrongName) -> bool {
        self.plugins.read().contains_key(strong_name)
    }

    /// Fails with [`PluginError::NotRegistered`] for unknown plugins.
    pub(crate) fn require_registered(&self, strong_name: &PluginStrongName) -> Result<(), PluginError> {
        if self.is_registered(strong_name) {
            Ok(())
        } else {
            Err(PluginError::NotRegistered {
                strong_name: strong_name.clone(),
            })
        }
    }

    /// Registered strong names in sorted order.
    #[must_use]
    pub fn available_plugins(&self) -> Vec<PluginStrongName> {
        let mut names: Vec<PluginStrongName> = self.plugins.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Loads a registered plugin.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotRegistered`] for unknown plugins,
    /// [`PluginError::DomainConflict`] when a registered plugin with another
    /// id claims the same domain, [`PluginError::LoadRejected`] when the plugin's
    /// load hooks fail, and any executor error.
    pub async fn load(
        &self,
        strong_name: &PluginStrongName,
        services: &PluginServices,
    ) -> Result<LoadedPluginInformation, PluginError> {
        let registered = self.registered(strong_name)?;
        self.check_domain(&registered.instance)?;

        let file_system = services.file_system().as_ref();
        let data_directory = services.data_directory();
        let plugin = registered.instance.plugin();
        let conversation_tree = registered
            .conversation_tree
            .get_or_init(|| plugin.conversation_tree(file_system, data_directory))
            .clone();
        let plugin_information = registered
            .plugin_information
            .get_or_init(|| plugin.plugin_information(file_system, data_directory))
            .clone();

        if !self.executor.load(&registered.instance, services).await? {
            return Err(PluginError::LoadRejected {
                strong_name: strong_name.clone(),
            });
        }
        info!(
            target: LOADER_TARGET,
            plugin = %strong_name,
            domain = registered.instance.lu_domain(),
            "plugin loaded"
        );

        Ok(LoadedPluginInformation {
            strong_name: strong_name.clone(),
            plugin_id: strong_name.plugin_id().to_owned(),
            lu_domain: registered.instance.lu_domain().to_owned(),
            conversation_tree,
            plugin_information,
        })
    }

    /// Unloads a plugin. Returns `false` when its unload hook failed.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotRegistered`] for unknown plugins and any
    /// executor error.
    pub async fn unload(
        &self,
        strong_name: &PluginStrongName,
        services: &PluginServices,
    ) -> Result<bool, PluginError> {
        let registered = self.registered(strong_name)?;
        let unloaded = self.executor.unload(&registered.instance, services).await?;
        info!(target: LOADER_TARGET, plugin = %strong_name, clean = unloaded, "plugin unloaded");
        Ok(unloaded)
    }

    /// Invokes an entry point on a loaded plugin.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotRegistered`] for unknown plugins and any
    /// executor error.
    pub async fn invoke(
        &self,
        strong_name: &PluginStrongName,
        entry_point: &str,
        query: QueryWithContext,
        services: PluginServices,
    ) -> Result<DialogProcessingResponse, PluginError> {
        let registered = self.registered(strong_name)?;
        self.executor
            .invoke(&registered.instance, entry_point, query, services)
            .await
    }

    /// Runs a plugin's trigger hook.
    ///
    /// # Errors
    ///
    /// As for [`Self::invoke`].
    pub async fn trigger(
        &self,
        strong_name: &PluginStrongName,
        query: &QueryWithContext,
        services: &PluginServices,
    ) -> Result<TriggerProcessingResponse, PluginError> {
        let registered = self.registered(strong_name)?;
        self.executor
            .trigger(&registered.instance, query, services)
            .await
    }

    /// Asks a plugin which slots it needs for a hand-off.
    ///
    /// # Errors
    ///
    /// As for [`Self::invoke`].
    pub async fn cross_domain_request(
        &self,
        strong_name: &PluginStrongName,
        target_intent: &str,
    ) -> Result<Option<CrossDomainRequestData>, PluginError> {
        let registered = self.registered(strong_name)?;
        self.executor
            .cross_domain_request(&registered.instance, target_intent)
            .await
    }

    /// Hands a conversation to a plugin and returns its answer together with
    /// the entity context after it ran.
    ///
    /// # Errors
    ///
    /// As for [`Self::invoke`].
    pub async fn cross_domain_response(
        &self,
        strong_name: &PluginStrongName,
        context: &CrossDomainContext,
        services: &PluginServices,
    ) -> Result<CrossDomainResponseResponse, PluginError> {
        let registered = self.registered(strong_name)?;
        let plugin_response = self
            .executor
            .cross_domain_response(&registered.instance, context, services)
            .await?;
        let out_entity_context = services.entity_context().clone();
        Ok(CrossDomainResponseResponse {
            plugin_response,
            out_entity_context,
        })
    }

    /// Reads a static asset from a plugin's views directory.
    ///
    /// `path` is relative to the plugin's views; leading slashes are
    /// ignored. Paths that would leave the views directory are treated as
    /// missing.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::ViewData`] when the asset exists but cannot be
    /// read.
    pub fn fetch_view_data(
        &self,
        strong_name: &PluginStrongName,
        path: &str,
        if_modified_since: Option<OffsetDateTime>,
    ) -> Result<Option<CachedAsset>, PluginError> {
        let relative = match normalise(Utf8Path::new(path.trim_start_matches('/'))) {
            Ok(relative) if !relative.as_str().is_empty() => relative,
            Ok(_) => return Ok(None),
            Err(error) => {
                warn!(
                    target: LOADER_TARGET,
                    plugin = %strong_name,
                    path,
                    %error,
                    "rejected view path"
                );
                return Ok(None);
            }
        };
        let asset_path = Utf8Path::new(CONTENT_VIEWS_ROOT)
            .join(strong_name.to_string())
            .join(&relative);
        let view_error = |source: FsError| PluginError::ViewData {
            strong_name: strong_name.clone(),
            source,
        };

        let stat = match self.content.stat(&asset_path) {
            Ok(stat) => stat,
            Err(FsError::NotFound { .. }) => {
                warn!(target: LOADER_TARGET, plugin = %strong_name, path, "view asset not found");
                return Ok(None);
            }
            Err(error) => return Err(view_error(error)),
        };
        let mime_type = mime_type_for(relative.as_str());

        if let Some(since) = if_modified_since
            && since >= stat.modified
        {
            let fresh_for = (since - stat.modified).whole_seconds();
            debug!(target: LOADER_TARGET, plugin = %strong_name, path, "view asset not modified");
            return Ok(Some(CachedAsset::not_modified(mime_type, fresh_for)));
        }

        let data = self.content.read(&asset_path).map_err(view_error)?;
        Ok(Some(CachedAsset::full(data, mime_type)))
    }

    fn registered(&self, strong_name: &PluginStrongName) -> Result<Arc<RegisteredPlugin>, PluginError> {
        self.plugins
            .read()
            .get(strong_name)
            .cloned()
            .ok_or_else(|| PluginError::NotRegistered {
                strong_name: strong_name.clone(),
            })
    }

    fn check_domain(&self, candidate: &PluginInstance) -> Result<(), PluginError> {
        let plugins = self.plugins.read();
        let conflict = plugins.values().find(|registered| {
            let other = &registered.instance;
            other.strong_name().plugin_id() != candidate.strong_name().plugin_id()
                && other.lu_domain().eq_ignore_ascii_case(candidate.lu_domain())
        });
        conflict.map_or(Ok(()), |existing| {
            Err(PluginError::DomainConflict {
                domain: candidate.lu_domain().to_owned(),
                existing: existing.instance.strong_name().plugin_id().to_owned(),
                conflicting: candidate.strong_name().plugin_id().to_owned(),
            })
        })
    }
}

impl std::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("executor", &self.executor)
            .field("plugins", &self.available_plugins())
            .finish_non_exhaustive()
    }
}
