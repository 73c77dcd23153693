//! The contract every dialog plugin implements.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::dialog::{
    CrossDomainContext, CrossDomainRequestData, CrossDomainResponseData, QueryWithContext,
    TriggerResult,
};
use crate::entry_point::EntryPointTable;
use crate::error::PluginFault;
use crate::fs::PluginFileSystem;
use crate::services::PluginServices;
use crate::strong_name::PluginStrongName;

/// A plugin's conversation graph. Opaque to the runtime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationTree(serde_json::Value);

impl ConversationTree {
    /// Wraps a serialised tree.
    #[must_use]
    pub const fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// The serialised tree.
    #[must_use]
    pub const fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Descriptive metadata shown to users and operators.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginInformation {
    /// Name shown to users.
    pub display_name: String,
    /// Author or publisher.
    #[serde(default)]
    pub creator: String,
    /// One-line description.
    #[serde(default)]
    pub short_description: String,
    /// Example utterances.
    #[serde(default)]
    pub sample_queries: Vec<String>,
    /// Icon path relative to the plugin's views.
    #[serde(default)]
    pub icon_path: Option<String>,
}

/// Snapshot produced each time a plugin loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadedPluginInformation {
    /// Loaded plugin.
    pub strong_name: PluginStrongName,
    /// Plugin id, duplicated from the strong name for convenience.
    pub plugin_id: String,
    /// Linguistic domain the plugin owns.
    pub lu_domain: String,
    /// Conversation graph, if the plugin has one.
    pub conversation_tree: Option<ConversationTree>,
    /// Descriptive metadata, if the plugin has any.
    pub plugin_information: Option<PluginInformation>,
}

/// A dialog plugin.
///
/// Implementations describe their identity and entry points and may override
/// any lifecycle or negotiation hook; every hook defaults to a no-op.
/// Returning [`PluginFault`] from a hook is the normal way to fail; panics are
/// also caught by the executor.
#[async_trait]
pub trait DialogPlugin: Send + Sync + 'static {
    /// Versioned identity.
    fn strong_name(&self) -> PluginStrongName;

    /// Linguistic domain owned by the plugin.
    fn lu_domain(&self) -> &str;

    /// Named entry points the host may call.
    fn entry_points(&self) -> EntryPointTable;

    /// Runs when the plugin enters the loaded state.
    async fn on_load(&self, _services: &PluginServices) -> Result<(), PluginFault> {
        Ok(())
    }

    /// Runs after [`Self::on_load`] to prepare conversation resources.
    async fn setup_conversation(&self, _services: &PluginServices) -> Result<(), PluginFault> {
        Ok(())
    }

    /// Runs when the plugin is unloaded.
    async fn on_unload(&self, _services: &PluginServices) -> Result<(), PluginFault> {
        Ok(())
    }

    /// Decides whether the plugin wants the turn at all.
    async fn trigger(
        &self,
        _query: &QueryWithContext,
        _services: &PluginServices,
    ) -> Result<Option<TriggerResult>, PluginFault> {
        Ok(None)
    }

    /// Lists the slots the plugin needs before accepting a hand-off to
    /// `target_intent`.
    async fn cross_domain_request(
        &self,
        _target_intent: &str,
    ) -> Result<Option<CrossDomainRequestData>, PluginFault> {
        Ok(None)
    }

    /// Answers a hand-off from another domain.
    async fn cross_domain_response(
        &self,
        _context: &CrossDomainContext,
        _services: &PluginServices,
    ) -> Result<Option<CrossDomainResponseData>, PluginFault> {
        Ok(None)
    }

    /// Builds the conversation graph from the plugin's files.
    fn conversation_tree(
        &self,
        _file_system: &dyn PluginFileSystem,
        _data_directory: &Utf8Path,
    ) -> Option<ConversationTree> {
        None
    }

    /// Builds descriptive metadata from the plugin's files.
    fn plugin_information(
        &self,
        _file_system: &dyn PluginFileSystem,
        _data_directory: &Utf8Path,
    ) -> Option<PluginInformation> {
        None
    }
}

/// A plugin paired with its entry-point table.
///
/// The instance keeps a second, type-erased handle to the concrete plugin so
/// instance-scoped entry points can be bound back to it.
#[derive(Clone)]
pub struct PluginInstance {
    strong_name: PluginStrongName,
    plugin: Arc<dyn DialogPlugin>,
    receiver: Arc<dyn Any + Send + Sync>,
    entry_points: Arc<EntryPointTable>,
}

impl PluginInstance {
    /// Wraps a plugin, capturing its strong name and entry points.
    #[must_use]
    pub fn new<P: DialogPlugin>(plugin: Arc<P>) -> Self {
        let strong_name = plugin.strong_name();
        let entry_points = Arc::new(plugin.entry_points());
        let receiver: Arc<dyn Any + Send + Sync> = Arc::clone(&plugin) as _;
        Self {
            strong_name,
            plugin,
            receiver,
            entry_points,
        }
    }

    /// Versioned identity captured at construction.
    #[must_use]
    pub const fn strong_name(&self) -> &PluginStrongName {
        &self.strong_name
    }

    /// Linguistic domain of the plugin.
    #[must_use]
    pub fn lu_domain(&self) -> &str {
        self.plugin.lu_domain()
    }

    /// The plugin.
    #[must_use]
    pub fn plugin(&self) -> &dyn DialogPlugin {
        self.plugin.as_ref()
    }

    /// Entry points captured at construction.
    #[must_use]
    pub fn entry_points(&self) -> &EntryPointTable {
        &self.entry_points
    }

    pub(crate) fn receiver(&self) -> Arc<dyn Any + Send + Sync> {
        Arc::clone(&self.receiver)
    }
}

impl fmt::Debug for PluginInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginInstance")
            .field("strong_name", &self.strong_name)
            .field("lu_domain", &self.lu_domain())
            .field("entry_points", &self.entry_points)
            .finish_non_exhaustive()
    }
}
