//! Newline-delimited JSON messages exchanged with a guest process.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::definition::LoadedPluginInformation;
use crate::dialog::{
    CrossDomainContext, CrossDomainRequestData, CrossDomainResponseResponse,
    DialogProcessingResponse, QueryWithContext, TriggerProcessingResponse,
};
use crate::error::{PluginError, PluginFault};
use crate::services::RequestContext;
use crate::strong_name::PluginStrongName;
use crate::view::CachedAsset;

/// A numbered call sent to the guest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestRequest {
    /// Correlates the reply. Unique per connection.
    pub id: u64,
    /// Operation to run.
    pub call: GuestCall,
}

/// Operations a guest understands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum GuestCall {
    /// List registered plugins.
    AvailablePlugins,
    /// Load a plugin.
    Load {
        /// Plugin to load.
        strong_name: PluginStrongName,
    },
    /// Unload a plugin.
    Unload {
        /// Plugin to unload.
        strong_name: PluginStrongName,
    },
    /// Run a dialog turn.
    Launch {
        /// Target plugin.
        strong_name: PluginStrongName,
        /// Entry point; empty for the default.
        entry_point: String,
        /// The turn.
        query: QueryWithContext,
        /// Request state.
        context: RequestContext,
    },
    /// Run the trigger hook.
    Trigger {
        /// Target plugin.
        strong_name: PluginStrongName,
        /// The turn.
        query: QueryWithContext,
        /// Request state.
        context: RequestContext,
    },
    /// Ask for hand-off slots.
    CrossDomainRequest {
        /// Target plugin.
        strong_name: PluginStrongName,
        /// Intent the conversation would move to.
        target_intent: String,
    },
    /// Hand a conversation over.
    CrossDomainResponse {
        /// Target plugin.
        strong_name: PluginStrongName,
        /// Hand-off context.
        context: CrossDomainContext,
        /// Request state.
        request: RequestContext,
    },
    /// Fetch a view asset.
    FetchViewData {
        /// Plugin owning the views.
        strong_name: PluginStrongName,
        /// Asset path.
        path: String,
        /// Client cache time, kept to the nanosecond.
        #[serde(default)]
        if_modified_since: Option<OffsetDateTime>,
    },
    /// Cancel an earlier request. Never answered.
    Cancel {
        /// Id of the request to cancel.
        target: u64,
    },
}

impl GuestCall {
    /// Short operation name for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AvailablePlugins => "available_plugins",
            Self::Load { .. } => "load",
            Self::Unload { .. } => "unload",
            Self::Launch { .. } => "launch",
            Self::Trigger { .. } => "trigger",
            Self::CrossDomainRequest { .. } => "cross_domain_request",
            Self::CrossDomainResponse { .. } => "cross_domain_response",
            Self::FetchViewData { .. } => "fetch_view_data",
            Self::Cancel { .. } => "cancel",
        }
    }
}

/// A reply to the request with the same id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuestResponse {
    /// Id of the answered request.
    pub id: u64,
    /// Outcome.
    pub reply: GuestReply,
}

/// Outcome of a guest call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum GuestReply {
    /// Registered plugins.
    AvailablePlugins {
        /// Sorted strong names.
        plugins: Vec<PluginStrongName>,
    },
    /// The plugin loaded.
    Loaded {
        /// Load snapshot.
        information: LoadedPluginInformation,
    },
    /// The plugin unloaded.
    Unloaded {
        /// `false` when the unload hook failed.
        clean: bool,
    },
    /// Dialog turn result.
    Dialog {
        /// Result and side effects.
        response: DialogProcessingResponse,
    },
    /// Trigger result.
    Trigger {
        /// Result and side effects.
        response: TriggerProcessingResponse,
    },
    /// Hand-off slots.
    CrossDomainRequest {
        /// Requested slots, if the plugin accepts the hand-off.
        data: Option<CrossDomainRequestData>,
    },
    /// Hand-off answer.
    CrossDomainResponse {
        /// Plugin answer and entity context.
        response: CrossDomainResponseResponse,
    },
    /// View asset.
    ViewData {
        /// The asset, if found.
        asset: Option<CachedAsset>,
    },
    /// The call failed.
    Error {
        /// What went wrong.
        error: RemoteError,
    },
}

/// A [`PluginError`] in a form that crosses the process boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RemoteError {
    /// See [`PluginError::NotRegistered`].
    NotRegistered {
        /// Plugin concerned.
        strong_name: PluginStrongName,
    },
    /// See [`PluginError::DomainConflict`].
    DomainConflict {
        /// Contested domain.
        domain: String,
        /// Plugin id already claiming it.
        existing: String,
        /// Plugin id being loaded.
        conflicting: String,
    },
    /// See [`PluginError::Lifecycle`].
    Lifecycle {
        /// Plugin concerned.
        strong_name: PluginStrongName,
        /// Failure description.
        message: String,
    },
    /// See [`PluginError::NotLoaded`].
    NotLoaded {
        /// Plugin concerned.
        strong_name: PluginStrongName,
    },
    /// See [`PluginError::LoadRejected`].
    LoadRejected {
        /// Plugin concerned.
        strong_name: PluginStrongName,
    },
    /// See [`PluginError::InvalidEntryPoints`].
    InvalidEntryPoints {
        /// Plugin concerned.
        strong_name: PluginStrongName,
        /// Offending entry points.
        violations: Vec<String>,
    },
    /// See [`PluginError::Unhandled`].
    Unhandled {
        /// Plugin concerned.
        strong_name: PluginStrongName,
        /// The fault.
        fault: PluginFault,
    },
    /// See [`PluginError::Cancelled`].
    Cancelled {
        /// Plugin concerned.
        strong_name: PluginStrongName,
    },
    /// See [`PluginError::ServiceContext`].
    ServiceContext {
        /// Plugin concerned.
        strong_name: PluginStrongName,
        /// Failure description.
        message: String,
    },
    /// Anything else, as text.
    Other {
        /// Error text.
        message: String,
    },
}

impl From<&PluginError> for RemoteError {
    fn from(error: &PluginError) -> Self {
        match error {
            PluginError::NotRegistered { strong_name } => Self::NotRegistered {
                strong_name: strong_name.clone(),
            },
            PluginError::DomainConflict {
                domain,
                existing,
                conflicting,
            } => Self::DomainConflict {
                domain: domain.clone(),
                existing: existing.clone(),
                conflicting: conflicting.clone(),
            },
            PluginError::Lifecycle {
                strong_name,
                message,
            } => Self::Lifecycle {
                strong_name: strong_name.clone(),
                message: message.clone(),
            },
            PluginError::NotLoaded { strong_name } => Self::NotLoaded {
                strong_name: strong_name.clone(),
            },
            PluginError::LoadRejected { strong_name } => Self::LoadRejected {
                strong_name: strong_name.clone(),
            },
            PluginError::InvalidEntryPoints {
                strong_name,
                violations,
            } => Self::InvalidEntryPoints {
                strong_name: strong_name.clone(),
                violations: violations.clone(),
            },
            PluginError::Unhandled { strong_name, fault } => Self::Unhandled {
                strong_name: strong_name.clone(),
                fault: fault.clone(),
            },
            PluginError::Cancelled { strong_name } => Self::Cancelled {
                strong_name: strong_name.clone(),
            },
            PluginError::ServiceContext {
                strong_name,
                message,
            } => Self::ServiceContext {
                strong_name: strong_name.clone(),
                message: message.clone(),
            },
            other => Self::Other {
                message: other.to_string(),
            },
        }
    }
}

impl From<RemoteError> for PluginError {
    fn from(error: RemoteError) -> Self {
        match error {
            RemoteError::NotRegistered { strong_name } => Self::NotRegistered { strong_name },
            RemoteError::DomainConflict {
                domain,
                existing,
                conflicting,
            } => Self::DomainConflict {
                domain,
                existing,
                conflicting,
            },
            RemoteError::Lifecycle {
                strong_name,
                message,
            } => Self::Lifecycle {
                strong_name,
                message,
            },
            RemoteError::NotLoaded { strong_name } => Self::NotLoaded { strong_name },
            RemoteError::LoadRejected { strong_name } => Self::LoadRejected { strong_name },
            RemoteError::InvalidEntryPoints {
                strong_name,
                violations,
            } => Self::InvalidEntryPoints {
                strong_name,
                violations,
            },
            RemoteError::Unhandled { strong_name, fault } => Self::Unhandled { strong_name, fault },
            RemoteError::Cancelled { strong_name } => Self::Cancelled { strong_name },
            RemoteError::ServiceContext {
                strong_name,
                message,
            } => Self::ServiceContext {
                strong_name,
                message,
            },
            RemoteError::Other { message } => Self::Remote { message },
        }
    }
}
