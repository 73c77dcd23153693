//! Error types for the plugin runtime.
//!
//! [`PluginError`] covers failures of the runtime's own logic: registry
//! lookups, domain checks, lifecycle ordering and guest transport. Faults
//! raised by plugin code are [`PluginFault`] values, which the executor
//! contains and only surfaces as [`PluginError::Unhandled`] in fail-fast
//! mode.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::fs::FsError;
use crate::services::CollaboratorError;
use crate::strong_name::PluginStrongName;

/// Fault raised by plugin code.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PluginFault {
    /// The plugin attempted an operation its capabilities do not allow.
    #[error("security violation: {operation}")]
    SecurityViolation {
        /// Disallowed operation.
        operation: String,
    },
    /// The plugin failed.
    #[error("{message}")]
    Unhandled {
        /// Failure description.
        message: String,
    },
    /// The plugin panicked.
    #[error("plugin panicked: {message}")]
    Panicked {
        /// Panic payload, when it was a string.
        message: String,
    },
}

impl PluginFault {
    /// A security violation for `operation`.
    #[must_use]
    pub fn security(operation: impl Into<String>) -> Self {
        Self::SecurityViolation {
            operation: operation.into(),
        }
    }

    /// A generic failure.
    #[must_use]
    pub fn unhandled(message: impl Into<String>) -> Self {
        Self::Unhandled {
            message: message.into(),
        }
    }

    /// Reports whether the fault is a security violation.
    #[must_use]
    pub const fn is_security_violation(&self) -> bool {
        matches!(self, Self::SecurityViolation { .. })
    }
}

impl From<FsError> for PluginFault {
    fn from(error: FsError) -> Self {
        match error {
            FsError::AccessDenied { path } => Self::security(format!("file access to {path}")),
            other => Self::unhandled(other.to_string()),
        }
    }
}

impl From<CollaboratorError> for PluginFault {
    fn from(error: CollaboratorError) -> Self {
        Self::unhandled(error.to_string())
    }
}

/// Errors raised by the plugin runtime.
#[derive(Debug, Error)]
pub enum PluginError {
    /// No plugin is registered under the strong name.
    #[error("plugin '{strong_name}' is not registered")]
    NotRegistered {
        /// Requested plugin.
        strong_name: PluginStrongName,
    },

    /// Two registered plugins claim the same linguistic domain.
    #[error(
        "plugins '{existing}' and '{conflicting}' both claim the linguistic domain '{domain}'"
    )]
    DomainConflict {
        /// Contested domain.
        domain: String,
        /// Plugin id already claiming the domain.
        existing: String,
        /// Plugin id being loaded.
        conflicting: String,
    },

    /// A lifecycle operation was called out of order.
    #[error("lifecycle error for '{strong_name}': {message}")]
    Lifecycle {
        /// Plugin concerned.
        strong_name: PluginStrongName,
        /// What was out of order.
        message: String,
    },

    /// The plugin is not loaded.
    #[error("plugin '{strong_name}' is not loaded")]
    NotLoaded {
        /// Plugin concerned.
        strong_name: PluginStrongName,
    },

    /// The plugin's load hooks failed and the plugin stayed unloaded.
    #[error("plugin '{strong_name}' failed to load")]
    LoadRejected {
        /// Plugin concerned.
        strong_name: PluginStrongName,
    },

    /// The plugin's entry-point table violates the continuation contract.
    #[error("plugin '{strong_name}' declares invalid entry points: {}", violations.join("; "))]
    InvalidEntryPoints {
        /// Plugin concerned.
        strong_name: PluginStrongName,
        /// One description per offending entry point.
        violations: Vec<String>,
    },

    /// A plugin fault propagated because the executor runs fail-fast.
    #[error("unhandled fault in plugin '{strong_name}': {fault}")]
    Unhandled {
        /// Plugin concerned.
        strong_name: PluginStrongName,
        /// The fault.
        #[source]
        fault: PluginFault,
    },

    /// The request was cancelled before the plugin finished.
    #[error("request to plugin '{strong_name}' was cancelled")]
    Cancelled {
        /// Plugin concerned.
        strong_name: PluginStrongName,
    },

    /// The plugin's service template could not be built.
    #[error("failed to build services for '{strong_name}': {message}")]
    ServiceContext {
        /// Plugin concerned.
        strong_name: PluginStrongName,
        /// Failure description.
        message: String,
    },

    /// A view asset exists but could not be read.
    #[error("failed to read view data for '{strong_name}': {source}")]
    ViewData {
        /// Plugin concerned.
        strong_name: PluginStrongName,
        /// Underlying error.
        #[source]
        source: FsError,
    },

    /// The guest process could not be started.
    #[error("failed to spawn guest process: {message}")]
    Spawn {
        /// Failure description.
        message: String,
        /// Underlying error, when available.
        #[source]
        source: Option<Arc<io::Error>>,
    },

    /// Reading from or writing to the guest failed.
    #[error("guest i/o failed: {source}")]
    Io {
        /// Underlying error.
        #[source]
        source: Arc<io::Error>,
    },

    /// A message could not be encoded.
    #[error("failed to serialise guest message: {0}")]
    SerializeMessage(#[source] serde_json::Error),

    /// A line from the other side could not be decoded.
    #[error("failed to decode guest message: {0}")]
    DeserializeMessage(#[source] serde_json::Error),

    /// The guest replied with something other than the expected message.
    #[error("unexpected guest reply: expected {expected}")]
    UnexpectedReply {
        /// Reply kind the call expected.
        expected: &'static str,
    },

    /// The guest did not reply in time.
    #[error("guest did not reply within {timeout:?}")]
    Timeout {
        /// Configured response timeout.
        timeout: Duration,
    },

    /// The guest closed its end of the channel.
    #[error("guest process closed the connection")]
    GuestClosed,

    /// The guest reported an error it could not express more precisely.
    #[error("guest error: {message}")]
    Remote {
        /// Error text reported by the guest.
        message: String,
    },
}

impl PluginError {
    /// Wraps an I/O error from the guest channel.
    #[must_use]
    pub fn io(source: io::Error) -> Self {
        Self::Io {
            source: Arc::new(source),
        }
    }
}

#[cfg(test)]
mod tests;
