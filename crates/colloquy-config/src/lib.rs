//! Layered configuration for Colloquy plugin hosts.
//!
//! [`Config`] is resolved by `ortho_config` from, in increasing order of
//! precedence, built-in defaults, a TOML file named with `--config-path` or
//! `COLLOQUY_CONFIG_PATH`, `COLLOQUY_*` environment variables and command-line
//! flags. Hosts and guest processes share the same schema so a guest spawned
//! by a host can be configured through the inherited environment.

mod defaults;
mod logging;

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use ortho_config::OrthoConfig;
use serde::{Deserialize, Serialize};

pub use defaults::{
    DEFAULT_CONTENT_ROOT, DEFAULT_GUEST_TIMEOUT_SECS, DEFAULT_LOG_FILTER, default_content_root,
    default_guest_timeout, default_guest_timeout_secs, default_log_filter, default_log_format,
};
pub use logging::{LogFormat, LogFormatParseError};

/// Runtime configuration shared by plugin hosts and guest processes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, OrthoConfig)]
#[ortho_config(prefix = "COLLOQUY")]
#[serde(default)]
pub struct Config {
    /// `tracing` filter directive, for example `info,colloquy_runtime=debug`.
    #[ortho_config(default = defaults::default_log_filter())]
    pub log_filter: String,
    /// Telemetry output format.
    #[ortho_config(default = defaults::default_log_format())]
    pub log_format: LogFormat,
    /// Propagate unhandled plugin faults to callers instead of converting
    /// them into failure results. Intended for development.
    #[ortho_config(default = false)]
    pub fail_fast: bool,
    /// Directory containing the `views/` and `plugindata/` trees.
    #[ortho_config(default = defaults::default_content_root())]
    pub content_root: Utf8PathBuf,
    /// Seconds to wait for a guest process to answer a single call.
    #[ortho_config(default = defaults::default_guest_timeout_secs())]
    pub guest_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_filter: defaults::default_log_filter(),
            log_format: defaults::default_log_format(),
            fail_fast: false,
            content_root: defaults::default_content_root(),
            guest_timeout_secs: defaults::default_guest_timeout_secs(),
        }
    }
}

impl Config {
    /// Filter directive handed to the telemetry subscriber.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Telemetry output format.
    #[must_use]
    pub const fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Whether plugin faults propagate to callers.
    #[must_use]
    pub const fn fail_fast(&self) -> bool {
        self.fail_fast
    }

    /// Root of the plugin content tree.
    #[must_use]
    pub fn content_root(&self) -> &Utf8Path {
        &self.content_root
    }

    /// Guest response timeout. Zero is clamped to one second.
    #[must_use]
    pub const fn guest_timeout(&self) -> Duration {
        if self.guest_timeout_secs == 0 {
            Duration::from_secs(1)
        } else {
            Duration::from_secs(self.guest_timeout_secs)
        }
    }
}
