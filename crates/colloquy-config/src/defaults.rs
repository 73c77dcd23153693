use std::time::Duration;

use camino::Utf8PathBuf;

use crate::logging::LogFormat;

/// Default log filter expression used by the host binaries.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Directory holding `views/` and `plugindata/` when none is configured.
pub const DEFAULT_CONTENT_ROOT: &str = "content";

/// Seconds a host waits for a guest process to answer a call.
pub const DEFAULT_GUEST_TIMEOUT_SECS: u64 = 30;

/// Owned log filter value used where allocation is required (e.g. serde).
#[must_use]
pub fn default_log_filter() -> String {
    DEFAULT_LOG_FILTER.to_owned()
}

/// Default logging format for the host binaries.
#[must_use]
pub const fn default_log_format() -> LogFormat {
    LogFormat::Json
}

/// Default content root, relative to the working directory.
#[must_use]
pub fn default_content_root() -> Utf8PathBuf {
    Utf8PathBuf::from(DEFAULT_CONTENT_ROOT)
}

/// Default guest response timeout in seconds.
#[must_use]
pub const fn default_guest_timeout_secs() -> u64 {
    DEFAULT_GUEST_TIMEOUT_SECS
}

/// Default guest response timeout.
#[must_use]
pub const fn default_guest_timeout() -> Duration {
    Duration::from_secs(DEFAULT_GUEST_TIMEOUT_SECS)
}
