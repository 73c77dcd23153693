//! Tracing setup shared by the host binary and plugin guests.
//!
//! A guest speaks its protocol on stdout, so every log line goes to stderr,
//! where the host drains it into its own tracing output.

use std::io::{self, IsTerminal};

use once_cell::sync::OnceCell;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use colloquy_config::{Config, LogFormat};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Proof that the process-wide subscriber is installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct TelemetryHandle;

/// Errors raised while installing telemetry.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// `log_filter` is not a valid filter directive.
    #[error("invalid log filter: {0}")]
    Filter(String),
    /// Some other subscriber was installed first.
    #[error("failed to install telemetry subscriber: {0}")]
    Subscriber(SetGlobalDefaultError),
}

/// Installs the stderr subscriber described by `config`.
///
/// Only the first call installs anything; later calls return a handle
/// immediately, whatever configuration they pass.
///
/// # Examples
///
/// ```rust
/// use colloquy_config::Config;
/// use colloquy_host::telemetry;
///
/// # fn main() -> Result<(), colloquy_host::TelemetryError> {
/// let config = Config::default();
/// let handle = telemetry::initialise(&config)?;
/// let again = telemetry::initialise(&config)?;
/// drop((handle, again));
/// # Ok(())
/// # }
/// ```
///
/// # Errors
///
/// Returns [`TelemetryError::Filter`] for a malformed filter and
/// [`TelemetryError::Subscriber`] when another subscriber owns the process.
pub fn initialise(config: &Config) -> Result<TelemetryHandle, TelemetryError> {
    INSTALLED
        .get_or_try_init(|| install(config))
        .map(|_| TelemetryHandle)
}

fn install(config: &Config) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(config.log_filter())
        .map_err(|error| TelemetryError::Filter(error.to_string()))?;
    let layer = stderr_layer(config.log_format()).with_filter(filter);
    let subscriber = Registry::default().with(layer);
    tracing::subscriber::set_global_default(subscriber).map_err(TelemetryError::Subscriber)
}

fn stderr_layer(format: LogFormat) -> BoxedLayer {
    // Colour only helps a person watching a terminal.
    let ansi = !format.is_structured() && io::stderr().is_terminal();
    let layer = fmt::layer()
        .with_writer(io::stderr)
        .with_ansi(ansi)
        .with_timer(UtcTime::rfc_3339());
    match format {
        LogFormat::Json => layer.json().flatten_event(true).boxed(),
        LogFormat::Compact => layer.compact().boxed(),
        LogFormat::Pretty => layer.pretty().with_file(true).with_line_number(true).boxed(),
    }
}
