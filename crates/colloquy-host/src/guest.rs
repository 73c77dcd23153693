//! Entry point for plugin guest binaries.
//!
//! A guest is a process hosting plugins in-process and answering an
//! [`colloquy_runtime::IsolatedPluginProvider`] over its stdio.

use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use colloquy_runtime::isolation::serve;
use colloquy_runtime::services::SharedCollaborators;
use colloquy_runtime::{PluginError, PluginInstance, PluginProvider};

use crate::bootstrap::{ConfigLoader, Host, SystemConfigLoader, bootstrap_with};
use crate::health::{HealthReporter, StructuredHealthReporter};

/// Serves the host's plugins over `reader` and `writer` until input ends.
///
/// # Errors
///
/// Returns [`PluginError::Io`] when the channel fails.
pub async fn serve_channel<R, W>(host: &Host, reader: R, writer: W) -> Result<(), PluginError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Send + Unpin + 'static,
{
    host.reporter()
        .guest_serving(&host.provider().loader().available_plugins());
    let provider: Arc<dyn PluginProvider> = Arc::clone(host.provider()) as Arc<dyn PluginProvider>;
    let outcome = serve(provider, reader, writer).await;
    host.reporter().guest_stopped(outcome.as_ref().err());
    outcome
}

/// Serves the host's plugins over stdin and stdout.
///
/// # Errors
///
/// See [`serve_channel`].
pub async fn serve_stdio(host: &Host) -> Result<(), PluginError> {
    serve_channel(host, tokio::io::stdin(), tokio::io::stdout()).await
}

/// Runs a guest binary hosting `plugins`.
///
/// Configuration and telemetry come from the usual layers, so a host can
/// steer a guest it spawns through the inherited `COLLOQUY_*` environment.
///
/// ```no_run
/// # use colloquy_runtime::PluginInstance;
/// # fn plugins() -> Vec<PluginInstance> { Vec::new() }
/// #[tokio::main]
/// async fn main() -> std::process::ExitCode {
///     colloquy_host::run_guest(plugins()).await
/// }
/// ```
pub async fn run_guest<I>(plugins: I) -> ExitCode
where
    I: IntoIterator<Item = PluginInstance>,
{
    run_guest_with(
        &SystemConfigLoader,
        Arc::new(StructuredHealthReporter::new()),
        plugins,
    )
    .await
}

/// Runs a guest with explicit collaborators.
pub async fn run_guest_with<I>(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    plugins: I,
) -> ExitCode
where
    I: IntoIterator<Item = PluginInstance>,
{
    let Ok(host) = bootstrap_with(loader, reporter, SharedCollaborators::new()) else {
        return ExitCode::FAILURE;
    };
    for instance in plugins {
        if host.register_instance(instance).is_err() {
            return ExitCode::FAILURE;
        }
    }
    match serve_stdio(&host).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(_) => ExitCode::FAILURE,
    }
}
