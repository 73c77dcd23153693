//! Structured health reporting for host lifecycle events.

use std::sync::Arc;

use colloquy_config::Config;
use colloquy_runtime::{PluginError, PluginStrongName};

use crate::bootstrap::BootstrapError;

const HEALTH_TARGET: &str = "colloquy_host::health";

/// Observer for host lifecycle events.
pub trait HealthReporter: Send + Sync {
    /// Invoked before configuration loading begins.
    fn bootstrap_starting(&self);

    /// Invoked after bootstrap completes successfully.
    fn bootstrap_succeeded(&self, config: &Config);

    /// Invoked when bootstrap fails.
    fn bootstrap_failed(&self, error: &BootstrapError);

    /// Invoked after a plugin is registered with the host.
    fn plugin_registered(&self, strong_name: &PluginStrongName);

    /// Invoked when a plugin is refused at registration.
    fn plugin_rejected(&self, error: &PluginError);

    /// Invoked when a guest begins serving its stdio channel.
    fn guest_serving(&self, plugins: &[PluginStrongName]);

    /// Invoked when a guest stops serving.
    fn guest_stopped(&self, error: Option<&PluginError>);
}

impl<T> HealthReporter for Arc<T>
where
    T: HealthReporter,
{
    fn bootstrap_starting(&self) {
        (**self).bootstrap_starting();
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        (**self).bootstrap_succeeded(config);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        (**self).bootstrap_failed(error);
    }

    fn plugin_registered(&self, strong_name: &PluginStrongName) {
        (**self).plugin_registered(strong_name);
    }

    fn plugin_rejected(&self, error: &PluginError) {
        (**self).plugin_rejected(error);
    }

    fn guest_serving(&self, plugins: &[PluginStrongName]) {
        (**self).guest_serving(plugins);
    }

    fn guest_stopped(&self, error: Option<&PluginError>) {
        (**self).guest_stopped(error);
    }
}

/// Default reporter that records lifecycle events using `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct StructuredHealthReporter;

impl StructuredHealthReporter {
    /// Builds a new reporter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl HealthReporter for StructuredHealthReporter {
    fn bootstrap_starting(&self) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_starting",
            "starting host bootstrap"
        );
    }

    fn bootstrap_succeeded(&self, config: &Config) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "bootstrap_succeeded",
            content_root = %config.content_root(),
            fail_fast = config.fail_fast(),
            log_filter = %config.log_filter(),
            log_format = %config.log_format(),
            "host bootstrap completed"
        );
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "bootstrap_failed",
            error = %error,
            "host bootstrap failed"
        );
    }

    fn plugin_registered(&self, strong_name: &PluginStrongName) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "plugin_registered",
            plugin = %strong_name,
            "plugin registered"
        );
    }

    fn plugin_rejected(&self, error: &PluginError) {
        tracing::error!(
            target: HEALTH_TARGET,
            event = "plugin_rejected",
            error = %error,
            "plugin rejected at registration"
        );
    }

    fn guest_serving(&self, plugins: &[PluginStrongName]) {
        tracing::info!(
            target: HEALTH_TARGET,
            event = "guest_serving",
            plugins = ?plugins.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "guest serving on stdio"
        );
    }

    fn guest_stopped(&self, error: Option<&PluginError>) {
        match error {
            Some(error) => tracing::error!(
                target: HEALTH_TARGET,
                event = "guest_stopped",
                error = %error,
                "guest stopped after a channel failure"
            ),
            None => tracing::info!(
                target: HEALTH_TARGET,
                event = "guest_stopped",
                "guest input closed"
            ),
        }
    }
}
