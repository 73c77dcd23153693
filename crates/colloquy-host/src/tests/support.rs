//! Test harness utilities shared by the host suites.

use std::ffi::OsString;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use tempfile::TempDir;

use colloquy_config::Config;
use colloquy_runtime::services::SharedCollaborators;
use colloquy_runtime::{
    DialogPlugin, EntryPointTable, PluginError, PluginFault, PluginResult, PluginServices,
    PluginStrongName, QueryWithContext, RecognizedIntent, Visibility,
};

use crate::bootstrap::{BootstrapError, ConfigLoader, Host, StaticConfigLoader, bootstrap_with};
use crate::health::HealthReporter;

/// Scenario world shared across BDD steps.
pub struct TestWorld {
    content: TempDir,
    config: Config,
    loader: Option<Box<dyn ConfigLoader>>,
    pub reporter: Arc<RecordingHealthReporter>,
    host: Option<Host>,
    bootstrap_error: Option<BootstrapError>,
}

impl TestWorld {
    /// Builds a world whose configuration points at an empty content root.
    pub fn new() -> Self {
        let content = TempDir::new().expect("create content root");
        let config = config_for(&content);
        Self {
            content,
            config,
            loader: None,
            reporter: Arc::new(RecordingHealthReporter::default()),
            host: None,
            bootstrap_error: None,
        }
    }

    /// Points the configuration at a directory that does not exist.
    pub fn use_missing_content_root(&mut self) {
        self.config.content_root = content_path(&self.content).join("missing");
    }

    /// Enables fail-fast fault handling.
    pub fn enable_fail_fast(&mut self) {
        self.config.fail_fast = true;
    }

    /// Sets the guest response timeout.
    pub fn set_guest_timeout(&mut self, seconds: u64) {
        self.config.guest_timeout_secs = seconds;
    }

    /// Installs a loader that always fails.
    pub fn use_failing_loader(&mut self) {
        self.loader = Some(Box::new(FailingConfigLoader));
    }

    /// Runs the bootstrap sequence once.
    pub fn bootstrap(&mut self) {
        let loader: Box<dyn ConfigLoader> = match self.loader.take() {
            Some(loader) => loader,
            None => Box::new(StaticConfigLoader::new(self.config.clone())),
        };
        match bootstrap_with(&*loader, self.reporter.clone(), SharedCollaborators::new()) {
            Ok(host) => self.host = Some(host),
            Err(error) => self.bootstrap_error = Some(error),
        }
    }

    /// The bootstrapped host, if any.
    pub fn host(&self) -> Option<&Host> {
        self.host.as_ref()
    }

    /// The bootstrap error, if any.
    pub fn bootstrap_error(&self) -> Option<&BootstrapError> {
        self.bootstrap_error.as_ref()
    }
}

impl Default for TestWorld {
    fn default() -> Self {
        Self::new()
    }
}

fn content_path(dir: &TempDir) -> Utf8PathBuf {
    Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("temp dir path is not UTF-8")
}

/// Configuration pointing at `content`.
pub fn config_for(content: &TempDir) -> Config {
    Config {
        content_root: content_path(content),
        ..Config::default()
    }
}

/// Loader that fails by handing `ortho_config` an unparsable flag.
pub struct FailingConfigLoader;

impl ConfigLoader for FailingConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        failing_load()
    }
}

/// Runs `Config::load_from_iter` with a malformed timeout flag.
pub fn failing_load() -> Result<Config, Arc<OrthoError>> {
    Config::load_from_iter(vec![
        OsString::from("colloquy-host"),
        OsString::from("--guest-timeout-secs"),
        OsString::from("soon"),
    ])
}

/// Health events tracked during tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthEvent {
    /// Bootstrap started.
    BootstrapStarting,
    /// Bootstrap completed.
    BootstrapSucceeded,
    /// Bootstrap failed with the error text.
    BootstrapFailed(String),
    /// A plugin was registered.
    PluginRegistered(String),
    /// A plugin was refused.
    PluginRejected,
    /// The guest started serving the listed plugins.
    GuestServing(Vec<String>),
    /// The guest stopped, cleanly or not.
    GuestStopped {
        /// Whether the channel failed.
        failed: bool,
    },
}

/// Records health events for assertions.
#[derive(Default)]
pub struct RecordingHealthReporter {
    events: Mutex<Vec<HealthEvent>>,
}

impl RecordingHealthReporter {
    /// Captures a copy of the recorded events.
    pub fn events(&self) -> Vec<HealthEvent> {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .clone()
    }

    fn record(&self, event: HealthEvent) {
        self.events
            .lock()
            .expect("health reporter mutex poisoned")
            .push(event);
    }
}

impl HealthReporter for RecordingHealthReporter {
    fn bootstrap_starting(&self) {
        self.record(HealthEvent::BootstrapStarting);
    }

    fn bootstrap_succeeded(&self, _config: &Config) {
        self.record(HealthEvent::BootstrapSucceeded);
    }

    fn bootstrap_failed(&self, error: &BootstrapError) {
        self.record(HealthEvent::BootstrapFailed(error.to_string()));
    }

    fn plugin_registered(&self, strong_name: &PluginStrongName) {
        self.record(HealthEvent::PluginRegistered(strong_name.to_string()));
    }

    fn plugin_rejected(&self, _error: &PluginError) {
        self.record(HealthEvent::PluginRejected);
    }

    fn guest_serving(&self, plugins: &[PluginStrongName]) {
        self.record(HealthEvent::GuestServing(
            plugins.iter().map(ToString::to_string).collect(),
        ));
    }

    fn guest_stopped(&self, error: Option<&PluginError>) {
        self.record(HealthEvent::GuestStopped {
            failed: error.is_some(),
        });
    }
}

/// Minimal plugin greeting whoever it hears.
pub struct GreeterPlugin;

impl GreeterPlugin {
    async fn execute(
        self: Arc<Self>,
        query: QueryWithContext,
        _services: PluginServices,
    ) -> Result<PluginResult, PluginFault> {
        Ok(PluginResult::success().with_text(format!("hello, {}", query.understanding.utterance)))
    }
}

#[async_trait]
impl DialogPlugin for GreeterPlugin {
    fn strong_name(&self) -> PluginStrongName {
        PluginStrongName::new("greeter", 1, 0)
    }

    fn lu_domain(&self) -> &str {
        "Greeting"
    }

    fn entry_points(&self) -> EntryPointTable {
        EntryPointTable::builder::<Self>()
            .scope("Greeter", |scope| scope.instance("Execute", Self::execute))
            .build()
    }
}

/// Plugin exposing a continuation only it may call.
pub struct SecretivePlugin;

impl SecretivePlugin {
    async fn hidden(
        self: Arc<Self>,
        _query: QueryWithContext,
        _services: PluginServices,
    ) -> Result<PluginResult, PluginFault> {
        Ok(PluginResult::success())
    }
}

#[async_trait]
impl DialogPlugin for SecretivePlugin {
    fn strong_name(&self) -> PluginStrongName {
        PluginStrongName::new("secretive", 1, 0)
    }

    fn lu_domain(&self) -> &str {
        "Secrets"
    }

    fn entry_points(&self) -> EntryPointTable {
        EntryPointTable::builder::<Self>()
            .scope("Secretive", |scope| {
                scope.instance_with("Hidden", Visibility::Private, Self::hidden)
            })
            .build()
    }
}

/// A greeting query.
pub fn greeting(utterance: &str) -> QueryWithContext {
    QueryWithContext::new(RecognizedIntent::new("Greeting", "greet").with_utterance(utterance))
}
