//! Host bootstrap orchestration.

use std::fmt;
use std::sync::Arc;

use camino::Utf8PathBuf;
use ortho_config::{OrthoConfig, OrthoError};
use thiserror::Error;
use tokio::process::Command;

use colloquy_config::Config;
use colloquy_runtime::services::SharedCollaborators;
use colloquy_runtime::{
    DefaultServiceContextFactory, DialogPlugin, DirFileSystem, ExecutorOptions, FsError,
    InProcessPluginProvider, IsolatedPluginProvider, IsolationOptions, PluginError,
    PluginExecutor, PluginFileSystem, PluginInstance, PluginLoader, PluginStrongName,
};

use crate::health::HealthReporter;
use crate::telemetry::{self, TelemetryError, TelemetryHandle};

/// Abstracts configuration loading so tests can inject settings.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigLoader: Send + Sync {
    /// Loads the host configuration.
    ///
    /// # Errors
    ///
    /// Returns the `ortho_config` error when a layer cannot be merged.
    fn load(&self) -> Result<Config, Arc<OrthoError>>;
}

/// Loader that reads defaults, files, environment and flags.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemConfigLoader;

impl ConfigLoader for SystemConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Config::load()
    }
}

/// Loader returning a fixed configuration.
#[derive(Debug, Clone)]
pub struct StaticConfigLoader {
    config: Config,
}

impl StaticConfigLoader {
    /// Wraps `config`.
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self { config }
    }
}

impl ConfigLoader for StaticConfigLoader {
    fn load(&self) -> Result<Config, Arc<OrthoError>> {
        Ok(self.config.clone())
    }
}

/// Errors surfaced during bootstrap.
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// Configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Configuration {
        /// Underlying loader error.
        #[source]
        source: Arc<OrthoError>,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[source]
        source: TelemetryError,
    },
    /// The content root could not be opened.
    #[error("failed to open content root '{path}': {source}")]
    ContentRoot {
        /// Configured content root.
        path: Utf8PathBuf,
        /// Underlying file-system error.
        #[source]
        source: FsError,
    },
}

/// A bootstrapped host: configuration, telemetry and the in-process provider.
pub struct Host {
    config: Config,
    provider: Arc<InProcessPluginProvider>,
    telemetry: TelemetryHandle,
    reporter: Arc<dyn HealthReporter>,
}

impl Host {
    /// The resolved configuration.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// Provider for plugins hosted in this process.
    #[must_use]
    pub const fn provider(&self) -> &Arc<InProcessPluginProvider> {
        &self.provider
    }

    /// Telemetry handle, mainly useful for tests.
    #[must_use]
    pub const fn telemetry(&self) -> TelemetryHandle {
        self.telemetry
    }

    /// Registers `plugin` with the in-process provider.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::InvalidEntryPoints`] when the plugin's entry
    /// points break the continuation contract.
    pub fn register<P: DialogPlugin>(&self, plugin: Arc<P>) -> Result<PluginStrongName, PluginError> {
        self.register_instance(PluginInstance::new(plugin))
    }

    /// Registers an already wrapped plugin instance.
    ///
    /// # Errors
    ///
    /// See [`Host::register`].
    pub fn register_instance(&self, instance: PluginInstance) -> Result<PluginStrongName, PluginError> {
        match self.provider.loader().register_instance(instance) {
            Ok(strong_name) => {
                self.reporter.plugin_registered(&strong_name);
                Ok(strong_name)
            }
            Err(error) => {
                self.reporter.plugin_rejected(&error);
                Err(error)
            }
        }
    }

    /// Options for talking to guest processes, derived from configuration.
    #[must_use]
    pub const fn isolation_options(&self) -> IsolationOptions {
        IsolationOptions::new().with_response_timeout(self.config.guest_timeout())
    }

    /// Starts a guest process and returns a provider speaking to it.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Spawn`] if the process cannot be started.
    pub fn spawn_guest(&self, command: Command) -> Result<IsolatedPluginProvider, PluginError> {
        IsolatedPluginProvider::spawn(command, self.isolation_options())
    }

    pub(crate) fn reporter(&self) -> &dyn HealthReporter {
        self.reporter.as_ref()
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Host")
            .field("config", &self.config)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

/// Bootstraps a host using the supplied collaborators.
///
/// Loads configuration, installs telemetry, opens the content root and wires
/// an [`InProcessPluginProvider`] whose executor follows the configured
/// fault policy. Every plugin shares `collaborators`.
///
/// # Errors
///
/// Returns [`BootstrapError`] for the first step that fails. The reporter is
/// told about the failure before it is returned.
pub fn bootstrap_with(
    loader: &dyn ConfigLoader,
    reporter: Arc<dyn HealthReporter>,
    collaborators: SharedCollaborators,
) -> Result<Host, BootstrapError> {
    reporter.bootstrap_starting();

    let config = match loader.load() {
        Ok(config) => config,
        Err(source) => {
            let error = BootstrapError::Configuration { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let telemetry = match telemetry::initialise(&config) {
        Ok(handle) => handle,
        Err(source) => {
            let error = BootstrapError::Telemetry { source };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let content: Arc<dyn PluginFileSystem> = match DirFileSystem::open(config.content_root()) {
        Ok(content) => Arc::new(content),
        Err(source) => {
            let error = BootstrapError::ContentRoot {
                path: config.content_root().to_owned(),
                source,
            };
            reporter.bootstrap_failed(&error);
            return Err(error);
        }
    };

    let executor = PluginExecutor::new(ExecutorOptions::new().with_fail_fast(config.fail_fast()));
    let loader = PluginLoader::new(executor, Arc::clone(&content));
    let factory = DefaultServiceContextFactory::new(content).with_collaborators(collaborators);
    let provider = Arc::new(InProcessPluginProvider::new(
        Arc::new(loader),
        Arc::new(factory),
    ));
    reporter.bootstrap_succeeded(&config);

    Ok(Host {
        config,
        provider,
        telemetry,
        reporter,
    })
}
