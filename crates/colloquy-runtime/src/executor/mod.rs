//! Lifecycle and invocation of plugin instances.
//!
//! The [`PluginExecutor`] owns one lifecycle entry per plugin strong name.
//! An entry exists only while the plugin is loading, loaded or unloading, and
//! the loading and loaded states carry the plugin's
//! [`ContinuationRegistry`]. Removing the entry discards every cached
//! resolution, so a later load starts from an empty cache.
//!
//! Every call into plugin code runs inside the request's tracing span, races
//! the request's cancellation token and is shielded from panics. Faults are
//! turned into failure results unless the executor runs fail-fast.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use tracing::{Instrument, Span, debug, error, warn};

use crate::continuation::ContinuationRegistry;
use crate::definition::PluginInstance;
use crate::dialog::{
    CrossDomainContext, CrossDomainRequestData, CrossDomainResponseData,
    DialogProcessingResponse, PluginResult, QueryWithContext, TriggerProcessingResponse,
};
use crate::error::{PluginError, PluginFault};
use crate::services::PluginServices;
use crate::strong_name::PluginStrongName;

const EXECUTOR_TARGET: &str = "colloquy_runtime::executor";

/// Executor behaviour switches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutorOptions {
    fail_fast: bool,
}

impl ExecutorOptions {
    /// Options with fail-fast disabled.
    #[must_use]
    pub const fn new() -> Self {
        Self { fail_fast: false }
    }

    /// Propagates plugin faults to callers after logging them.
    #[must_use]
    pub const fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Whether plugin faults propagate.
    #[must_use]
    pub const fn fail_fast(self) -> bool {
        self.fail_fast
    }
}

/// Observable lifecycle phase of a plugin. Absence means unloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecyclePhase {
    /// Load hooks are running.
    Loading,
    /// Entry points may be invoked.
    Loaded,
    /// Unload hook is running.
    Unloading,
}

enum LifecycleState {
    Loading(Arc<ContinuationRegistry>),
    Loaded(Arc<ContinuationRegistry>),
    Unloading,
}

impl LifecycleState {
    const fn phase(&self) -> LifecyclePhase {
        match self {
            Self::Loading(_) => LifecyclePhase::Loading,
            Self::Loaded(_) => LifecyclePhase::Loaded,
            Self::Unloading => LifecyclePhase::Unloading,
        }
    }
}

/// Runs plugin lifecycle hooks and entry points with failure containment.
pub struct PluginExecutor {
    options: ExecutorOptions,
    states: DashMap<PluginStrongName, LifecycleState>,
}

impl PluginExecutor {
    /// Creates an executor with no loaded plugins.
    #[must_use]
    pub fn new(options: ExecutorOptions) -> Self {
        Self {
            options,
            states: DashMap::new(),
        }
    }

    /// Options the executor was built with.
    #[must_use]
    pub const fn options(&self) -> ExecutorOptions {
        self.options
    }

    /// Current phase of `strong_name`, or `None` when unloaded.
    #[must_use]
    pub fn phase(&self, strong_name: &PluginStrongName) -> Option<LifecyclePhase> {
        self.states.get(strong_name).map(|state| state.phase())
    }

    /// Continuation registry of a loading or loaded plugin.
    #[must_use]
    pub fn continuations(&self, strong_name: &PluginStrongName) -> Option<Arc<ContinuationRegistry>> {
        self.states
            .get(strong_name)
            .and_then(|state| match &*state {
                LifecycleState::Loading(registry) | LifecycleState::Loaded(registry) => {
                    Some(Arc::clone(registry))
                }
                LifecycleState::Unloading => None,
            })
    }

    /// Loads a plugin: runs its load hook, then its conversation setup.
    ///
    /// Returns `Ok(false)` when a hook faulted and the executor is not
    /// fail-fast; the plugin is then left unloaded with no cache.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Lifecycle`] if the plugin is not unloaded,
    /// [`PluginError::Cancelled`] if the services' token fires, and
    /// [`PluginError::Unhandled`] for hook faults in fail-fast mode.
    pub async fn load(
        &self,
        instance: &PluginInstance,
        services: &PluginServices,
    ) -> Result<bool, PluginError> {
        let strong_name = instance.strong_name();
        match self.states.entry(strong_name.clone()) {
            Entry::Occupied(occupied) => {
                return Err(PluginError::Lifecycle {
                    strong_name: strong_name.clone(),
                    message: format!(
                        "load requested while plugin is {:?}",
                        occupied.get().phase()
                    ),
                });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(LifecycleState::Loading(Arc::new(
                    ContinuationRegistry::new(instance.clone()),
                )));
            }
        }
        debug!(target: EXECUTOR_TARGET, plugin = %strong_name, "loading plugin");

        let plugin = instance.plugin();
        let hooks = async {
            plugin.on_load(services).await?;
            plugin.setup_conversation(services).await
        };
        let outcome = match guarded(strong_name, Some(services), hooks).await {
            Ok(outcome) => outcome,
            Err(error) => {
                self.states.remove(strong_name);
                return Err(error);
            }
        };

        match outcome {
            Ok(()) => {
                if let Some(mut state) = self.states.get_mut(strong_name)
                    && let LifecycleState::Loading(registry) = &*state
                {
                    let loaded = Arc::clone(registry);
                    *state = LifecycleState::Loaded(loaded);
                }
                debug!(target: EXECUTOR_TARGET, plugin = %strong_name, "plugin loaded");
                Ok(true)
            }
            Err(fault) => {
                self.states.remove(strong_name);
                self.contain(strong_name, "load", fault)?;
                Ok(false)
            }
        }
    }

    /// Unloads a plugin and discards its continuation cache.
    ///
    /// The cache is dropped whatever the unload hook does. Returns
    /// `Ok(false)` when the hook faulted and the executor is not fail-fast.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::Lifecycle`] when the plugin is not loaded,
    /// whatever the fail-fast setting, [`PluginError::Cancelled`] if the
    /// token fires and [`PluginError::Unhandled`] for hook faults in
    /// fail-fast mode.
    pub async fn unload(
        &self,
        instance: &PluginInstance,
        services: &PluginServices,
    ) -> Result<bool, PluginError> {
        let strong_name = instance.strong_name();
        {
            let Some(mut state) = self.states.get_mut(strong_name) else {
                return Err(PluginError::Lifecycle {
                    strong_name: strong_name.clone(),
                    message: "unload without matching load".to_owned(),
                });
            };
            if !matches!(&*state, LifecycleState::Loaded(_)) {
                return Err(PluginError::Lifecycle {
                    strong_name: strong_name.clone(),
                    message: format!("unload requested while plugin is {:?}", state.phase()),
                });
            }
            *state = LifecycleState::Unloading;
        }
        debug!(target: EXECUTOR_TARGET, plugin = %strong_name, "unloading plugin");

        let hook = instance.plugin().on_unload(services);
        let outcome = guarded(strong_name, Some(services), hook).await;
        self.states.remove(strong_name);

        match outcome? {
            Ok(()) => Ok(true),
            Err(fault) => {
                self.contain(strong_name, "unload", fault)?;
                Ok(false)
            }
        }
    }

    /// Invokes a named entry point.
    ///
    /// An empty name selects the plugin's default entry point. Names that do
    /// not resolve produce a failure result with a diagnostic.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotLoaded`] unless the plugin is loaded,
    /// [`PluginError::Cancelled`] if the services' token fires and
    /// [`PluginError::Unhandled`] for non-security faults in fail-fast mode.
    pub async fn invoke(
        &self,
        instance: &PluginInstance,
        entry_point: &str,
        query: QueryWithContext,
        services: PluginServices,
    ) -> Result<DialogProcessingResponse, PluginError> {
        let strong_name = instance.strong_name();
        let registry = self.loaded_registry(strong_name)?;
        let name = if entry_point.is_empty() {
            instance.entry_points().default_entry_point()
        } else {
            entry_point
        };

        let continuation = match registry.resolve(name) {
            Ok(continuation) => continuation,
            Err(failure) => {
                warn!(
                    target: EXECUTOR_TARGET,
                    plugin = %strong_name,
                    entry_point = name,
                    reason = %failure,
                    "entry point did not resolve"
                );
                return Ok(DialogProcessingResponse::new(
                    PluginResult::failure(failure.to_string()),
                    None,
                ));
            }
        };

        debug!(target: EXECUTOR_TARGET, plugin = %strong_name, entry_point = name, "invoking entry point");
        let call = continuation.invoke(query, services.clone());
        match guarded(strong_name, Some(&services), call).await? {
            Ok(result) => Ok(DialogProcessingResponse::new(
                result,
                Some(services.side_effects()),
            )),
            Err(fault) => {
                let diagnostic = self.contain(strong_name, name, fault)?;
                Ok(DialogProcessingResponse::new(
                    PluginResult::failure(diagnostic),
                    None,
                ))
            }
        }
    }

    /// Runs the plugin's trigger hook.
    ///
    /// # Errors
    ///
    /// As for [`Self::invoke`].
    pub async fn trigger(
        &self,
        instance: &PluginInstance,
        query: &QueryWithContext,
        services: &PluginServices,
    ) -> Result<TriggerProcessingResponse, PluginError> {
        let strong_name = instance.strong_name();
        self.loaded_registry(strong_name)?;
        let call = instance.plugin().trigger(query, services);
        match guarded(strong_name, Some(services), call).await? {
            Ok(result) => Ok(TriggerProcessingResponse {
                result,
                side_effects: Some(services.side_effects()),
            }),
            Err(fault) => {
                self.contain(strong_name, "trigger", fault)?;
                Ok(TriggerProcessingResponse::default())
            }
        }
    }

    /// Asks the plugin which slots it needs to accept a hand-off.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::NotLoaded`] unless the plugin is loaded and
    /// [`PluginError::Unhandled`] for faults in fail-fast mode.
    pub async fn cross_domain_request(
        &self,
        instance: &PluginInstance,
        target_intent: &str,
    ) -> Result<Option<CrossDomainRequestData>, PluginError> {
        let strong_name = instance.strong_name();
        self.loaded_registry(strong_name)?;
        let call = instance.plugin().cross_domain_request(target_intent);
        match guarded(strong_name, None, call).await? {
            Ok(data) => Ok(data),
            Err(fault) => {
                self.contain(strong_name, "cross_domain_request", fault)?;
                Ok(None)
            }
        }
    }

    /// Asks the plugin to answer a hand-off from another domain.
    ///
    /// # Errors
    ///
    /// As for [`Self::invoke`].
    pub async fn cross_domain_response(
        &self,
        instance: &PluginInstance,
        context: &CrossDomainContext,
        services: &PluginServices,
    ) -> Result<Option<CrossDomainResponseData>, PluginError> {
        let strong_name = instance.strong_name();
        self.loaded_registry(strong_name)?;
        let call = instance.plugin().cross_domain_response(context, services);
        match guarded(strong_name, Some(services), call).await? {
            Ok(data) => Ok(data),
            Err(fault) => {
                self.contain(strong_name, "cross_domain_response", fault)?;
                Ok(None)
            }
        }
    }

    fn loaded_registry(
        &self,
        strong_name: &PluginStrongName,
    ) -> Result<Arc<ContinuationRegistry>, PluginError> {
        match self.states.get(strong_name).as_deref() {
            Some(LifecycleState::Loaded(registry)) => Ok(Arc::clone(registry)),
            _ => Err(PluginError::NotLoaded {
                strong_name: strong_name.clone(),
            }),
        }
    }

    // Logs a fault and returns the diagnostic for the failure result, or the
    // fault itself as an error when it must propagate.
    fn contain(
        &self,
        strong_name: &PluginStrongName,
        operation: &str,
        fault: PluginFault,
    ) -> Result<String, PluginError> {
        if fault.is_security_violation() {
            error!(
                target: EXECUTOR_TARGET,
                plugin = %strong_name,
                operation,
                fault = %fault,
                "plugin attempted a disallowed operation"
            );
            return Ok(format!(
                "plugin '{strong_name}' was stopped during {operation}: {fault}"
            ));
        }

        error!(
            target: EXECUTOR_TARGET,
            plugin = %strong_name,
            operation,
            fault = %fault,
            fail_fast = self.options.fail_fast(),
            "plugin raised an unhandled fault"
        );
        if self.options.fail_fast() {
            return Err(PluginError::Unhandled {
                strong_name: strong_name.clone(),
                fault,
            });
        }
        Ok(format!("plugin '{strong_name}' failed during {operation}"))
    }
}

// Runs plugin code in its request span, racing cancellation and catching
// panics.
async fn guarded<T, F>(
    strong_name: &PluginStrongName,
    services: Option<&PluginServices>,
    call: F,
) -> Result<Result<T, PluginFault>, PluginError>
where
    F: Future<Output = Result<T, PluginFault>>,
{
    let span = services.map_or_else(Span::current, |services| services.span().clone());
    let caught = AssertUnwindSafe(call.instrument(span)).catch_unwind();
    let outcome = match services {
        Some(services) => {
            tokio::select! {
                biased;
                () = services.cancellation().cancelled() => {
                    debug!(target: EXECUTOR_TARGET, plugin = %strong_name, "plugin call cancelled");
                    return Err(PluginError::Cancelled {
                        strong_name: strong_name.clone(),
                    });
                }
                outcome = caught => outcome,
            }
        }
        None => caught.await,
    };
    Ok(outcome.unwrap_or_else(|payload| {
        Err(PluginFault::Panicked {
            message: panic_message(payload.as_ref()),
        })
    }))
}

impl std::fmt::Debug for PluginExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginExecutor")
            .field("options", &self.options)
            .field("plugins", &self.states.len())
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_owned())
}

#[cfg(test)]
mod tests;
