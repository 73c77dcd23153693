//! Per-plugin cache of resolved entry points.
//!
//! Resolution turns an entry-point name into a [`Continuation`] by looking
//! it up in the plugin's [`EntryPointTable`](crate::EntryPointTable) and
//! checking its shape and visibility. Each name is resolved at most once per
//! registry, even when many requests ask for it at the same moment; later
//! lookups return the cached outcome, including cached failures.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};

use dashmap::DashMap;
use thiserror::Error;

use crate::dialog::QueryWithContext;
use crate::definition::PluginInstance;
use crate::entry_point::{
    Binding, ContinuationFn, ContinuationFuture, MemberShape, SCOPE_SEPARATOR, Visibility,
};
use crate::services::PluginServices;
use crate::strong_name::PluginStrongName;

/// Why an entry-point name could not be resolved.
///
/// These are expected outcomes when stale or malformed names are replayed,
/// so the executor turns them into failure results rather than errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionFailure {
    /// The name has no scope separator.
    #[error("entry point '{entry_point}' has no declaring scope")]
    NoDeclaringScope {
        /// Requested name.
        entry_point: String,
    },
    /// The scope does not exist in the plugin.
    #[error("entry point name '{entry_point}' is invalid")]
    InvalidEntryPoint {
        /// Requested name.
        entry_point: String,
    },
    /// The member is absent or not a continuation.
    #[error("entry point '{entry_point}' has a signature mismatch: {detail}")]
    SignatureMismatch {
        /// Requested name.
        entry_point: String,
        /// What was found instead.
        detail: String,
    },
    /// The member is a continuation but the host may not call it.
    #[error("entry point '{entry_point}' is {visibility} and not publicly callable")]
    NotPublic {
        /// Requested name.
        entry_point: String,
        /// Declared visibility.
        visibility: Visibility,
    },
    /// The member could not be bound to the plugin instance.
    #[error("entry point '{entry_point}' could not be bound to its plugin instance")]
    BindingFailed {
        /// Requested name.
        entry_point: String,
    },
}

/// A resolved, invocable entry point.
#[derive(Clone)]
pub struct Continuation {
    strong_name: PluginStrongName,
    entry_point: String,
    handler: ContinuationFn,
}

impl Continuation {
    /// Plugin the continuation is bound to.
    #[must_use]
    pub const fn strong_name(&self) -> &PluginStrongName {
        &self.strong_name
    }

    /// Name the continuation was resolved from.
    #[must_use]
    pub fn entry_point(&self) -> &str {
        &self.entry_point
    }

    /// Starts the continuation.
    #[must_use]
    pub fn invoke(&self, query: QueryWithContext, services: PluginServices) -> ContinuationFuture {
        (self.handler)(query, services)
    }
}

impl fmt::Debug for Continuation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Continuation")
            .field("strong_name", &self.strong_name)
            .field("entry_point", &self.entry_point)
            .finish_non_exhaustive()
    }
}

/// Outcome of resolving one entry-point name.
pub type Resolution = Result<Continuation, ResolutionFailure>;

/// Resolution cache for one loaded plugin.
pub struct ContinuationRegistry {
    instance: PluginInstance,
    cache: DashMap<String, Resolution>,
    resolutions: AtomicUsize,
}

impl ContinuationRegistry {
    /// Creates an empty registry for `instance`.
    #[must_use]
    pub fn new(instance: PluginInstance) -> Self {
        Self {
            instance,
            cache: DashMap::new(),
            resolutions: AtomicUsize::new(0),
        }
    }

    /// Plugin the registry resolves against.
    #[must_use]
    pub const fn strong_name(&self) -> &PluginStrongName {
        self.instance.strong_name()
    }

    /// Resolves `entry_point`, using the cached outcome when there is one.
    ///
    /// Concurrent callers asking for the same name wait on a single
    /// resolution and all receive its outcome.
    pub fn resolve(&self, entry_point: &str) -> Resolution {
        if let Some(cached) = self.cache.get(entry_point) {
            return cached.value().clone();
        }
        self.cache
            .entry(entry_point.to_owned())
            .or_insert_with(|| {
                self.resolutions.fetch_add(1, Ordering::SeqCst);
                resolve_entry_point(&self.instance, entry_point)
            })
            .value()
            .clone()
    }

    /// Number of resolution attempts made, cache hits excluded.
    #[must_use]
    pub fn resolution_count(&self) -> usize {
        self.resolutions.load(Ordering::SeqCst)
    }

    /// Number of cached names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Reports whether nothing has been resolved yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

impl fmt::Debug for ContinuationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContinuationRegistry")
            .field("strong_name", self.strong_name())
            .field("cached", &self.cache.len())
            .field("resolutions", &self.resolution_count())
            .finish()
    }
}

fn resolve_entry_point(instance: &PluginInstance, entry_point: &str) -> Resolution {
    let (scope_name, member_name) = entry_point
        .rsplit_once(SCOPE_SEPARATOR)
        .filter(|(scope, _)| !scope.is_empty())
        .ok_or_else(|| ResolutionFailure::NoDeclaringScope {
            entry_point: entry_point.to_owned(),
        })?;

    let scope = instance.entry_points().scope(scope_name).ok_or_else(|| {
        ResolutionFailure::InvalidEntryPoint {
            entry_point: entry_point.to_owned(),
        }
    })?;

    let member = scope
        .member(member_name)
        .ok_or_else(|| ResolutionFailure::SignatureMismatch {
            entry_point: entry_point.to_owned(),
            detail: format!("scope '{scope_name}' has no member '{member_name}'"),
        })?;

    let binding = match &member.shape {
        MemberShape::Continuation(binding) => binding,
        MemberShape::Other { signature } => {
            return Err(ResolutionFailure::SignatureMismatch {
                entry_point: entry_point.to_owned(),
                detail: format!("member is declared as {signature}"),
            });
        }
    };

    if member.visibility != Visibility::Public {
        return Err(ResolutionFailure::NotPublic {
            entry_point: entry_point.to_owned(),
            visibility: member.visibility,
        });
    }

    let handler = match binding {
        Binding::Scope(handler) => handler.clone(),
        Binding::Instance(binder) => {
            binder(instance.receiver()).ok_or_else(|| ResolutionFailure::BindingFailed {
                entry_point: entry_point.to_owned(),
            })?
        }
    };

    Ok(Continuation {
        strong_name: instance.strong_name().clone(),
        entry_point: entry_point.to_owned(),
        handler,
    })
}
