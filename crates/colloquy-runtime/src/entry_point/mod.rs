//! Named entry points declared by plugins.
//!
//! A plugin publishes its callable surface as an [`EntryPointTable`]: scopes
//! containing members, each member either a continuation with the fixed
//! `(QueryWithContext, PluginServices) -> PluginResult` shape or some other
//! declared signature. Entry points are addressed as `"<scope>.<member>"`,
//! and that string is all a suspended conversation needs to store.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use colloquy_runtime::{
//!     EntryPointTable, PluginFault, PluginResult, PluginServices, QueryWithContext,
//! };
//!
//! struct Greeter;
//!
//! impl Greeter {
//!     async fn hello(
//!         self: Arc<Self>,
//!         _query: QueryWithContext,
//!         _services: PluginServices,
//!     ) -> Result<PluginResult, PluginFault> {
//!         Ok(PluginResult::success().with_text("hello"))
//!     }
//! }
//!
//! let table = EntryPointTable::builder::<Greeter>()
//!     .scope("Greeter", |scope| scope.instance("Hello", Greeter::hello))
//!     .with_default("Greeter.Hello")
//!     .build();
//! assert_eq!(table.default_entry_point(), "Greeter.Hello");
//! assert!(table.validate().is_ok());
//! ```

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use crate::dialog::{PluginResult, QueryWithContext};
use crate::error::PluginFault;
use crate::services::PluginServices;

/// Member name used for the default entry point when none is declared.
pub const DEFAULT_ENTRY_MEMBER: &str = "Execute";

/// Separator between scope and member in an entry-point name.
pub const SCOPE_SEPARATOR: char = '.';

/// Future returned by a continuation.
pub type ContinuationFuture = BoxFuture<'static, Result<PluginResult, PluginFault>>;

/// A continuation bound to everything it needs except the request.
pub type ContinuationFn =
    Arc<dyn Fn(QueryWithContext, PluginServices) -> ContinuationFuture + Send + Sync>;

pub(crate) type InstanceBinder =
    Arc<dyn Fn(Arc<dyn Any + Send + Sync>) -> Option<ContinuationFn> + Send + Sync>;

/// Who may call a member.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Callable by the host.
    #[default]
    Public,
    /// Callable only inside the plugin.
    Internal,
    /// Callable only inside its scope.
    Private,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Public => "public",
            Self::Internal => "internal",
            Self::Private => "private",
        };
        f.write_str(text)
    }
}

pub(crate) enum Binding {
    Instance(InstanceBinder),
    Scope(ContinuationFn),
}

pub(crate) enum MemberShape {
    Continuation(Binding),
    Other { signature: String },
}

pub(crate) struct Member {
    pub(crate) visibility: Visibility,
    pub(crate) shape: MemberShape,
}

/// Members declared under one scope name.
#[derive(Default)]
pub struct Scope {
    members: BTreeMap<String, Member>,
}

impl Scope {
    pub(crate) fn member(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }
}

/// A continuation whose visibility forbids host calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPointViolation {
    /// Fully qualified entry-point name.
    pub entry_point: String,
    /// Declared visibility.
    pub visibility: Visibility,
}

impl fmt::Display for EntryPointViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} is {} but continuations must be public",
            self.entry_point, self.visibility
        )
    }
}

/// The callable surface of a plugin.
pub struct EntryPointTable {
    scopes: BTreeMap<String, Scope>,
    default_entry_point: String,
}

impl EntryPointTable {
    /// Starts a table for plugin type `P`.
    #[must_use]
    pub fn builder<P: Send + Sync + 'static>() -> EntryPointTableBuilder<P> {
        EntryPointTableBuilder {
            scopes: BTreeMap::new(),
            primary_scope: None,
            default_entry_point: None,
            _plugin: PhantomData,
        }
    }

    /// Entry point used when a launch names none.
    #[must_use]
    pub fn default_entry_point(&self) -> &str {
        &self.default_entry_point
    }

    pub(crate) fn scope(&self, name: &str) -> Option<&Scope> {
        self.scopes.get(name)
    }

    /// Fully qualified names of every continuation the host may call.
    #[must_use]
    pub fn entry_point_names(&self) -> Vec<String> {
        self.continuations()
            .filter(|(_, member)| member.visibility == Visibility::Public)
            .map(|(name, _)| name)
            .collect()
    }

    /// Checks that every declared continuation is publicly callable.
    ///
    /// The loader runs this at registration so authors see violations
    /// before a conversation ever stores one of the names.
    ///
    /// # Errors
    ///
    /// Returns every non-public continuation.
    pub fn validate(&self) -> Result<(), Vec<EntryPointViolation>> {
        let violations: Vec<EntryPointViolation> = self
            .continuations()
            .filter(|(_, member)| member.visibility != Visibility::Public)
            .map(|(entry_point, member)| EntryPointViolation {
                entry_point,
                visibility: member.visibility,
            })
            .collect();
        if violations.is_empty() {
            Ok(())
        } else {
            Err(violations)
        }
    }

    fn continuations(&self) -> impl Iterator<Item = (String, &Member)> {
        self.scopes.iter().flat_map(|(scope_name, scope)| {
            scope
                .members
                .iter()
                .filter(|(_, member)| matches!(member.shape, MemberShape::Continuation(_)))
                .map(move |(member_name, member)| {
                    (format!("{scope_name}{SCOPE_SEPARATOR}{member_name}"), member)
                })
        })
    }
}

impl fmt::Debug for EntryPointTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let scopes: BTreeMap<&str, Vec<&str>> = self
            .scopes
            .iter()
            .map(|(name, scope)| {
                (
                    name.as_str(),
                    scope.members.keys().map(String::as_str).collect(),
                )
            })
            .collect();
        f.debug_struct("EntryPointTable")
            .field("scopes", &scopes)
            .field("default_entry_point", &self.default_entry_point)
            .finish()
    }
}

/// Builder for [`EntryPointTable`].
pub struct EntryPointTableBuilder<P> {
    scopes: BTreeMap<String, Scope>,
    primary_scope: Option<String>,
    default_entry_point: Option<String>,
    _plugin: PhantomData<fn() -> P>,
}

impl<P: Send + Sync + 'static> EntryPointTableBuilder<P> {
    /// Declares members under `name`. The first scope declared is the
    /// plugin's primary scope.
    #[must_use]
    pub fn scope(
        mut self,
        name: impl Into<String>,
        declare: impl FnOnce(ScopeBuilder<P>) -> ScopeBuilder<P>,
    ) -> Self {
        let scope_name = name.into();
        if self.primary_scope.is_none() {
            self.primary_scope = Some(scope_name.clone());
        }
        let existing = self.scopes.remove(&scope_name).unwrap_or_default();
        let declared = declare(ScopeBuilder {
            scope: existing,
            _plugin: PhantomData,
        });
        self.scopes.insert(scope_name, declared.scope);
        self
    }

    /// Sets the default entry point. Otherwise it is
    /// `"<primary scope>.Execute"`.
    #[must_use]
    pub fn with_default(mut self, entry_point: impl Into<String>) -> Self {
        self.default_entry_point = Some(entry_point.into());
        self
    }

    /// Finishes the table.
    #[must_use]
    pub fn build(self) -> EntryPointTable {
        let default_entry_point = self.default_entry_point.unwrap_or_else(|| {
            let scope = self.primary_scope.unwrap_or_default();
            format!("{scope}{SCOPE_SEPARATOR}{DEFAULT_ENTRY_MEMBER}")
        });
        EntryPointTable {
            scopes: self.scopes,
            default_entry_point,
        }
    }
}

/// Declares the members of one scope.
pub struct ScopeBuilder<P> {
    scope: Scope,
    _plugin: PhantomData<fn() -> P>,
}

impl<P: Send + Sync + 'static> ScopeBuilder<P> {
    /// Declares a public continuation bound to the plugin instance.
    #[must_use]
    pub fn instance<F, Fut>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<P>, QueryWithContext, PluginServices) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PluginResult, PluginFault>> + Send + 'static,
    {
        self.instance_with(name, Visibility::Public, handler)
    }

    /// Declares an instance-bound continuation with explicit visibility.
    #[must_use]
    pub fn instance_with<F, Fut>(
        self,
        name: impl Into<String>,
        visibility: Visibility,
        handler: F,
    ) -> Self
    where
        F: Fn(Arc<P>, QueryWithContext, PluginServices) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PluginResult, PluginFault>> + Send + 'static,
    {
        let shared = Arc::new(handler);
        let binder: InstanceBinder = Arc::new(move |receiver: Arc<dyn Any + Send + Sync>| {
            let instance = receiver.downcast::<P>().ok()?;
            let call = Arc::clone(&shared);
            let bound: ContinuationFn = Arc::new(move |query, services| {
                call(Arc::clone(&instance), query, services).boxed()
            });
            Some(bound)
        });
        self.declare(
            name,
            visibility,
            MemberShape::Continuation(Binding::Instance(binder)),
        )
    }

    /// Declares a public continuation that needs no plugin instance.
    #[must_use]
    pub fn function<F, Fut>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(QueryWithContext, PluginServices) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PluginResult, PluginFault>> + Send + 'static,
    {
        self.function_with(name, Visibility::Public, handler)
    }

    /// Declares an unbound continuation with explicit visibility.
    #[must_use]
    pub fn function_with<F, Fut>(
        self,
        name: impl Into<String>,
        visibility: Visibility,
        handler: F,
    ) -> Self
    where
        F: Fn(QueryWithContext, PluginServices) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<PluginResult, PluginFault>> + Send + 'static,
    {
        let bound: ContinuationFn = Arc::new(move |query, services| handler(query, services).boxed());
        self.declare(
            name,
            visibility,
            MemberShape::Continuation(Binding::Scope(bound)),
        )
    }

    /// Declares a member that exists but is not a continuation, such as a
    /// helper with a different signature. Resolving it reports a signature
    /// mismatch.
    #[must_use]
    pub fn member(self, name: impl Into<String>, signature: impl Into<String>) -> Self {
        self.declare(
            name,
            Visibility::Public,
            MemberShape::Other {
                signature: signature.into(),
            },
        )
    }

    fn declare(mut self, name: impl Into<String>, visibility: Visibility, shape: MemberShape) -> Self {
        self.scope
            .members
            .insert(name.into(), Member { visibility, shape });
        self
    }
}
