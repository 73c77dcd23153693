//! Plugin runtime for the Colloquy dialog engine.
//!
//! A dialog plugin owns one linguistic domain and exposes named entry points
//! that the dialog engine invokes turn by turn. Between turns the only state
//! that travels with a conversation is the name of the entry point to resume
//! at, so the runtime must turn that name back into a callable on demand.
//!
//! The crate is layered bottom-up:
//!
//! - [`EntryPointTable`] is each plugin's explicit map of named entry points
//!   with declared visibility.
//! - [`ContinuationRegistry`] resolves names against that table exactly once
//!   per plugin load and caches the outcome.
//! - [`PluginExecutor`] tracks plugin lifecycle and runs plugin code with
//!   panic containment, cancellation and a fail-fast switch.
//! - [`PluginLoader`] registers plugins, enforces domain ownership and serves
//!   view assets.
//! - [`PluginProvider`] hides whether plugins run in-process
//!   ([`InProcessPluginProvider`]) or in a guest process
//!   ([`IsolatedPluginProvider`]).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use async_trait::async_trait;
//! use colloquy_runtime::{
//!     DialogPlugin, EntryPointTable, PluginFault, PluginResult, PluginServices,
//!     PluginStrongName, QueryWithContext,
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
//! #[async_trait]
//! impl DialogPlugin for Greeter {
//!     fn strong_name(&self) -> PluginStrongName {
//!         PluginStrongName::new("greeter", 1, 0)
//!     }
//!
//!     fn lu_domain(&self) -> &str {
//!         "greeter"
//!     }
//!
//!     fn entry_points(&self) -> EntryPointTable {
//!         EntryPointTable::builder::<Self>()
//!             .scope("Greeter", |scope| scope.instance("Execute", Self::hello))
//!             .build()
//!     }
//! }
//!
//! let table = Greeter.entry_points();
//! assert_eq!(table.default_entry_point(), "Greeter.Execute");
//! ```

pub mod continuation;
pub mod definition;
pub mod dialog;
pub mod entry_point;
pub mod error;
pub mod executor;
pub mod fs;
pub mod isolation;
pub mod loader;
pub mod provider;
pub mod services;
pub mod strong_name;
pub mod view;

#[cfg(test)]
mod tests;

pub use self::continuation::{Continuation, ContinuationRegistry, ResolutionFailure};
pub use self::definition::{
    ConversationTree, DialogPlugin, LoadedPluginInformation, PluginInformation, PluginInstance,
};
pub use self::dialog::{
    ClientContext, CrossDomainContext, CrossDomainRequestData, CrossDomainResponseData,
    CrossDomainResponseResponse, DialogOutcome, DialogProcessingResponse, MultiTurnBehavior,
    PluginResult, QueryWithContext, RecognizedIntent, TriggerKind, TriggerProcessingResponse,
    TriggerResult,
};
pub use self::entry_point::{EntryPointTable, Visibility};
pub use self::error::{PluginError, PluginFault};
pub use self::executor::{ExecutorOptions, LifecyclePhase, PluginExecutor};
pub use self::fs::{DirFileSystem, FsError, InMemoryFileSystem, PluginFileSystem};
pub use self::isolation::{IsolatedPluginProvider, IsolationOptions};
pub use self::loader::PluginLoader;
pub use self::provider::{InProcessPluginProvider, PluginProvider};
pub use self::services::{
    DefaultServiceContextFactory, PluginServices, RequestContext, ServiceContextFactory,
    ServiceTemplate, SideEffects,
};
pub use self::strong_name::PluginStrongName;
pub use self::view::CachedAsset;
