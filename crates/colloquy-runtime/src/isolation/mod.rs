//! Running plugins in a separate guest process.
//!
//! The host side is [`IsolatedPluginProvider`], a [`PluginProvider`] that
//! forwards each call as one line of JSON. The guest side is [`serve`], which
//! answers those lines from a local provider. Either side works over any
//! async byte stream; [`IsolatedPluginProvider::spawn`] wires a child
//! process's stdio.
//!
//! [`PluginProvider`]: crate::provider::PluginProvider

mod client;
mod guest;
mod protocol;

pub use client::{IsolatedPluginProvider, IsolationOptions};
pub use guest::serve;
pub use protocol::{GuestCall, GuestReply, GuestRequest, GuestResponse, RemoteError};

const ISOLATION_TARGET: &str = "colloquy_runtime::isolation";
