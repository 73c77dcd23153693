//! Host and guest bootstrap for Colloquy plugin runtimes.
//!
//! [`bootstrap_with`] turns layered configuration into a [`Host`]: it
//! installs structured telemetry, opens the content root holding every
//! plugin's `views/` and `plugindata/` trees, and wires an in-process
//! provider whose fault policy follows the `fail_fast` setting. Health
//! hooks report each stage through `tracing` so operators can see where a
//! start-up failed.
//!
//! Plugin crates build guest binaries on top of [`run_guest`], which
//! bootstraps the same way, registers the plugins and serves the guest
//! protocol on stdio. A host talks to such a binary with
//! [`Host::spawn_guest`].

mod bootstrap;
mod guest;
mod health;
pub mod telemetry;

pub use bootstrap::{
    BootstrapError, ConfigLoader, Host, StaticConfigLoader, SystemConfigLoader, bootstrap_with,
};
pub use guest::{run_guest, run_guest_with, serve_channel, serve_stdio};
pub use health::{HealthReporter, StructuredHealthReporter};
pub use telemetry::{TelemetryError, TelemetryHandle};

#[cfg(test)]
mod tests;
