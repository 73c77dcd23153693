//! Validates host configuration and the content root, then exits.

use std::process::ExitCode;
use std::sync::Arc;

use colloquy_host::{StructuredHealthReporter, SystemConfigLoader, bootstrap_with};
use colloquy_runtime::services::SharedCollaborators;

fn main() -> ExitCode {
    let reporter = Arc::new(StructuredHealthReporter::new());
    match bootstrap_with(&SystemConfigLoader, reporter, SharedCollaborators::new()) {
        Ok(host) => {
            tracing::info!(
                target: "colloquy_host",
                content_root = %host.config().content_root(),
                "host ready"
            );
            ExitCode::SUCCESS
        }
        Err(_) => ExitCode::FAILURE,
    }
}
