//! Guest process hosting the weather plugin.

use std::process::ExitCode;
use std::sync::Arc;

use colloquy_plugin_weather::WeatherPlugin;
use colloquy_runtime::PluginInstance;

#[tokio::main]
async fn main() -> ExitCode {
    colloquy_host::run_guest([PluginInstance::new(Arc::new(WeatherPlugin::new()))]).await
}
