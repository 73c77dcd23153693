//! Precedence between configuration files, environment and flags.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::sync::{Mutex, MutexGuard};

use colloquy_config::{Config, LogFormat};
use once_cell::sync::Lazy;
use ortho_config::OrthoConfig;
use rstest::{fixture, rstest};
use tempfile::TempDir;

static ENV_MUTEX: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

struct EnvOverride {
    key: &'static str,
    previous: Option<OsString>,
    guard: Option<MutexGuard<'static, ()>>,
}

impl EnvOverride {
    fn set_var(key: &'static str, value: &OsStr) -> Self {
        let guard = ENV_MUTEX.lock().expect("env mutex poisoned");
        let previous = std::env::var_os(key);
        unsafe { std::env::set_var(key, value) };
        Self {
            key,
            previous,
            guard: Some(guard),
        }
    }
}

impl Drop for EnvOverride {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => unsafe { std::env::set_var(self.key, value) },
            None => unsafe { std::env::remove_var(self.key) },
        }
        drop(self.guard.take());
    }
}

struct ConfigFile {
    _dir: TempDir,
    path: OsString,
}

#[fixture]
fn config_file() -> ConfigFile {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("colloquy.toml");
    fs::write(
        &path,
        "log_filter = \"debug\"\nlog_format = \"compact\"\ncontent_root = \"/srv/colloquy\"\n",
    )
    .expect("write config file");
    ConfigFile {
        path: path.into_os_string(),
        _dir: dir,
    }
}

fn args(extra: &[&OsStr]) -> Vec<OsString> {
    let mut all = vec![OsString::from("colloquy-host")];
    all.extend(extra.iter().map(|value| value.to_os_string()));
    all
}

#[rstest]
fn file_values_override_defaults(config_file: ConfigFile) {
    let _lock = ENV_MUTEX.lock().expect("env mutex poisoned");
    let config = Config::load_from_iter(args(&[
        OsStr::new("--config-path"),
        config_file.path.as_os_str(),
    ]))
    .expect("load config");

    assert_eq!(config.log_filter(), "debug");
    assert_eq!(config.log_format(), LogFormat::Compact);
    assert_eq!(config.content_root().as_str(), "/srv/colloquy");
}

#[rstest]
fn environment_overrides_file(config_file: ConfigFile) {
    let _env = EnvOverride::set_var("COLLOQUY_LOG_FORMAT", OsStr::new("pretty"));

    let config = Config::load_from_iter(args(&[
        OsStr::new("--config-path"),
        config_file.path.as_os_str(),
    ]))
    .expect("load config");

    assert_eq!(config.log_format(), LogFormat::Pretty);
    assert_eq!(config.log_filter(), "debug");
}

#[rstest]
fn flags_override_environment(config_file: ConfigFile) {
    let _env = EnvOverride::set_var("COLLOQUY_LOG_FILTER", OsStr::new("warn"));

    let config = Config::load_from_iter(args(&[
        OsStr::new("--config-path"),
        config_file.path.as_os_str(),
        OsStr::new("--log-filter"),
        OsStr::new("trace"),
    ]))
    .expect("load config");

    assert_eq!(config.log_filter(), "trace");
}

#[test]
fn malformed_file_is_reported() {
    let _lock = ENV_MUTEX.lock().expect("env mutex poisoned");
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("broken.toml");
    fs::write(&path, "guest_timeout_secs = \"soon\"").expect("write broken config");

    let error = Config::load_from_iter(args(&[
        OsStr::new("--config-path"),
        path.as_os_str(),
    ]))
    .expect_err("loading must fail");

    assert!(
        !error.to_string().is_empty(),
        "error should describe the failing file"
    );
}
