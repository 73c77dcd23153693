//! Tests for runtime error types.

use camino::Utf8PathBuf;
use rstest::rstest;

use super::*;
use crate::fs::FsError;

fn weather() -> PluginStrongName {
    PluginStrongName::new("weather", 1, 0)
}

#[test]
fn domain_conflict_names_both_plugins() {
    let error = PluginError::DomainConflict {
        domain: "Weather".into(),
        existing: "weather".into(),
        conflicting: "forecast".into(),
    };
    let message = error.to_string();
    assert!(message.contains("'weather'"), "{message}");
    assert!(message.contains("'forecast'"), "{message}");
    assert!(message.contains("'Weather'"), "{message}");
}

#[test]
fn invalid_entry_points_lists_violations() {
    let error = PluginError::InvalidEntryPoints {
        strong_name: weather(),
        violations: vec!["Weather.Hidden is private".into(), "Weather.Inner is internal".into()],
    };
    let message = error.to_string();
    assert!(message.contains("Weather.Hidden is private; Weather.Inner is internal"));
}

#[rstest]
#[case::not_registered(PluginError::NotRegistered { strong_name: weather() }, "not registered")]
#[case::not_loaded(PluginError::NotLoaded { strong_name: weather() }, "not loaded")]
#[case::cancelled(PluginError::Cancelled { strong_name: weather() }, "cancelled")]
#[case::timeout(PluginError::Timeout { timeout: std::time::Duration::from_secs(3) }, "3s")]
#[case::closed(PluginError::GuestClosed, "closed")]
fn messages_mention_the_cause(#[case] error: PluginError, #[case] fragment: &str) {
    let message = error.to_string();
    assert!(message.contains(fragment), "{message} lacks {fragment}");
}

#[test]
fn unhandled_exposes_fault_as_source() {
    let error = PluginError::Unhandled {
        strong_name: weather(),
        fault: PluginFault::unhandled("boom"),
    };
    let source = std::error::Error::source(&error).expect("source");
    assert_eq!(source.to_string(), "boom");
}

#[test]
fn denied_file_access_is_a_security_violation() {
    let fault = PluginFault::from(FsError::AccessDenied {
        path: Utf8PathBuf::from("../secrets"),
    });
    assert!(fault.is_security_violation());
    assert_eq!(fault.to_string(), "security violation: file access to ../secrets");
}

#[test]
fn missing_file_is_an_ordinary_fault() {
    let fault = PluginFault::from(FsError::NotFound {
        path: Utf8PathBuf::from("tree.json"),
    });
    assert!(!fault.is_security_violation());
}

#[test]
fn errors_are_send_and_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<PluginError>();
    assert_send_sync::<PluginFault>();
}
