mod common;

use std::fs;

use common::EnvGuard;
use serial_test::serial;
use webview_bridge::{
    config::{BridgeConfig, ReplayMode, CONFIG_ENV},
    logging::{init_logging, try_init_logging},
    BridgeError,
};

#[test]
#[serial]
fn from_env_without_variable_uses_defaults() {
    let _guard = EnvGuard::unset(&[CONFIG_ENV]);
    assert_eq!(BridgeConfig::from_env().unwrap(), BridgeConfig::default());
}

#[test]
#[serial]
fn from_env_reads_the_named_file() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("bridge.toml");
    fs::write(
        &path,
        "freshness_window_ms = 5000\nlockdown_threshold = 3\n\n[replay]\nmode = \"lifetime\"\n",
    )
    .unwrap();
    let _guard = EnvGuard::set(&[(CONFIG_ENV, path.display().to_string())]);

    let cfg = BridgeConfig::from_env().unwrap();
    assert_eq!(cfg.freshness_window_ms, 5_000);
    assert_eq!(cfg.lockdown_threshold, 3);
    assert_eq!(cfg.replay.mode, ReplayMode::Lifetime);
    // Untouched keys keep their defaults.
    assert_eq!(cfg.inbound_scheme, "app://");
    assert_eq!(cfg.default_call_timeout_ms, 10_000);
}

#[test]
#[serial]
fn from_env_with_missing_file_is_io_error() {
    let td = tempfile::tempdir().unwrap();
    let _guard = EnvGuard::set(&[(CONFIG_ENV, td.path().join("absent.toml").display().to_string())]);
    assert!(matches!(BridgeConfig::from_env(), Err(BridgeError::Io(_))));
}

#[test]
fn invalid_values_are_rejected() {
    for toml in [
        "outbound_scheme = \"app://\"",
        "freshness_window_ms = 0",
        "[replay]\nmax_entries = 0",
        "[replay]\nmode = \"forever\"",
        "client_event = \"\"",
        "not toml at all = = =",
    ] {
        let err = BridgeConfig::from_toml_str(toml).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)), "{toml}: {err}");
    }
}

#[test]
fn from_file_accepts_partial_overrides() {
    let td = tempfile::tempdir().unwrap();
    let path = td.path().join("partial.toml");
    fs::write(&path, "outbound_scheme = \"host://\"\n").unwrap();
    let cfg = BridgeConfig::from_file(&path).unwrap();
    assert_eq!(cfg.outbound_scheme, "host://");
    assert_eq!(cfg.replay, BridgeConfig::default().replay);
}

#[test]
#[serial]
fn logging_initialises_once() {
    let _guard = EnvGuard::set(&[("WEBVIEW_BRIDGE_LOG", "debug".to_string())]);
    init_logging();
    assert!(try_init_logging().is_err());
}
