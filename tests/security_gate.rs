mod common;

use std::sync::Arc;

use common::{frame, NOW};
use serde_json::json;
use webview_bridge::{
    clock::ManualClock,
    config::{BridgeConfig, ReplayMode},
    security::SecurityGate,
    SecurityError,
};

fn gate_with(config: BridgeConfig) -> (SecurityGate, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(NOW));
    (SecurityGate::new(&config, clock.clone()), clock)
}

fn gate() -> (SecurityGate, Arc<ManualClock>) {
    gate_with(BridgeConfig::default())
}

#[test]
fn accepts_valid_frame_and_strips_scheme() {
    let (mut gate, _clock) = gate();
    let token = gate.token().to_string();
    let msg = gate
        .validate(&frame("echo", json!({"x": 1}), Some("r1"), &token, "n1", NOW))
        .expect("valid frame");
    assert_eq!(msg.action, "echo");
    assert_eq!(msg.payload, json!({"x": 1}));
    assert_eq!(msg.request_id.as_deref(), Some("r1"));
    assert_eq!(msg.nonce, "n1");
}

#[test]
fn nonce_is_accepted_exactly_once() {
    let (mut gate, _clock) = gate();
    let token = gate.token().to_string();
    assert!(gate.validate(&frame("a", json!(1), None, &token, "n1", NOW)).is_ok());
    // Different action and payload, same nonce.
    let err = gate
        .validate(&frame("b", json!({"other": true}), None, &token, "n1", NOW))
        .unwrap_err();
    assert_eq!(err, SecurityError::Replay);
}

#[test]
fn stale_frames_are_rejected_regardless_of_token() {
    let (mut gate, _clock) = gate();
    let token = gate.token().to_string();
    let old = NOW - 30_001;

    let err = gate.validate(&frame("a", json!(null), None, &token, "n1", old)).unwrap_err();
    assert!(matches!(err, SecurityError::Stale { window_ms: 30_000, .. }));
    assert!(gate.validate(&frame("a", json!(null), None, "wrong", "n2", old)).is_err());
}

#[test]
fn window_edge_is_inclusive() {
    let (mut gate, _clock) = gate();
    let token = gate.token().to_string();
    assert!(gate
        .validate(&frame("a", json!(null), None, &token, "n1", NOW - 30_000))
        .is_ok());
}

#[test]
fn far_future_timestamps_are_stale() {
    let (mut gate, _clock) = gate();
    let token = gate.token().to_string();
    let err = gate
        .validate(&frame("a", json!(null), None, &token, "n1", NOW + 60_000))
        .unwrap_err();
    assert!(matches!(err, SecurityError::Stale { .. }));
}

#[test]
fn missing_nonce_is_rejected() {
    let (mut gate, _clock) = gate();
    let token = gate.token().to_string();
    let err = gate.validate(&frame("a", json!(null), None, &token, "", NOW)).unwrap_err();
    assert_eq!(err, SecurityError::MissingNonce);

    let raw = json!({"protocol": "app://a", "timestamp": NOW, "__token": token}).to_string();
    assert_eq!(gate.validate(&raw).unwrap_err(), SecurityError::MissingNonce);
}

#[test]
fn wrong_token_is_unauthorized() {
    let (mut gate, _clock) = gate();
    let err = gate
        .validate(&frame("a", json!(null), None, "not-the-token", "n1", NOW))
        .unwrap_err();
    assert_eq!(err, SecurityError::Unauthorized);
}

#[test]
fn foreign_traffic_is_silently_ignored() {
    let (mut gate, _clock) = gate();
    let token = gate.token().to_string();
    for raw in [
        "not json at all".to_string(),
        "[1,2,3]".to_string(),
        json!({"hello": "world"}).to_string(),
        json!({"protocol": "other://x", "timestamp": NOW, "__token": token, "__nonce": "n"}).to_string(),
    ] {
        let err = gate.validate(&raw).unwrap_err();
        assert_eq!(err, SecurityError::NotBridgeFrame, "{raw}");
        assert!(err.is_silent());
    }
}

#[test]
fn bridge_frame_without_timestamp_is_malformed() {
    let (mut gate, _clock) = gate();
    let token = gate.token().to_string();
    let raw = json!({"protocol": "app://a", "__token": token, "__nonce": "n"}).to_string();
    assert!(matches!(gate.validate(&raw), Err(SecurityError::Malformed(_))));

    let raw = frame("", json!(null), None, &token, "n2", NOW);
    assert!(matches!(gate.validate(&raw), Err(SecurityError::Malformed(_))));
}

#[test]
fn rejected_frames_do_not_consume_their_nonce() {
    let (mut gate, _clock) = gate();
    let token = gate.token().to_string();
    assert!(gate.validate(&frame("a", json!(null), None, "bad", "n1", NOW)).is_err());
    assert!(gate
        .validate(&frame("a", json!(null), None, &token, "n1", NOW - 40_000))
        .is_err());
    assert_eq!(gate.replay_cache_len(), 0);
    assert!(gate.validate(&frame("a", json!(null), None, &token, "n1", NOW)).is_ok());
    assert_eq!(gate.replay_cache_len(), 1);
}

#[test]
fn repeated_failures_lock_the_gate_until_reset() {
    let config = BridgeConfig::from_toml_str("lockdown_threshold = 3").unwrap();
    let (mut gate, _clock) = gate_with(config);
    let token = gate.token().to_string();

    for i in 0..3 {
        let nonce = format!("bad-{i}");
        assert!(gate.validate(&frame("a", json!(null), None, "nope", &nonce, NOW)).is_err());
    }
    assert!(gate.is_locked());

    // The right token no longer helps, and looks the same as a wrong one.
    let err = gate.validate(&frame("a", json!(null), None, &token, "good", NOW)).unwrap_err();
    assert_eq!(err, SecurityError::Unauthorized);

    gate.reset();
    assert!(!gate.is_locked());
    assert_ne!(gate.token(), token);
    let err = gate.validate(&frame("a", json!(null), None, &token, "old", NOW)).unwrap_err();
    assert_eq!(err, SecurityError::Unauthorized);
    let fresh = gate.token().to_string();
    assert!(gate.validate(&frame("a", json!(null), None, &fresh, "new", NOW)).is_ok());
}

#[test]
fn accepted_frame_resets_the_failure_streak() {
    let config = BridgeConfig::from_toml_str("lockdown_threshold = 2").unwrap();
    let (mut gate, _clock) = gate_with(config);
    let token = gate.token().to_string();

    assert!(gate.validate(&frame("a", json!(null), None, "x", "b1", NOW)).is_err());
    assert!(gate.validate(&frame("a", json!(null), None, &token, "g1", NOW)).is_ok());
    assert!(gate.validate(&frame("a", json!(null), None, "x", "b2", NOW)).is_err());
    assert!(!gate.is_locked());
}

#[test]
fn foreign_traffic_never_triggers_lockdown() {
    let config = BridgeConfig::from_toml_str("lockdown_threshold = 1").unwrap();
    let (mut gate, _clock) = gate_with(config);
    for _ in 0..5 {
        let _ = gate.validate("{\"type\":\"unrelated\"}");
    }
    assert!(!gate.is_locked());
}

#[test]
fn explicit_lockdown_rejects_valid_frames() {
    let (mut gate, _clock) = gate();
    let token = gate.token().to_string();
    gate.lockdown();
    assert_eq!(
        gate.validate(&frame("a", json!(null), None, &token, "n1", NOW)).unwrap_err(),
        SecurityError::Unauthorized
    );
}

#[test]
fn windowed_cache_forgets_nonces_that_can_only_arrive_stale() {
    let (mut gate, clock) = gate();
    let token = gate.token().to_string();
    assert!(gate.validate(&frame("a", json!(null), None, &token, "n1", NOW)).is_ok());

    clock.advance(60_001);
    let now = NOW + 60_001;
    assert!(gate.validate(&frame("a", json!(null), None, &token, "n2", now)).is_ok());
    assert_eq!(gate.replay_cache_len(), 1);

    // Replaying the first frame is refused: it is far outside the window.
    let err = gate.validate(&frame("a", json!(null), None, &token, "n1", NOW)).unwrap_err();
    assert!(matches!(err, SecurityError::Stale { .. }));
}

#[test]
fn lifetime_cache_keeps_every_nonce() {
    let config = BridgeConfig::from_toml_str("[replay]\nmode = \"lifetime\"").unwrap();
    assert_eq!(config.replay.mode, ReplayMode::Lifetime);
    let (mut gate, clock) = gate_with(config);
    let token = gate.token().to_string();
    assert!(gate.validate(&frame("a", json!(null), None, &token, "n1", NOW)).is_ok());

    clock.advance(10 * 60_000);
    let now = NOW + 10 * 60_000;
    assert!(gate.validate(&frame("a", json!(null), None, &token, "n2", now)).is_ok());
    assert_eq!(gate.replay_cache_len(), 2);
    assert_eq!(
        gate.validate(&frame("a", json!(null), None, &token, "n1", now)).unwrap_err(),
        SecurityError::Replay
    );
}

#[test]
fn full_replay_cache_fails_closed() {
    let config =
        BridgeConfig::from_toml_str("lockdown_threshold = 0\n[replay]\nmax_entries = 2").unwrap();
    let (mut gate, _clock) = gate_with(config);
    let token = gate.token().to_string();
    assert!(gate.validate(&frame("a", json!(null), None, &token, "n1", NOW)).is_ok());
    assert!(gate.validate(&frame("a", json!(null), None, &token, "n2", NOW)).is_ok());
    assert_eq!(
        gate.validate(&frame("a", json!(null), None, &token, "n3", NOW)).unwrap_err(),
        SecurityError::ReplayCacheFull
    );
}

#[test]
fn full_replay_cache_does_not_trip_lockdown() {
    let config =
        BridgeConfig::from_toml_str("lockdown_threshold = 2\n[replay]\nmax_entries = 1").unwrap();
    let (mut gate, _clock) = gate_with(config);
    let token = gate.token().to_string();
    assert!(gate.validate(&frame("a", json!(null), None, &token, "n0", NOW)).is_ok());
    for i in 1..=5 {
        let nonce = format!("n{i}");
        assert_eq!(
            gate.validate(&frame("a", json!(null), None, &token, &nonce, NOW)).unwrap_err(),
            SecurityError::ReplayCacheFull
        );
    }
    assert!(!gate.is_locked());
}
