//! Security gate: every inbound frame passes through [`SecurityGate::validate`]
//! before anything is dispatched.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. the text parses as a JSON object with a string `protocol`;
//! 2. `protocol` starts with the inbound scheme (otherwise: not our traffic);
//! 3. the frame deserializes and names a non-empty action;
//! 4. `__nonce` is non-empty;
//! 5. the gate is not locked down and `__token` equals the live token;
//! 6. `timestamp` is within the freshness window of the host clock;
//! 7. the nonce has not been seen before.
//!
//! The replay cache is only written when a frame is accepted.

use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use rand::RngCore;
use serde_json::Value;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};

use crate::{
    clock::Clock,
    config::{BridgeConfig, ReplayMode},
    error::SecurityError,
    message::{InboundFrame, Message},
};

const TOKEN_BYTES: usize = 32;

/// Stateful validator holding the live token, the replay cache and lockdown state.
pub struct SecurityGate {
    inbound_scheme: String,
    window_ms: i64,
    lockdown_threshold: u32,
    replay_mode: ReplayMode,
    max_nonces: usize,
    clock: Arc<dyn Clock>,

    token: String,
    seen: HashMap<String, i64>,
    // Insertion order for windowed eviction.
    seen_order: VecDeque<(i64, String)>,
    consecutive_failures: u32,
    locked: bool,
}

impl SecurityGate {
    pub fn new(config: &BridgeConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inbound_scheme: config.inbound_scheme.clone(),
            window_ms: config.freshness_window_ms,
            lockdown_threshold: config.lockdown_threshold,
            replay_mode: config.replay.mode,
            max_nonces: config.replay.max_entries,
            clock,
            token: generate_token(),
            seen: HashMap::new(),
            seen_order: VecDeque::new(),
            consecutive_failures: 0,
            locked: false,
        }
    }

    /// The live token. Embed it only in content that may call back.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    pub fn replay_cache_len(&self) -> usize {
        self.seen.len()
    }

    /// Reject everything until [`SecurityGate::reset`].
    pub fn lockdown(&mut self) {
        if !self.locked {
            warn!("security gate locked down");
        }
        self.locked = true;
    }

    /// Leave lockdown, forget all nonces and rotate the token. Content
    /// holding the old token can no longer call in.
    pub fn reset(&mut self) {
        self.locked = false;
        self.consecutive_failures = 0;
        self.seen.clear();
        self.seen_order.clear();
        self.token = generate_token();
        info!("security gate reset; token rotated");
    }

    pub fn validate(&mut self, raw: &str) -> Result<Message, SecurityError> {
        let value: Value = serde_json::from_str(raw).map_err(|_| SecurityError::NotBridgeFrame)?;
        let is_ours = value
            .get("protocol")
            .and_then(Value::as_str)
            .is_some_and(|p| p.starts_with(&self.inbound_scheme));
        if !is_ours {
            return Err(SecurityError::NotBridgeFrame);
        }

        match self.check(value) {
            Ok(message) => {
                self.consecutive_failures = 0;
                Ok(message)
            }
            // A full cache does not count toward lockdown.
            Err(SecurityError::ReplayCacheFull) => Err(SecurityError::ReplayCacheFull),
            Err(err) => {
                self.record_failure();
                Err(err)
            }
        }
    }

    fn check(&mut self, value: Value) -> Result<Message, SecurityError> {
        let frame: InboundFrame =
            serde_json::from_value(value).map_err(|e| SecurityError::Malformed(e.to_string()))?;
        let action = frame.protocol[self.inbound_scheme.len()..].to_string();
        if action.is_empty() {
            return Err(SecurityError::Malformed("empty action".to_string()));
        }

        if frame.nonce.is_empty() {
            return Err(SecurityError::MissingNonce);
        }

        if self.locked || !token_matches(&frame.token, &self.token) {
            return Err(SecurityError::Unauthorized);
        }

        let now = self.clock.now_ms();
        let age_ms = now.saturating_sub(frame.timestamp);
        if age_ms.unsigned_abs() > self.window_ms.unsigned_abs() {
            return Err(SecurityError::Stale {
                age_ms,
                window_ms: self.window_ms,
            });
        }

        self.evict(now);
        if self.seen.contains_key(&frame.nonce) {
            return Err(SecurityError::Replay);
        }
        if self.seen.len() >= self.max_nonces {
            return Err(SecurityError::ReplayCacheFull);
        }
        self.seen.insert(frame.nonce.clone(), now);
        self.seen_order.push_back((now, frame.nonce.clone()));

        Ok(Message {
            action,
            payload: frame.payload,
            request_id: frame.request_id,
            timestamp: frame.timestamp,
            nonce: frame.nonce,
        })
    }

    /// A nonce seen at `t` can only ride on frames stamped within `t ± window`,
    /// which are all stale once `now > t + 2 * window`.
    fn evict(&mut self, now: i64) {
        if self.replay_mode != ReplayMode::Windowed {
            return;
        }
        let cutoff = now.saturating_sub(self.window_ms.saturating_mul(2));
        let before = self.seen.len();
        while let Some((seen_at, _)) = self.seen_order.front() {
            if *seen_at >= cutoff {
                break;
            }
            if let Some((_, nonce)) = self.seen_order.pop_front() {
                self.seen.remove(&nonce);
            }
        }
        if self.seen.len() < before {
            debug!(
                evicted = before - self.seen.len(),
                remaining = self.seen.len(),
                "replay cache pruned"
            );
        }
    }

    fn record_failure(&mut self) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.lockdown_threshold > 0 && self.consecutive_failures >= self.lockdown_threshold {
            self.lockdown();
        }
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn token_matches(candidate: &str, token: &str) -> bool {
    bool::from(candidate.as_bytes().ct_eq(token.as_bytes()))
}
