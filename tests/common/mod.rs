#![allow(dead_code)]

use std::{
    collections::HashMap,
    env,
    sync::{Arc, Mutex},
};

use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use webview_bridge::{
    clock::{Clock, ManualClock},
    registry::RespondFn,
    Bridge, BridgeConfig, ChannelTransport, Platform, PlatformInfo, Reply,
};

pub const NOW: i64 = 1_700_000_000_000;

/// Env guard that restores previous env vars on drop.
pub struct EnvGuard {
    old: HashMap<String, Option<String>>,
}

impl EnvGuard {
    pub fn set(vars: &[(&str, String)]) -> Self {
        let mut old = HashMap::new();
        for (k, v) in vars {
            old.insert((*k).to_string(), env::var(k).ok());
            env::set_var(k, v);
        }
        Self { old }
    }

    pub fn unset(keys: &[&str]) -> Self {
        let mut old = HashMap::new();
        for k in keys {
            old.insert((*k).to_string(), env::var(k).ok());
            env::remove_var(k);
        }
        Self { old }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (k, prev) in self.old.drain() {
            match prev {
                Some(v) => env::set_var(k, v),
                None => env::remove_var(k),
            }
        }
    }
}

/// Serialized content -> host frame.
pub fn frame(
    action: &str,
    payload: Value,
    request_id: Option<&str>,
    token: &str,
    nonce: &str,
    timestamp: i64,
) -> String {
    let mut v = json!({
        "protocol": format!("app://{action}"),
        "payload": payload,
        "timestamp": timestamp,
        "__token": token,
        "__nonce": nonce,
    });
    if let Some(id) = request_id {
        v["requestId"] = json!(id);
    }
    v.to_string()
}

/// Pull the `detail` JSON back out of a rendered outbound script.
pub fn parse_script(script: &str) -> Value {
    let start = script.find("{detail:").expect("script has detail") + "{detail:".len();
    let end = script.rfind("}));").expect("script is terminated");
    serde_json::from_str(&script[start..end]).expect("detail is JSON")
}

/// A respond callback that records every reply it is given.
pub fn capture() -> (RespondFn, Arc<Mutex<Vec<Reply>>>) {
    let replies = Arc::new(Mutex::new(Vec::new()));
    let sink = replies.clone();
    let respond: RespondFn = Box::new(move |reply| sink.lock().unwrap().push(reply));
    (respond, replies)
}

pub fn linux() -> PlatformInfo {
    PlatformInfo {
        platform: Platform::Linux,
        host_version: "test".to_string(),
    }
}

/// A bridge on a manual clock with an in-memory transport attached.
pub struct Harness {
    pub bridge: Arc<Bridge>,
    pub clock: Arc<ManualClock>,
    pub to_content: UnboundedReceiver<String>,
    nonce_seq: u64,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(BridgeConfig::default())
    }

    pub fn with_config(config: BridgeConfig) -> Self {
        let clock = Arc::new(ManualClock::new(NOW));
        let bridge = Arc::new(Bridge::with_parts(config, clock.clone(), linux()));
        let (transport, to_content) = ChannelTransport::new();
        bridge.attach(Arc::new(transport));
        Self {
            bridge,
            clock,
            to_content,
            nonce_seq: 0,
        }
    }

    /// A valid frame: live token, fresh nonce, current time.
    pub fn inbound(&mut self, action: &str, payload: Value, request_id: Option<&str>) -> String {
        self.nonce_seq += 1;
        let nonce = format!("nonce-{}", self.nonce_seq);
        frame(
            action,
            payload,
            request_id,
            &self.bridge.token(),
            &nonce,
            self.clock.now_ms(),
        )
    }

    /// Next outbound frame, decoded, if one is queued.
    pub fn next_frame(&mut self) -> Option<Value> {
        self.to_content.try_recv().ok().map(|s| parse_script(&s))
    }
}
