//! Outbound dispatcher: host -> content notifications, responses and calls.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
    time::Duration,
};

use serde_json::{json, Value};
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::BridgeConfig,
    error::{BridgeError, Result},
    lock,
    message::{render_script, BridgeResponse, OutboundFrame, Reply, RESPONSE_ACTION},
    transport::Transport,
};

struct Inner {
    scheme: String,
    event_name: String,
    default_timeout: Duration,
    clock: Arc<dyn Clock>,
    transport: Mutex<Option<Arc<dyn Transport>>>,
    pending: Mutex<HashMap<String, oneshot::Sender<Reply>>>,
}

/// Serializes frames for the content and tracks host-initiated calls.
/// Clones share the same transport slot and pending-call table.
#[derive(Clone)]
pub struct Outbound {
    inner: Arc<Inner>,
}

impl fmt::Debug for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbound")
            .field("scheme", &self.inner.scheme)
            .field("attached", &self.is_attached())
            .field("pending_calls", &self.pending_calls())
            .finish()
    }
}

impl Outbound {
    pub fn new(config: &BridgeConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                scheme: config.outbound_scheme.clone(),
                event_name: config.client_event.clone(),
                default_timeout: config.default_call_timeout(),
                clock,
                transport: Mutex::new(None),
                pending: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn attach(&self, transport: Arc<dyn Transport>) {
        *lock(&self.inner.transport) = Some(transport);
        debug!("content transport attached");
    }

    /// Drop the transport and fail every in-flight call with [`BridgeError::Detached`].
    pub fn detach(&self) {
        lock(&self.inner.transport).take();
        let failed = std::mem::take(&mut *lock(&self.inner.pending));
        if !failed.is_empty() {
            debug!(count = failed.len(), "failing pending calls on detach");
        }
        // Dropping the senders wakes every waiter with a recv error.
        drop(failed);
    }

    pub fn is_attached(&self) -> bool {
        lock(&self.inner.transport)
            .as_ref()
            .is_some_and(|t| t.is_attached())
    }

    pub fn pending_calls(&self) -> usize {
        lock(&self.inner.pending).len()
    }

    /// Build the frame for `action` without sending it.
    pub fn frame(&self, action: &str, payload: Option<Value>) -> OutboundFrame {
        OutboundFrame {
            protocol: format!("{}{}", self.inner.scheme, action),
            action: action.to_string(),
            payload,
            timestamp: self.inner.clock.now_ms(),
        }
    }

    /// Fire-and-forget notification. Returns `false` (and logs) when no live
    /// content is attached or the transport refuses the frame.
    pub fn send(&self, action: &str, payload: Value) -> bool {
        self.send_frame(self.frame(action, Some(payload)))
    }

    /// Send the reply to a correlated content request.
    pub fn send_response(&self, response: BridgeResponse) -> bool {
        match serde_json::to_value(&response) {
            Ok(payload) => self.send(RESPONSE_ACTION, payload),
            Err(e) => {
                warn!(error = %e, request_id = %response.request_id, "response not serializable");
                false
            }
        }
    }

    fn send_frame(&self, frame: OutboundFrame) -> bool {
        let Some(transport) = lock(&self.inner.transport).clone() else {
            debug!(action = %frame.action, "no content attached; frame dropped");
            return false;
        };
        if !transport.is_attached() {
            debug!(action = %frame.action, "content detached; frame dropped");
            return false;
        }
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(e) => {
                warn!(action = %frame.action, error = %e, "frame not serializable");
                return false;
            }
        };
        match transport.send_text(render_script(&json, &self.inner.event_name)) {
            Ok(()) => true,
            Err(e) => {
                warn!(action = %frame.action, error = %e, "transport refused frame");
                false
            }
        }
    }

    /// Host -> content request/response.
    ///
    /// The request goes out as `action` with payload
    /// `{ "requestId": <fresh id>, "data": payload }`; the content answers with
    /// a `bridgeResponse` frame carrying the same `requestId`. Resolves with the
    /// response data, or fails with `CallFailed`, `CallTimeout` or `Detached`.
    pub async fn call(&self, action: &str, payload: Value, timeout: Option<Duration>) -> Result<Value> {
        let timeout = timeout.unwrap_or(self.inner.default_timeout);
        let (tx, rx) = oneshot::channel();
        let request_id = {
            let mut pending = lock(&self.inner.pending);
            let mut id = Uuid::new_v4().to_string();
            while pending.contains_key(&id) {
                id = Uuid::new_v4().to_string();
            }
            pending.insert(id.clone(), tx);
            id
        };
        let _entry = PendingEntry {
            pending: &self.inner.pending,
            request_id: &request_id,
        };

        if !self.send(action, json!({ "requestId": request_id, "data": payload })) {
            return Err(BridgeError::Detached);
        }
        debug!(action, %request_id, "call sent");

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(data))) => Ok(data),
            Ok(Ok(Err(message))) => Err(BridgeError::CallFailed(message)),
            Ok(Err(_)) => Err(BridgeError::Detached),
            Err(_) => Err(BridgeError::CallTimeout {
                action: action.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
        }
    }

    /// Complete a pending [`Outbound::call`]. Returns `false` if the id is
    /// unknown (never issued, already answered, or timed out).
    pub fn resolve(&self, response: BridgeResponse) -> bool {
        let Some(tx) = lock(&self.inner.pending).remove(&response.request_id) else {
            debug!(request_id = %response.request_id, "late or unknown response discarded");
            return false;
        };
        tx.send(response.into_reply()).is_ok()
    }

    pub fn is_pending(&self, request_id: &str) -> bool {
        lock(&self.inner.pending).contains_key(request_id)
    }
}

/// Drops a call's pending slot however the call ends, including when the
/// caller abandons the future.
struct PendingEntry<'a> {
    pending: &'a Mutex<HashMap<String, oneshot::Sender<Reply>>>,
    request_id: &'a str,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        lock(self.pending).remove(self.request_id);
    }
}
