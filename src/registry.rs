//! Handler registry: action name -> callback + lifecycle policy.
//!
//! Every dispatch wraps the caller's respond callback in a [`Responder`]
//! whose state moves `Pending -> Responded` or `Pending -> TimedOut`
//! exactly once. Whichever transition happens first delivers its reply;
//! the other is a no-op.

use std::{
    collections::HashMap,
    fmt,
    future::Future,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex},
    time::Duration,
};

use serde_json::Value;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

use crate::{lock, message::Reply};

/// Return type of handler callbacks. An `Err` becomes an error response.
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Caller-supplied sink for the (single) reply of one dispatch.
pub type RespondFn = Box<dyn FnOnce(Reply) + Send + 'static>;

type HandlerFn = Arc<dyn Fn(Value, Responder) -> HandlerResult + Send + Sync>;

/// Per-handler lifecycle policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandlerOptions {
    /// Auto-respond with an error if the handler hasn't responded by then.
    pub timeout: Option<Duration>,
    /// Remove the handler when it is dispatched (before it runs).
    pub once: bool,
}

impl HandlerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn timeout_ms(self, ms: u64) -> Self {
        self.timeout(Duration::from_millis(ms))
    }

    pub fn once(mut self) -> Self {
        self.once = true;
        self
    }
}

/// Observable state of one dispatched call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallStatus {
    Pending,
    Responded,
    TimedOut,
}

enum CallState {
    Pending {
        respond: RespondFn,
        timer: Option<AbortHandle>,
    },
    Responded,
    TimedOut,
}

struct PendingCall {
    action: String,
    state: Mutex<CallState>,
}

/// Respond-once handle given to a handler. Cheap to clone; all clones share
/// the same call state.
#[derive(Clone)]
pub struct Responder {
    call: Arc<PendingCall>,
}

impl fmt::Debug for Responder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Responder")
            .field("action", &self.call.action)
            .field("status", &self.status())
            .finish()
    }
}

impl Responder {
    fn new(action: &str, respond: RespondFn) -> Self {
        Self {
            call: Arc::new(PendingCall {
                action: action.to_string(),
                state: Mutex::new(CallState::Pending {
                    respond,
                    timer: None,
                }),
            }),
        }
    }

    pub fn action(&self) -> &str {
        &self.call.action
    }

    /// Deliver `reply` if nothing else has. Returns whether this call won.
    pub fn respond(&self, reply: Reply) -> bool {
        self.settle(CallState::Responded, reply)
    }

    pub fn ok(&self, data: Value) -> bool {
        self.respond(Ok(data))
    }

    pub fn err(&self, message: impl Into<String>) -> bool {
        self.respond(Err(message.into()))
    }

    pub fn status(&self) -> CallStatus {
        match &*lock(&self.call.state) {
            CallState::Pending { .. } => CallStatus::Pending,
            CallState::Responded => CallStatus::Responded,
            CallState::TimedOut => CallStatus::TimedOut,
        }
    }

    fn time_out(&self, after: Duration) -> bool {
        self.settle(
            CallState::TimedOut,
            Err(format!(
                "handler `{}` timed out after {}ms",
                self.call.action,
                after.as_millis()
            )),
        )
    }

    fn arm_timer(&self, timer: AbortHandle) {
        match &mut *lock(&self.call.state) {
            CallState::Pending { timer: slot, .. } => *slot = Some(timer),
            _ => timer.abort(),
        }
    }

    fn settle(&self, next: CallState, reply: Reply) -> bool {
        let by_timer = matches!(next, CallState::TimedOut);
        let (respond, timer) = {
            let mut state = lock(&self.call.state);
            match std::mem::replace(&mut *state, next) {
                CallState::Pending { respond, timer } => (respond, timer),
                settled => {
                    *state = settled;
                    return false;
                }
            }
        };
        if !by_timer {
            if let Some(timer) = timer {
                timer.abort();
            }
        }
        respond(reply);
        true
    }
}

/// Result of [`HandlerRegistry::dispatch`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    Unhandled,
}

#[derive(Clone)]
struct Registered {
    callback: HandlerFn,
    options: HandlerOptions,
}

/// Shared action -> handler map. Clones share the same map.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: Arc<Mutex<HashMap<String, Registered>>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("actions", &self.actions())
            .finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the handler for `action`.
    pub fn register<F>(&self, action: impl Into<String>, callback: F, options: HandlerOptions)
    where
        F: Fn(Value, Responder) -> HandlerResult + Send + Sync + 'static,
    {
        let action = action.into();
        let replaced = lock(&self.handlers)
            .insert(
                action.clone(),
                Registered {
                    callback: Arc::new(callback),
                    options,
                },
            )
            .is_some();
        debug!(%action, replaced, once = options.once, timeout = ?options.timeout, "handler registered");
    }

    /// Install a handler whose reply is the output of a future. The future is
    /// spawned on the current tokio runtime; dispatching outside one fails the call.
    pub fn register_async<F, Fut>(&self, action: impl Into<String>, handler: F, options: HandlerOptions)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Reply> + Send + 'static,
    {
        self.register(
            action,
            move |payload, responder| {
                let runtime = tokio::runtime::Handle::try_current()?;
                let fut = handler(payload);
                runtime.spawn(async move {
                    responder.respond(fut.await);
                });
                Ok(())
            },
            options,
        );
    }

    /// Remove the handler for `action`. Missing actions are fine.
    pub fn unregister(&self, action: &str) -> bool {
        let removed = lock(&self.handlers).remove(action).is_some();
        if removed {
            debug!(action, "handler unregistered");
        }
        removed
    }

    /// Remove every handler whose action starts with `prefix`.
    pub fn unregister_prefix(&self, prefix: &str) -> usize {
        let mut handlers = lock(&self.handlers);
        let before = handlers.len();
        handlers.retain(|action, _| !action.starts_with(prefix));
        before - handlers.len()
    }

    pub fn clear(&self) {
        let mut handlers = lock(&self.handlers);
        let count = handlers.len();
        handlers.clear();
        debug!(count, "handler registry cleared");
    }

    pub fn contains(&self, action: &str) -> bool {
        lock(&self.handlers).contains_key(action)
    }

    pub fn len(&self) -> usize {
        lock(&self.handlers).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registered action names, sorted.
    pub fn actions(&self) -> Vec<String> {
        let mut actions: Vec<String> = lock(&self.handlers).keys().cloned().collect();
        actions.sort();
        actions
    }

    /// Run the handler for `action`.
    ///
    /// Unknown actions get an error reply through `respond` and report
    /// [`Dispatch::Unhandled`]. Otherwise the handler runs on the calling
    /// thread and this returns as soon as it does; an async handler replies
    /// later through its [`Responder`]. Errors and panics raised by the
    /// callback itself become error replies.
    pub fn dispatch(&self, action: &str, payload: Value, respond: RespondFn) -> Dispatch {
        let registered = {
            let mut handlers = lock(&self.handlers);
            match handlers.get(action).map(|h| h.options.once) {
                Some(true) => handlers.remove(action),
                Some(false) => handlers.get(action).cloned(),
                None => None,
            }
        };
        let Some(registered) = registered else {
            debug!(action, "no handler registered");
            respond(Err(format!("no handler registered for action `{action}`")));
            return Dispatch::Unhandled;
        };

        let responder = Responder::new(action, respond);
        if let Some(timeout) = registered.options.timeout {
            arm_timeout(&responder, timeout);
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            (registered.callback)(payload, responder.clone())
        }));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(action, error = %e, "handler failed");
                responder.err(e.to_string());
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                warn!(action, %reason, "handler panicked");
                responder.err(format!("handler panicked: {reason}"));
            }
        }
        Dispatch::Handled
    }
}

fn arm_timeout(responder: &Responder, timeout: Duration) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        warn!(
            action = responder.action(),
            "no tokio runtime; handler timeout not armed"
        );
        return;
    };
    let call = responder.clone();
    let task = runtime.spawn(async move {
        tokio::time::sleep(timeout).await;
        if call.time_out(timeout) {
            warn!(action = call.action(), timeout_ms = timeout.as_millis() as u64, "handler timed out");
        }
    });
    responder.arm_timer(task.abort_handle());
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
