//! Error types for the bridge.
//!
//! Security rejections and plugin faults have their own enums so callers can
//! match on the exact cause; [`BridgeError`] wraps both for the crate-level
//! [`Result`] alias.

use thiserror::Error;

/// Why the security gate refused an inbound frame.
///
/// Only [`SecurityError::NotBridgeFrame`] is silent: the channel may carry
/// unrelated traffic. Every other variant is logged host-side and dropped;
/// none of them is ever reported back to the content.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SecurityError {
    #[error("not a bridge frame")]
    NotBridgeFrame,

    #[error("malformed bridge frame: {0}")]
    Malformed(String),

    #[error("missing nonce")]
    MissingNonce,

    /// Bad token, or the gate is locked down. Callers cannot tell which.
    #[error("unauthorized")]
    Unauthorized,

    #[error("stale frame: {age_ms}ms outside the {window_ms}ms freshness window")]
    Stale { age_ms: i64, window_ms: i64 },

    #[error("replayed nonce")]
    Replay,

    #[error("replay cache is full")]
    ReplayCacheFull,
}

impl SecurityError {
    /// `true` for traffic that simply isn't ours and must not be logged as an attack.
    pub fn is_silent(&self) -> bool {
        matches!(self, SecurityError::NotBridgeFrame)
    }
}

/// Plugin validation, registration and loading failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("plugin field `{0}` is required")]
    MissingField(&'static str),

    #[error("plugin key `{key}` must be 3-8 characters long (got {len})")]
    KeyLength { key: String, len: usize },

    #[error("plugin key `{0}` must contain only lowercase letters a-z")]
    KeyFormat(String),

    #[error("plugin key `{0}` is reserved for host-internal channels")]
    ReservedKey(String),

    #[error("plugin key `{0}` is already registered")]
    AlreadyRegistered(String),

    #[error("plugin `{plugin}` does not support platform `{platform}`")]
    UnsupportedPlatform { plugin: String, platform: String },

    #[error("plugin module `{0}` could not be resolved")]
    UnresolvedModule(String),

    #[error("plugin module `{module}` has no entry point `{method}`")]
    MissingEntryPoint { module: String, method: String },

    #[error("plugin `{plugin}` declares key `{declared}` but the manifest namespace is `{expected}`")]
    NamespaceMismatch {
        plugin: String,
        declared: String,
        expected: String,
    },

    #[error("plugin `{plugin}` failed to register handlers: {reason}")]
    Registration { plugin: String, reason: String },
}

/// Top-level error type for bridge operations.
#[derive(Debug, Error)]
pub enum BridgeError {
    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    #[error("no live content is attached to the bridge")]
    Detached,

    #[error("call `{action}` timed out after {timeout_ms}ms")]
    CallTimeout { action: String, timeout_ms: u64 },

    #[error("call failed: {0}")]
    CallFailed(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<toml::de::Error> for BridgeError {
    fn from(e: toml::de::Error) -> Self {
        BridgeError::Config(e.to_string())
    }
}

/// Alias used throughout the crate.
pub type Result<T> = std::result::Result<T, BridgeError>;
