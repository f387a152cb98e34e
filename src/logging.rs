//! Logging setup.
//!
//! Logs always go to **stderr**: with the stdio transport, stdout carries
//! protocol frames and a stray log line would corrupt the stream.

use tracing_subscriber::EnvFilter;

use crate::error::{BridgeError, Result};

/// Filter env var checked before `RUST_LOG`.
pub const LOG_ENV: &str = "WEBVIEW_BRIDGE_LOG";

fn filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install a stderr fmt subscriber. Fails if a global subscriber is already set.
pub fn try_init_logging() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| BridgeError::Config(format!("logging already initialised: {e}")))
}

/// Like [`try_init_logging`], ignoring an already-installed subscriber.
pub fn init_logging() {
    let _ = try_init_logging();
}
