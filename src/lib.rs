//! # webview_bridge
//!
//! A message bridge between a **native host** and **embedded web content** it
//! does not fully trust:
//!
//! - Authenticate every inbound frame (token, nonce replay check, freshness window)
//! - Route actions to registered handlers with per-handler **timeout** and **once** policy
//! - Let independently written **plugins** share one channel under `key:action` namespaces
//! - Push notifications and make request/response **calls** into the content
//!
//! The host side is trusted; the content is loaded from the network and may be
//! stale, compromised or hostile. Nothing reaches a native capability until the
//! frame carrying it has passed the [`security`] gate.
//!
//! ---
//!
//! ## Wire format
//!
//! Content -> host, JSON text:
//!
//! ```json
//! { "protocol": "app://<action>", "payload": {}, "requestId": "r1",
//!   "timestamp": 1700000000000, "__token": "<live token>", "__nonce": "<unique>" }
//! ```
//!
//! Host -> content, JSON embedded in a script that fires a DOM event:
//!
//! ```text
//! window.dispatchEvent(new CustomEvent("nativeMessage",{detail:
//!   { "protocol": "native://<action>", "action": "<action>", "payload": {}, "timestamp": 1700000000000 }}));
//! ```
//!
//! A reply to a request that carried a `requestId` is a host -> content frame
//! with action `bridgeResponse` and payload
//! `{ "requestId", "success", "data"?, "error"? }`.
//!
//! ### Most important gotchas (read this first)
//!
//! - **Rejections are silent to the content.** A frame with a bad token, stale
//!   timestamp, reused or missing nonce never gets a reply. Look at the host
//!   logs (`warn` level) when "nothing happens".
//! - **Frames without the inbound scheme are ignored**, not rejected. The
//!   channel may carry other traffic.
//! - **Repeated rejections lock the gate.** After `lockdown_threshold`
//!   consecutive bad frames every frame is refused until
//!   [`Bridge::reset_security`], which also rotates the token. Re-inject
//!   [`Bridge::bootstrap_script`] afterwards.
//! - **Never log to stdout** when using the stdio transport. Use
//!   [`logging::init_logging`], which writes to stderr.
//!
//! ---
//!
//! ## Crate layout
//!
//! - [`bridge`]: the owning context; start here.
//! - [`security`]: token / nonce / freshness gate and lockdown.
//! - [`registry`]: action handlers, respond-once and timeout handling.
//! - [`namespace`]: `key:action` parsing, plugin key rules, [`NamespacedApi`].
//! - [`outbound`]: notifications, responses and host -> content calls.
//! - [`plugin`]: plugin descriptors, manifest, catalog and loader.
//! - [`transport`]: the text-frame carrier (in-memory channel, stdio framing).
//! - [`config`], [`logging`], [`error`], [`message`], [`clock`], [`client`].
//!
//! ---
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use serde_json::json;
//! use webview_bridge::{Bridge, BridgeConfig, ChannelTransport, HandlerOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     webview_bridge::logging::init_logging();
//!
//!     let bridge = Arc::new(Bridge::new(BridgeConfig::default()));
//!
//!     // Host -> content frames land here; hand them to your webview's
//!     // "evaluate script" API.
//!     let (transport, mut to_content) = ChannelTransport::new();
//!     bridge.attach(Arc::new(transport));
//!
//!     bridge.registry().register(
//!         "echo",
//!         |payload, responder| {
//!             responder.ok(payload);
//!             Ok(())
//!         },
//!         HandlerOptions::new().timeout_ms(5_000),
//!     );
//!
//!     // Inject this before any page script runs.
//!     let _bootstrap = bridge.bootstrap_script();
//!
//!     // Feed every string the content posts:
//!     let accepted = bridge.handle_frame(r#"{"protocol":"app://echo"}"#);
//!     assert!(!accepted); // no token, no nonce: dropped
//!
//!     bridge.send("ready", json!({}));
//!     let _script = to_content.recv().await;
//! }
//! ```
//!
//! ---
//!
//! ## Plugins
//!
//! A plugin is a [`PluginDescriptor`] with a 3-8 letter lowercase key. Its
//! `register_handlers` receives a [`NamespacedApi`] that prefixes everything
//! with `key:`, so two plugins can both register `"start"`.
//!
//! ```
//! use webview_bridge::{Bridge, BridgeConfig, HandlerOptions, PluginDescriptor};
//!
//! let bridge = Bridge::new(BridgeConfig::default());
//! let camera = PluginDescriptor::new("Camera", "cam", "1.0.0").register_handlers(|api, _platform| {
//!     api.register_handler("start", |_payload, responder| {
//!         responder.ok(serde_json::json!({ "started": true }));
//!         Ok(())
//!     }, HandlerOptions::new());
//!     Ok(())
//! });
//!
//! bridge.register_plugin(camera).unwrap();
//! assert!(bridge.registry().contains("cam:start"));
//! ```
//!
//! Plugins can also be listed in a manifest and resolved against a
//! [`PluginCatalog`] built into the host; see [`plugin::load_plugins`].
//! A plugin that fails to resolve or register is logged and skipped.
//!
//! ---
//!
//! ## Troubleshooting
//!
//! ### 1) Content calls never resolve
//! Check:
//! - The content was injected with the **current** token (after a reset, re-inject).
//! - The content and host clocks agree within `freshness_window_ms`.
//! - Every frame has a fresh `__nonce`.
//! - A handler exists for the exact action (plugin actions are `key:action`).
//!
//! ### 2) Everything is rejected, even good frames
//! The gate is locked down ([`Bridge::is_locked`]). Find the source of the
//! bad frames in the logs, then call [`Bridge::reset_security`].
//!
//! ### 3) A plugin is missing
//! [`Bridge::load_plugins`] returns a [`LoadReport`]; its `failed` list says
//! why (bad key, duplicate key, missing entry point, wrong platform, ...).

use std::sync::{Mutex, MutexGuard, PoisonError};

pub mod bridge;
pub mod client;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod namespace;
pub mod outbound;
pub mod plugin;
pub mod registry;
pub mod security;
pub mod transport;

// -------- Core re-exports --------

#[doc(inline)]
pub use bridge::Bridge;
#[doc(inline)]
pub use config::BridgeConfig;
#[doc(inline)]
pub use error::{BridgeError, PluginError, Result, SecurityError};
#[doc(inline)]
pub use message::{BridgeResponse, Message, Reply};
#[doc(inline)]
pub use registry::{HandlerOptions, HandlerRegistry, HandlerResult, Responder};
#[doc(inline)]
pub use transport::{ChannelTransport, Transport};

// -------- Plugin re-exports --------

#[doc(inline)]
pub use namespace::{parse_namespaced_action, NamespacedApi};
#[doc(inline)]
pub use plugin::{LoadReport, Platform, PlatformInfo, PluginCatalog, PluginDescriptor, PluginManifest, PluginModule};

/// Lock a mutex, recovering the data if a panicking thread poisoned it.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
