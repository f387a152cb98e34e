//! Namespace router: `key:action` addressing for plugins.
//!
//! A plugin registers `"start"` through its [`NamespacedApi`] and the
//! global registry sees `"cam:start"`. Only the first `:` separates key from
//! action, so `"cam:stream:start"` is local action `"stream:start"` of `cam`.

use serde_json::Value;

use crate::{
    error::PluginError,
    message::Reply,
    outbound::Outbound,
    plugin::PluginDescriptor,
    registry::{HandlerOptions, HandlerRegistry, HandlerResult, Responder},
};

pub const SEPARATOR: char = ':';

/// Keys kept for host-internal channels.
pub const RESERVED_KEYS: [&str; 2] = ["bridge", "system"];

pub const MIN_KEY_LEN: usize = 3;
pub const MAX_KEY_LEN: usize = 8;

/// A `key:action` split.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespacedAction<'a> {
    pub key: &'a str,
    pub action: &'a str,
}

/// Split on the first `:`. Returns `None` for un-namespaced actions or an
/// empty key/action.
///
/// ```
/// use webview_bridge::namespace::parse_namespaced_action;
///
/// let parsed = parse_namespaced_action("cam:stream:start").unwrap();
/// assert_eq!((parsed.key, parsed.action), ("cam", "stream:start"));
/// assert!(parse_namespaced_action("showToast").is_none());
/// ```
pub fn parse_namespaced_action(action: &str) -> Option<NamespacedAction<'_>> {
    let (key, action) = action.split_once(SEPARATOR)?;
    if key.is_empty() || action.is_empty() {
        return None;
    }
    Some(NamespacedAction { key, action })
}

pub fn namespaced(key: &str, action: &str) -> String {
    format!("{key}{SEPARATOR}{action}")
}

/// Check a plugin key: 3-8 chars, `^[a-z]+$`, not reserved.
pub fn validate_key(key: &str) -> Result<(), PluginError> {
    let len = key.chars().count();
    if !(MIN_KEY_LEN..=MAX_KEY_LEN).contains(&len) {
        return Err(PluginError::KeyLength {
            key: key.to_string(),
            len,
        });
    }
    if !key.chars().all(|c| c.is_ascii_lowercase()) {
        return Err(PluginError::KeyFormat(key.to_string()));
    }
    if RESERVED_KEYS.contains(&key) {
        return Err(PluginError::ReservedKey(key.to_string()));
    }
    Ok(())
}

/// Structural checks on a descriptor. Duplicate keys are the plugin
/// registry's concern, not this function's.
pub fn validate_plugin(plugin: &PluginDescriptor) -> Result<(), PluginError> {
    if plugin.name.trim().is_empty() {
        return Err(PluginError::MissingField("name"));
    }
    if plugin.key.is_empty() {
        return Err(PluginError::MissingField("key"));
    }
    if plugin.version.trim().is_empty() {
        return Err(PluginError::MissingField("version"));
    }
    if plugin.platforms.is_empty() {
        return Err(PluginError::MissingField("platforms"));
    }
    if plugin.register_handlers.is_none() {
        return Err(PluginError::MissingField("registerHandlers"));
    }
    validate_key(&plugin.key)
}

/// Registry/dispatcher facade bound to one plugin key.
#[derive(Debug, Clone)]
pub struct NamespacedApi {
    key: String,
    registry: HandlerRegistry,
    outbound: Outbound,
}

impl NamespacedApi {
    pub fn new(key: impl Into<String>, registry: HandlerRegistry, outbound: Outbound) -> Self {
        Self {
            key: key.into(),
            registry,
            outbound,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Global action name for a local one.
    pub fn qualify(&self, action: &str) -> String {
        namespaced(&self.key, action)
    }

    pub fn register_handler<F>(&self, action: &str, callback: F, options: HandlerOptions)
    where
        F: Fn(Value, Responder) -> HandlerResult + Send + Sync + 'static,
    {
        self.registry.register(self.qualify(action), callback, options);
    }

    pub fn register_async<F, Fut>(&self, action: &str, handler: F, options: HandlerOptions)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Reply> + Send + 'static,
    {
        self.registry.register_async(self.qualify(action), handler, options);
    }

    pub fn unregister_handler(&self, action: &str) -> bool {
        self.registry.unregister(&self.qualify(action))
    }

    /// Notify the content under `key:action`.
    pub fn send_to_web(&self, action: &str, payload: Value) -> bool {
        self.outbound.send(&self.qualify(action), payload)
    }
}
