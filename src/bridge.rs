//! The bridge context: owns the security gate, handler registry, outbound
//! dispatcher and plugin registry for one embedded-content channel.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex},
    time::Duration,
};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::{
    client,
    clock::{Clock, SystemClock},
    config::BridgeConfig,
    error::{PluginError, Result},
    lock,
    message::{BridgeResponse, RESPONSE_ACTION},
    namespace::{namespaced, validate_plugin, NamespacedApi},
    outbound::Outbound,
    plugin::{self, LoadReport, PlatformInfo, PluginCatalog, PluginDescriptor, PluginManifest, PluginRegistry},
    registry::{panic_message, Dispatch, HandlerRegistry, RespondFn},
    security::SecurityGate,
    transport::Transport,
};

/// One host <-> content bridge.
///
/// Construct it at host startup, [`attach`](Bridge::attach) a transport,
/// feed inbound text through [`handle_frame`](Bridge::handle_frame) (or let
/// [`run`](Bridge::run) do it), and call [`shutdown`](Bridge::shutdown) at
/// teardown.
pub struct Bridge {
    config: BridgeConfig,
    platform: PlatformInfo,
    gate: Mutex<SecurityGate>,
    registry: HandlerRegistry,
    outbound: Outbound,
    plugins: Mutex<PluginRegistry>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Self {
        Self::with_parts(config, Arc::new(SystemClock), PlatformInfo::current())
    }

    pub fn with_parts(config: BridgeConfig, clock: Arc<dyn Clock>, platform: PlatformInfo) -> Self {
        Self {
            gate: Mutex::new(SecurityGate::new(&config, clock.clone())),
            outbound: Outbound::new(&config, clock),
            registry: HandlerRegistry::new(),
            plugins: Mutex::new(PluginRegistry::new()),
            platform,
            config,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn platform(&self) -> &PlatformInfo {
        &self.platform
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn outbound(&self) -> &Outbound {
        &self.outbound
    }

    /// The live token (changes on [`reset_security`](Bridge::reset_security)).
    pub fn token(&self) -> String {
        lock(&self.gate).token().to_string()
    }

    /// Script to inject into content allowed to call back.
    pub fn bootstrap_script(&self) -> String {
        client::bootstrap_script(&self.config, &self.token())
    }

    pub fn attach(&self, transport: Arc<dyn Transport>) {
        self.outbound.attach(transport);
    }

    pub fn detach(&self) {
        self.outbound.detach();
    }

    pub fn lockdown(&self) {
        lock(&self.gate).lockdown();
    }

    pub fn is_locked(&self) -> bool {
        lock(&self.gate).is_locked()
    }

    /// Clear lockdown and the replay cache, and rotate the token.
    pub fn reset_security(&self) {
        lock(&self.gate).reset();
    }

    /// Validate and route one inbound frame. Returns whether a handler (or a
    /// pending host call) took it; rejected frames are logged and dropped
    /// without any reply to the content.
    pub fn handle_frame(&self, raw: &str) -> bool {
        let validated = lock(&self.gate).validate(raw);
        let message = match validated {
            Ok(message) => message,
            Err(e) if e.is_silent() => return false,
            Err(e) => {
                warn!(reason = %e, "inbound frame rejected");
                return false;
            }
        };
        debug!(action = %message.action, request_id = ?message.request_id, "inbound frame accepted");

        if message.action == RESPONSE_ACTION {
            if let Ok(response) = serde_json::from_value::<BridgeResponse>(message.payload.clone()) {
                if self.outbound.is_pending(&response.request_id) {
                    return self.outbound.resolve(response);
                }
            }
        }

        let respond: RespondFn = match message.request_id {
            Some(request_id) => {
                let outbound = self.outbound.clone();
                Box::new(move |reply| {
                    outbound.send_response(BridgeResponse::from_reply(request_id, reply));
                })
            }
            None => {
                let action = message.action.clone();
                Box::new(move |reply| {
                    if let Err(error) = reply {
                        debug!(%action, %error, "uncorrelated request failed");
                    }
                })
            }
        };
        self.registry.dispatch(&message.action, message.payload, respond) == Dispatch::Handled
    }

    /// Notify the content (un-namespaced).
    pub fn send(&self, action: &str, payload: Value) -> bool {
        self.outbound.send(action, payload)
    }

    /// Host -> content request; see [`Outbound::call`].
    pub async fn call(&self, action: &str, payload: Value, timeout: Option<Duration>) -> Result<Value> {
        self.outbound.call(action, payload, timeout).await
    }

    pub fn namespaced_api(&self, key: &str) -> NamespacedApi {
        NamespacedApi::new(key, self.registry.clone(), self.outbound.clone())
    }

    /// Validate, claim the key, run `on_init`, then `register_handlers`.
    /// If either hook fails or panics, the plugin is rolled back: `on_destroy`
    /// runs when `on_init` completed, installed handlers are removed and the
    /// key is released.
    pub fn register_plugin(&self, plugin: PluginDescriptor) -> std::result::Result<(), PluginError> {
        validate_plugin(&plugin)?;
        if !plugin.platforms.contains(&self.platform.platform) {
            return Err(PluginError::UnsupportedPlatform {
                plugin: plugin.name.clone(),
                platform: self.platform.platform.to_string(),
            });
        }
        lock(&self.plugins).insert(plugin.clone())?;

        let mut initialized = false;
        let setup = panic::catch_unwind(AssertUnwindSafe(|| {
            if let Some(on_init) = &plugin.on_init {
                on_init();
            }
            initialized = true;
            let api = self.namespaced_api(&plugin.key);
            match &plugin.register_handlers {
                Some(register) => register(&api, &self.platform).map_err(|e| e.to_string()),
                None => Ok(()),
            }
        }));
        let reason = match setup {
            Ok(Ok(())) => {
                info!(plugin = %plugin.name, key = %plugin.key, version = %plugin.version, "plugin registered");
                return Ok(());
            }
            Ok(Err(reason)) => reason,
            Err(panic) => format!("panicked: {}", panic_message(panic.as_ref())),
        };

        if initialized {
            run_destroy(&plugin);
        }
        self.registry.unregister_prefix(&namespaced(&plugin.key, ""));
        lock(&self.plugins).remove(&plugin.key);
        warn!(plugin = %plugin.name, key = %plugin.key, %reason, "plugin rolled back");
        Err(PluginError::Registration {
            plugin: plugin.name,
            reason,
        })
    }

    pub fn plugin_keys(&self) -> Vec<String> {
        lock(&self.plugins).keys()
    }

    pub fn has_plugin(&self, key: &str) -> bool {
        lock(&self.plugins).contains(key)
    }

    pub fn load_plugins(&self, manifest: &PluginManifest, catalog: &PluginCatalog) -> LoadReport {
        plugin::load_plugins(self, manifest, catalog)
    }

    /// Teardown: `on_destroy` for every plugin (newest first), clear all
    /// handlers, detach the transport.
    pub fn shutdown(&self) {
        let plugins = lock(&self.plugins).drain_for_teardown();
        for plugin in &plugins {
            run_destroy(plugin);
            debug!(key = %plugin.key, "plugin destroyed");
        }
        self.registry.clear();
        self.outbound.detach();
        info!(plugins = plugins.len(), "bridge shut down");
    }

    /// Process frames from `rx` until the sender side closes.
    pub async fn run(&self, mut rx: mpsc::UnboundedReceiver<String>) {
        while let Some(raw) = rx.recv().await {
            self.handle_frame(&raw);
        }
        debug!("inbound channel closed");
    }

    /// Attach a stdout transport and process length-prefixed stdin frames
    /// until the content closes stdin. EOF is a normal shutdown.
    #[cfg(feature = "stdio")]
    pub async fn run_stdio(&self) -> std::io::Result<()> {
        use crate::transport::{read_stdin_frame, StdoutTransport};

        self.attach(Arc::new(StdoutTransport::spawn()));
        loop {
            match read_stdin_frame().await {
                Ok(raw) => {
                    self.handle_frame(&raw);
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    info!("content closed stdin");
                    self.detach();
                    return Ok(());
                }
                Err(e) => {
                    self.detach();
                    return Err(e);
                }
            }
        }
    }
}

/// `on_destroy` is teardown; a panic in it is logged and never escapes.
fn run_destroy(plugin: &PluginDescriptor) {
    let Some(on_destroy) = &plugin.on_destroy else {
        return;
    };
    if let Err(panic) = panic::catch_unwind(AssertUnwindSafe(|| on_destroy())) {
        warn!(key = %plugin.key, reason = %panic_message(panic.as_ref()), "on_destroy panicked");
    }
}

impl std::fmt::Debug for Bridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("platform", &self.platform)
            .field("registry", &self.registry)
            .field("outbound", &self.outbound)
            .field("plugins", &self.plugin_keys())
            .finish()
    }
}
