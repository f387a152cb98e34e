use std::{collections::HashSet, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{error::PluginError, namespace::NamespacedApi, registry::HandlerResult};

/// Host platform a plugin can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Ios,
    Android,
    Macos,
    Windows,
    Linux,
}

impl Platform {
    pub fn current() -> Self {
        if cfg!(target_os = "ios") {
            Platform::Ios
        } else if cfg!(target_os = "android") {
            Platform::Android
        } else if cfg!(target_os = "macos") {
            Platform::Macos
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Ios => "ios",
            Platform::Android => "android",
            Platform::Macos => "macos",
            Platform::Windows => "windows",
            Platform::Linux => "linux",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a plugin learns about the host when it registers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub platform: Platform,
    pub host_version: String,
}

impl PlatformInfo {
    pub fn current() -> Self {
        Self {
            platform: Platform::current(),
            host_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

pub type RegisterHandlersFn = Arc<dyn Fn(&NamespacedApi, &PlatformInfo) -> HandlerResult + Send + Sync>;
pub type LifecycleFn = Arc<dyn Fn() + Send + Sync>;

/// Identity and entry points of a capability module.
#[derive(Clone)]
pub struct PluginDescriptor {
    pub name: String,
    pub key: String,
    pub version: String,
    pub platforms: HashSet<Platform>,
    pub register_handlers: Option<RegisterHandlersFn>,
    pub on_init: Option<LifecycleFn>,
    pub on_destroy: Option<LifecycleFn>,
}

impl fmt::Debug for PluginDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginDescriptor")
            .field("name", &self.name)
            .field("key", &self.key)
            .field("version", &self.version)
            .field("platforms", &self.platforms)
            .field("register_handlers", &self.register_handlers.is_some())
            .field("on_init", &self.on_init.is_some())
            .field("on_destroy", &self.on_destroy.is_some())
            .finish()
    }
}

impl PluginDescriptor {
    /// A descriptor supporting every platform and registering nothing yet.
    pub fn new(name: impl Into<String>, key: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            key: key.into(),
            version: version.into(),
            platforms: [
                Platform::Ios,
                Platform::Android,
                Platform::Macos,
                Platform::Windows,
                Platform::Linux,
            ]
            .into_iter()
            .collect(),
            register_handlers: None,
            on_init: None,
            on_destroy: None,
        }
    }

    pub fn platforms(mut self, platforms: impl IntoIterator<Item = Platform>) -> Self {
        self.platforms = platforms.into_iter().collect();
        self
    }

    pub fn register_handlers<F>(mut self, f: F) -> Self
    where
        F: Fn(&NamespacedApi, &PlatformInfo) -> HandlerResult + Send + Sync + 'static,
    {
        self.register_handlers = Some(Arc::new(f));
        self
    }

    pub fn on_init<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_init = Some(Arc::new(f));
        self
    }

    pub fn on_destroy<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_destroy = Some(Arc::new(f));
        self
    }
}

/// Registered plugins, unique by key, in registration order.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<PluginDescriptor>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.plugins.iter().any(|p| p.key == key)
    }

    pub fn get(&self, key: &str) -> Option<&PluginDescriptor> {
        self.plugins.iter().find(|p| p.key == key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.plugins.iter().map(|p| p.key.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Claim `plugin.key`. Fails with `AlreadyRegistered` if taken.
    pub fn insert(&mut self, plugin: PluginDescriptor) -> Result<(), PluginError> {
        if self.contains(&plugin.key) {
            return Err(PluginError::AlreadyRegistered(plugin.key));
        }
        self.plugins.push(plugin);
        Ok(())
    }

    pub fn remove(&mut self, key: &str) -> Option<PluginDescriptor> {
        let idx = self.plugins.iter().position(|p| p.key == key)?;
        Some(self.plugins.remove(idx))
    }

    /// Empty the registry, newest first, handing each plugin back for teardown.
    pub fn drain_for_teardown(&mut self) -> Vec<PluginDescriptor> {
        let mut drained: Vec<PluginDescriptor> = self.plugins.drain(..).collect();
        drained.reverse();
        drained
    }
}
