use std::{
    collections::HashMap,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
};

use tracing::{info, warn};

use crate::{
    bridge::Bridge,
    error::PluginError,
    plugin::{
        manifest::{PluginEntry, PluginManifest},
        registry::PluginDescriptor,
    },
    registry::panic_message,
};

pub type PluginFactory = Arc<dyn Fn() -> PluginDescriptor + Send + Sync>;

/// Named entry points of one module.
#[derive(Clone, Default)]
pub struct PluginModule {
    entry_points: HashMap<String, PluginFactory>,
}

impl fmt::Debug for PluginModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.entry_points.keys().collect();
        names.sort();
        f.debug_struct("PluginModule").field("entry_points", &names).finish()
    }
}

impl PluginModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry<F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        F: Fn() -> PluginDescriptor + Send + Sync + 'static,
    {
        self.entry_points.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn entry_point(&self, name: &str) -> Option<&PluginFactory> {
        self.entry_points.get(name)
    }
}

/// Startup-time table of every module the host was built with, keyed by the
/// identifier a manifest uses (package name or path).
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    modules: HashMap<String, PluginModule>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn module(mut self, identifier: impl Into<String>, module: PluginModule) -> Self {
        self.insert(identifier, module);
        self
    }

    pub fn insert(&mut self, identifier: impl Into<String>, module: PluginModule) {
        self.modules.insert(identifier.into(), module);
    }

    pub fn resolve(&self, identifier: &str) -> Option<&PluginModule> {
        self.modules.get(identifier)
    }
}

/// What happened to each manifest entry.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Keys of plugins now registered, in load order.
    pub loaded: Vec<String>,
    /// `(identifier, error)` for every entry that was skipped.
    pub failed: Vec<(String, PluginError)>,
}

impl LoadReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Load every manifest entry into `bridge`. A failing entry is logged and
/// recorded; the remaining entries still load.
pub fn load_plugins(bridge: &Bridge, manifest: &PluginManifest, catalog: &PluginCatalog) -> LoadReport {
    let mut report = LoadReport::default();
    for entry in manifest.entries() {
        let identifier = entry.identifier();
        match load_one(bridge, &entry, catalog) {
            Ok(key) => {
                info!(plugin = %identifier, %key, "plugin loaded");
                report.loaded.push(key);
            }
            Err(PluginError::UnsupportedPlatform { plugin, platform }) => {
                info!(plugin = %identifier, %platform, "plugin skipped on this platform");
                report
                    .failed
                    .push((identifier, PluginError::UnsupportedPlatform { plugin, platform }));
            }
            Err(e) => {
                warn!(plugin = %identifier, error = %e, "plugin failed to load");
                report.failed.push((identifier, e));
            }
        }
    }
    report
}

fn load_one(bridge: &Bridge, entry: &PluginEntry, catalog: &PluginCatalog) -> Result<String, PluginError> {
    let identifier = entry.identifier();
    let module = catalog
        .resolve(&identifier)
        .ok_or_else(|| PluginError::UnresolvedModule(identifier.clone()))?;
    let method = entry.entry_point();
    let factory = module
        .entry_point(&method)
        .ok_or_else(|| PluginError::MissingEntryPoint {
            module: identifier.clone(),
            method: method.clone(),
        })?;

    let descriptor = panic::catch_unwind(AssertUnwindSafe(|| factory())).map_err(|panic| {
        PluginError::Registration {
            plugin: identifier.clone(),
            reason: format!("entry point `{method}` panicked: {}", panic_message(panic.as_ref())),
        }
    })?;
    if descriptor.key != entry.namespace {
        return Err(PluginError::NamespaceMismatch {
            plugin: descriptor.name,
            declared: descriptor.key,
            expected: entry.namespace.clone(),
        });
    }
    let key = descriptor.key.clone();
    bridge.register_plugin(descriptor)?;
    Ok(key)
}
