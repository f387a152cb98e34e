use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};

use crate::error::{BridgeError, Result};

/// Declarative list of plugins to load at startup.
///
/// JSON shape:
///
/// ```json
/// { "plugins": {
///     "auto":   [{ "name": "@acme/camera", "namespace": "cam" }],
///     "manual": [{ "path": "./plugins/toast", "namespace": "toast", "method": "install" }]
/// } }
/// ```
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginManifest {
    #[serde(default)]
    pub plugins: PluginGroups,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginGroups {
    #[serde(default)]
    pub auto: Vec<AutoPlugin>,
    #[serde(default)]
    pub manual: Vec<ManualPlugin>,
}

/// Externally distributed module, identified by package name.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AutoPlugin {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

/// Locally implemented module, identified by path.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ManualPlugin {
    pub path: PathBuf,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginSource {
    Auto(String),
    Manual(PathBuf),
}

impl fmt::Display for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PluginSource::Auto(name) => f.write_str(name),
            PluginSource::Manual(path) => write!(f, "{}", path.display()),
        }
    }
}

/// One manifest line, whichever group it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginEntry {
    pub source: PluginSource,
    pub namespace: String,
    pub method: Option<String>,
}

impl PluginEntry {
    /// Catalog lookup key: package name or path as written.
    pub fn identifier(&self) -> String {
        self.source.to_string()
    }

    /// Explicit `method`, else [`default_entry_point`].
    pub fn entry_point(&self) -> String {
        self.method
            .clone()
            .unwrap_or_else(|| default_entry_point(&self.namespace))
    }
}

/// Entry point a module is expected to expose when the manifest doesn't name one.
pub fn default_entry_point(namespace: &str) -> String {
    format!("register_{namespace}")
}

impl PluginManifest {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        Ok(toml::from_str(s)?)
    }

    /// Read a manifest file; `.toml` is parsed as TOML, anything else as JSON.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&raw),
            _ => Self::from_json_str(&raw),
        }
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(BridgeError::from)
    }

    /// All entries, `auto` first, each group in file order.
    pub fn entries(&self) -> Vec<PluginEntry> {
        let auto = self.plugins.auto.iter().map(|p| PluginEntry {
            source: PluginSource::Auto(p.name.clone()),
            namespace: p.namespace.clone(),
            method: p.method.clone(),
        });
        let manual = self.plugins.manual.iter().map(|p| PluginEntry {
            source: PluginSource::Manual(p.path.clone()),
            namespace: p.namespace.clone(),
            method: p.method.clone(),
        });
        auto.chain(manual).collect()
    }
}
