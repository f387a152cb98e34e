//! Bridge configuration.
//!
//! Defaults are embedded from `bridge.toml` at compile time. User overrides
//! (a TOML string, a file, or a file named by `WEBVIEW_BRIDGE_CONFIG`) are
//! merged key-by-key over those defaults, so a partial file is fine.

use std::{path::Path, time::Duration};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::error::{BridgeError, Result};

/// Env var holding the path of a TOML override file.
pub const CONFIG_ENV: &str = "WEBVIEW_BRIDGE_CONFIG";

static DEFAULT_CONFIG_TOML: &str = include_str!("bridge.toml");

static DEFAULT_TABLE: Lazy<toml::Table> = Lazy::new(|| {
    DEFAULT_CONFIG_TOML
        .parse::<toml::Table>()
        .expect("embedded bridge.toml must parse")
});

static DEFAULT_CONFIG: Lazy<BridgeConfig> = Lazy::new(|| {
    toml::Value::Table(DEFAULT_TABLE.clone())
        .try_into()
        .expect("embedded bridge.toml must match BridgeConfig")
});

/// How long the security gate remembers nonces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplayMode {
    /// Evict nonces older than twice the freshness window.
    Windowed,
    /// Keep every nonce until the gate is reset.
    Lifetime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayConfig {
    pub mode: ReplayMode,
    /// Hard cap on remembered nonces; a full cache rejects new frames.
    pub max_entries: usize,
}

/// Runtime settings shared by the gate, the dispatcher and the client script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub inbound_scheme: String,
    pub outbound_scheme: String,
    pub freshness_window_ms: i64,
    pub lockdown_threshold: u32,
    pub default_call_timeout_ms: u64,
    pub client_event: String,
    pub post_function: String,
    pub replay: ReplayConfig,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        DEFAULT_CONFIG.clone()
    }
}

impl BridgeConfig {
    /// Parse a TOML override and merge it over the built-in defaults.
    ///
    /// ```
    /// use webview_bridge::config::BridgeConfig;
    ///
    /// let cfg = BridgeConfig::from_toml_str("freshness_window_ms = 5000").unwrap();
    /// assert_eq!(cfg.freshness_window_ms, 5000);
    /// assert_eq!(cfg.inbound_scheme, "app://");
    /// ```
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let overrides = s.parse::<toml::Table>()?;
        let mut merged = DEFAULT_TABLE.clone();
        merge_tables(&mut merged, overrides);
        let config: BridgeConfig = toml::Value::Table(merged).try_into()?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Load from the file named by [`CONFIG_ENV`], or fall back to defaults.
    pub fn from_env() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, scheme) in [
            ("inbound_scheme", &self.inbound_scheme),
            ("outbound_scheme", &self.outbound_scheme),
        ] {
            if scheme.len() <= 3 || !scheme.ends_with("://") {
                return Err(BridgeError::Config(format!(
                    "{name} must look like `name://` (got `{scheme}`)"
                )));
            }
        }
        if self.inbound_scheme == self.outbound_scheme {
            return Err(BridgeError::Config(
                "inbound and outbound schemes must differ".to_string(),
            ));
        }
        if self.freshness_window_ms <= 0 {
            return Err(BridgeError::Config(
                "freshness_window_ms must be positive".to_string(),
            ));
        }
        if self.replay.max_entries == 0 {
            return Err(BridgeError::Config(
                "replay.max_entries must be positive".to_string(),
            ));
        }
        if self.client_event.is_empty() || self.post_function.is_empty() {
            return Err(BridgeError::Config(
                "client_event and post_function must be set".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_call_timeout(&self) -> Duration {
        Duration::from_millis(self.default_call_timeout_ms)
    }
}

fn merge_tables(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        if let toml::Value::Table(from) = value {
            if let Some(toml::Value::Table(into)) = base.get_mut(&key) {
                merge_tables(into, from);
                continue;
            }
            base.insert(key, toml::Value::Table(from));
        } else {
            base.insert(key, value);
        }
    }
}
