//! Settings access for the sync core.
//!
//! The host application owns persistent settings; this crate only reads the
//! handful of keys it needs through [`SettingsReader`] and resolves them into
//! a typed [`SyncSettings`] snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{Result, SpoolSyncError};

pub const KEY_SPOOLMAN_ENABLED: &str = "spoolman_enabled";
pub const KEY_SPOOLMAN_URL: &str = "spoolman_url";
pub const KEY_DISABLE_WEIGHT_SYNC: &str = "disable_weight_sync";
pub const KEY_REPORT_PARTIAL_USAGE: &str = "report_partial_usage";

/// Key-value settings source supplied by the host application.
#[async_trait]
pub trait SettingsReader: Send + Sync {
    async fn get_setting(&self, key: &str) -> Option<String>;
}

/// Typed view of the settings this crate consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncSettings {
    pub spoolman_enabled: bool,
    pub spoolman_url: Option<String>,
    pub disable_weight_sync: bool,
    pub report_partial_usage: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            spoolman_enabled: false,
            spoolman_url: None,
            disable_weight_sync: false,
            report_partial_usage: true,
        }
    }
}

impl SyncSettings {
    /// Read every key once from the given source, applying defaults for
    /// missing or unparseable values.
    pub async fn load(reader: &dyn SettingsReader) -> Self {
        let defaults = Self::default();

        let spoolman_enabled = reader
            .get_setting(KEY_SPOOLMAN_ENABLED)
            .await
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.spoolman_enabled);
        let spoolman_url = reader
            .get_setting(KEY_SPOOLMAN_URL)
            .await
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty());
        let disable_weight_sync = reader
            .get_setting(KEY_DISABLE_WEIGHT_SYNC)
            .await
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.disable_weight_sync);
        let report_partial_usage = reader
            .get_setting(KEY_REPORT_PARTIAL_USAGE)
            .await
            .and_then(|v| parse_bool(&v))
            .unwrap_or(defaults.report_partial_usage);

        let settings = Self {
            spoolman_enabled,
            spoolman_url,
            disable_weight_sync,
            report_partial_usage,
        };
        debug!("Loaded sync settings: {:?}", settings);
        settings
    }

    /// Spoolman URL when the integration is both enabled and pointed somewhere.
    pub fn active_url(&self) -> Option<&str> {
        if self.spoolman_enabled {
            self.spoolman_url.as_deref()
        } else {
            None
        }
    }

    /// Usage tracking only runs when Spoolman is on and AMS weight sync is
    /// off; otherwise the AMS remaining-weight reports already cover it.
    pub fn tracking_enabled(&self) -> bool {
        self.spoolman_enabled && self.disable_weight_sync
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

/// In-memory settings, mostly for embedding and tests.
#[derive(Default)]
pub struct MemorySettings {
    values: RwLock<HashMap<String, String>>,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, key: &str, value: &str) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&self, key: &str, value: &str) {
        if let Ok(mut values) = self.values.write() {
            values.insert(key.to_string(), value.to_string());
        }
    }
}

#[async_trait]
impl SettingsReader for MemorySettings {
    async fn get_setting(&self, key: &str) -> Option<String> {
        self.values.read().ok()?.get(key).cloned()
    }
}

/// Settings loaded from a flat TOML table, e.g.
///
/// ```toml
/// spoolman_enabled = true
/// spoolman_url = "http://spoolman.local:7912"
/// disable_weight_sync = true
/// ```
pub struct TomlSettings {
    values: HashMap<String, String>,
}

impl TomlSettings {
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let table: toml::Table = content
            .parse()
            .map_err(|e: toml::de::Error| SpoolSyncError::Config(e.to_string()))?;

        let values = table
            .into_iter()
            .filter_map(|(key, value)| {
                let rendered = match value {
                    toml::Value::String(s) => s,
                    toml::Value::Boolean(b) => b.to_string(),
                    toml::Value::Integer(i) => i.to_string(),
                    toml::Value::Float(f) => f.to_string(),
                    _ => return None,
                };
                Some((key, rendered))
            })
            .collect();

        Ok(Self { values })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SpoolSyncError::Config(format!("Failed to read settings file {:?}: {}", path, e))
        })?;
        let settings = Self::from_toml_str(&content)?;
        info!("Loaded {} settings from {:?}", settings.values.len(), path);
        Ok(settings)
    }
}

#[async_trait]
impl SettingsReader for TomlSettings {
    async fn get_setting(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

/// Default location of the tracking database.
pub fn default_tracking_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("bambumate")
        .join("print_tracking.db")
}
