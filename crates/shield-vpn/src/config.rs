//! Service Configuration
//!
//! Timings for the simulated session plus an optional replacement server
//! list. Loaded from TOML or JSON text; nothing is ever written back.
//!
//! ```toml
//! connect_delay_ms = 2000
//! stats_interval_ms = 1000
//!
//! [[servers]]
//! id = "nl-1"
//! country = "Нидерланды"
//! city = "Амстердам"
//! flag = "🇳🇱"
//! ping = 24
//! load = 35
//! ```

use crate::server::{CatalogError, Server, ServerCatalog};
use crate::settings::Settings;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Complete service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Duration of the simulated connect step (ms)
    pub connect_delay_ms: u64,
    /// Statistics tick period (ms)
    pub stats_interval_ms: u64,
    /// Initial settings
    pub settings: Settings,
    /// Server list; the built-in list is used when empty
    pub servers: Vec<Server>,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            connect_delay_ms: 2000,
            stats_interval_ms: 1000,
            settings: Settings::default(),
            servers: Vec::new(),
        }
    }
}

impl ServiceConfig {
    /// Load from TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from JSON string
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file, picking the format by extension
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;

        match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
            "toml" => Self::from_toml(&content),
            "json" => Self::from_json(&content),
            other => Err(ConfigError::UnsupportedFormat(other.to_string())),
        }
    }

    /// Export as TOML
    pub fn to_toml(&self) -> String {
        toml::to_string_pretty(self).unwrap_or_default()
    }

    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_millis(self.stats_interval_ms)
    }

    /// Build the initial catalog
    pub fn catalog(&self) -> Result<ServerCatalog, ConfigError> {
        if self.servers.is_empty() {
            Ok(ServerCatalog::builtin())
        } else {
            Ok(ServerCatalog::new(self.servers.clone())?)
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stats_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        self.catalog()?;
        Ok(())
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Statistics interval must be greater than zero")]
    ZeroInterval,

    #[error("Invalid server list: {0}")]
    Catalog(#[from] CatalogError),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported config format: {0:?}")]
    UnsupportedFormat(String),
}
