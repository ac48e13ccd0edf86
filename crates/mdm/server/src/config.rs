use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "MDM_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "mdm.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub events: EventsConfig,
    pub dep: DepConfig,
    pub apns: Option<ApnsConfig>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Embedded,
    Document,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    /// redb file for the embedded backend.
    pub path: PathBuf,
    /// SQLite database for the document backend.
    pub url: String,
    pub write_timeout_ms: u64,
    pub pool_size: u32,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Embedded,
            path: PathBuf::from("mdm.redb"),
            url: "mdm.sqlite".to_string(),
            write_timeout_ms: 5000,
            pool_size: mdm_storage::DEFAULT_POOL_SIZE,
        }
    }
}

impl StorageConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    /// Buffered events per topic before slow subscribers lag.
    pub capacity: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DepConfig {
    pub sync_interval_secs: u64,
}

impl Default for DepConfig {
    fn default() -> Self {
        Self {
            sync_interval_secs: mdm_dep::DEFAULT_SYNC_INTERVAL.as_secs(),
        }
    }
}

impl DepConfig {
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApnsConfig {
    /// PKCS#12 push certificate.
    pub cert_path: PathBuf,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub sandbox: bool,
}

impl Config {
    /// Load from `$MDM_CONFIG` or `./mdm.toml`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    pub fn config_path() -> PathBuf {
        std::env::var_os(CONFIG_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Parse `path`, falling back to defaults when it does not exist.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("storage.write_timeout_ms", self.storage.write_timeout_ms == 0),
            ("storage.pool_size", self.storage.pool_size == 0),
            ("events.capacity", self.events.capacity == 0),
            ("dep.sync_interval_secs", self.dep.sync_interval_secs == 0),
        ];
        match checks.into_iter().find(|(_, zero)| *zero) {
            Some((field, _)) => Err(ConfigError::Invalid {
                field,
                reason: "must be greater than zero".to_string(),
            }),
            None => Ok(()),
        }
    }
}
