//! Bridge configuration.
//!
//! Configuration is loaded in the following order (later overrides earlier):
//! 1. Default values
//! 2. YAML config file (if specified via HOOKLINE_CONFIG or --config)
//! 3. Environment variables

use crate::connection::{ConnectionConfig, DEFAULT_COMPONENT_NAME};
use hookline_protocol::{DEFAULT_CHANNEL_SIZE, DEFAULT_POLL_INTERVAL_MS};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "HOOKLINE_CONFIG";

/// Bridge configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker connection.
    pub server: ServerConfig,
    /// Identity announced in the handshake.
    pub component: ComponentConfig,
    /// Heartbeat polling.
    pub polling: PollingConfig,
    /// Host tick loop.
    pub host: HostConfig,
}

impl Config {
    /// Loads configuration from `path` (or the file named by
    /// `HOOKLINE_CONFIG`), then applies environment variable overrides.
    ///
    /// Without a file the defaults are used. A named file that cannot be read
    /// or parsed is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                let config = Self::from_file(&path)?;
                tracing::info!("Loaded config from {}", path.display());
                config
            }
            None => Self::default(),
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads configuration from a YAML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Config = serde_yaml::from_str(&content)
            .map_err(|e| ConfigError::Parse(path.to_path_buf(), e.to_string()))?;
        Ok(config)
    }

    /// Applies `HOOKLINE_*` environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Applies overrides looked up by variable name. Unparseable values are
    /// ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("HOOKLINE_URL") {
            self.server.url = url;
        }

        if let Some(name) = lookup("HOOKLINE_NAME") {
            self.component.name = name;
        }

        if let Some(size) = lookup("HOOKLINE_CHANNEL_SIZE") {
            if let Ok(n) = size.parse() {
                self.component.channel_size = n;
            }
        }

        if let Some(interval) = lookup("HOOKLINE_POLL_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.polling.interval_ms = ms;
            }
        }

        if let Some(interval) = lookup("HOOKLINE_TICK_INTERVAL_MS") {
            if let Ok(ms) = interval.parse() {
                self.host.tick_interval_ms = ms;
            }
        }
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = self.server.url.trim();
        if url.is_empty() {
            return Err(ConfigError::Validation("server.url is empty".to_string()));
        }
        if !(url.starts_with("ws://") || url.starts_with("wss://")) {
            return Err(ConfigError::Validation(format!(
                "server.url must use ws:// or wss://, got '{}'",
                url
            )));
        }
        if self.component.name.trim().is_empty() {
            return Err(ConfigError::Validation("component.name is empty".to_string()));
        }
        if self.component.channel_size == 0 {
            return Err(ConfigError::Validation(
                "component.channel_size must be positive".to_string(),
            ));
        }
        if self.polling.interval_ms == 0 {
            return Err(ConfigError::Validation(
                "polling.interval_ms must be positive".to_string(),
            ));
        }
        if self.host.tick_interval_ms == 0 {
            return Err(ConfigError::Validation(
                "host.tick_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Builds the connection settings used by the bridge.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig::new(self.server.url.clone())
            .with_component_name(self.component.name.clone())
            .with_channel_size(self.component.channel_size)
            .with_poll_interval(self.polling.interval())
    }

    /// Serializes the configuration as YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        serde_yaml::to_string(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }
}

/// Broker connection configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// WebSocket URL of the broker.
    pub url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:25555/pushws".to_string(),
        }
    }
}

/// Component identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentConfig {
    /// Name announced in the handshake.
    pub name: String,
    /// Channel capacity requested from the broker.
    pub channel_size: u32,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            name: DEFAULT_COMPONENT_NAME.to_string(),
            channel_size: DEFAULT_CHANNEL_SIZE,
        }
    }
}

/// Heartbeat polling configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Minimum interval between heartbeats in milliseconds.
    pub interval_ms: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl PollingConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Host tick loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Interval between ticks in milliseconds.
    pub tick_interval_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
        }
    }
}

impl HostConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}

/// Configuration error.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {0:?}: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to parse config file {0:?}: {1}")]
    Parse(PathBuf, String),

    #[error("failed to serialize config: {0}")]
    Serialize(String),

    #[error("configuration validation failed: {0}")]
    Validation(String),
}
