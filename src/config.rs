//! Layered configuration loading: defaults, optional config file,
//! `SOPSFS_`-prefixed environment.

use crate::document::DEFAULT_FLUSH_INTERVAL;
use crate::logging::LoggingConfig;
use crate::registry::DEFAULT_CAPACITY;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// External tool settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Executable name or path of the encryption tool.
    #[serde(default = "default_binary")]
    pub binary: String,

    /// Environment forwarded to every tool invocation, merged over the
    /// process environment (key-file locations and the like).
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_binary() -> String {
    "sops".to_string()
}

impl Default for ToolConfig {
    fn default() -> Self {
        ToolConfig {
            binary: default_binary(),
            env: HashMap::new(),
        }
    }
}

/// Engine multiplexing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Maximum number of concurrently open documents.
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            capacity: default_capacity(),
        }
    }
}

/// Change-notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Coalescing window between change batches, in milliseconds.
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
}

fn default_flush_interval_ms() -> u64 {
    DEFAULT_FLUSH_INTERVAL.as_millis() as u64
}

impl Default for EventsConfig {
    fn default() -> Self {
        EventsConfig {
            flush_interval_ms: default_flush_interval_ms(),
        }
    }
}

impl EventsConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SopsfsConfig {
    #[serde(default)]
    pub tool: ToolConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub events: EventsConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Default config file location (~/.config/sopsfs/config.toml).
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "sopsfs", "sopsfs")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Load configuration: defaults, then the config file (explicit path
    /// required to exist; the default path is optional), then
    /// `SOPSFS_`-prefixed environment variables (`SOPSFS_TOOL__BINARY`).
    pub fn load(explicit: Option<&Path>) -> Result<SopsfsConfig, crate::error::FsError> {
        let mut builder = Config::builder();
        match explicit {
            Some(path) => {
                builder = builder.add_source(File::from(path.to_path_buf()));
            }
            None => {
                if let Some(path) = Self::default_config_path() {
                    builder = builder.add_source(File::from(path).required(false));
                }
            }
        }
        builder = builder.add_source(Environment::with_prefix("SOPSFS").separator("__"));
        builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| crate::error::FsError::Config(e.to_string()))
    }
}
