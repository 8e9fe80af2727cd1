//! Configuration file support for bufmond
//!
//! Loads and validates bufmond configuration from TOML files.
//! Default location: /etc/sonic/bufmond.conf

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{BufmondError, Result};
use crate::unixctl::DEFAULT_CONTROL_SOCKET;

/// Default configuration file
pub const DEFAULT_CONFIG_PATH: &str = "/etc/sonic/bufmond.conf";

/// Shared store connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Store endpoint URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Change detection period of the Redis backend in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

/// Reconciliation loop tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileConfig {
    /// Delay between system readiness checks in milliseconds
    #[serde(default = "default_readiness_retry")]
    pub readiness_retry_ms: u64,
}

/// Control socket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlConfig {
    #[serde(default = "default_socket_path")]
    pub socket_path: String,
}

/// Complete bufmond configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufmondConfig {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub reconcile: ReconcileConfig,

    #[serde(default)]
    pub control: ControlConfig,
}

fn default_endpoint() -> String {
    "redis+unix:///var/run/redis/redis.sock?db=4".to_string()
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_readiness_retry() -> u64 {
    1000
}

fn default_socket_path() -> String {
    DEFAULT_CONTROL_SOCKET.to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            poll_interval_ms: default_poll_interval(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            readiness_retry_ms: default_readiness_retry(),
        }
    }
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(),
        }
    }
}

impl BufmondConfig {
    /// Load configuration from file, falling back to defaults if file not found
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                BufmondError::Configuration(format!(
                    "Failed to parse config file {}: {}",
                    path.display(),
                    e
                ))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Config file {} not found, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(BufmondError::Io(e)),
        }
    }

    /// Load from default location or defaults
    pub fn load() -> Result<Self> {
        Self::load_or_default(DEFAULT_CONFIG_PATH)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.database.poll_interval_ms)
    }

    pub fn readiness_retry(&self) -> Duration {
        Duration::from_millis(self.reconcile.readiness_retry_ms)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.database.endpoint.trim().is_empty() {
            return Err(BufmondError::Configuration(
                "database endpoint must not be empty".to_string(),
            ));
        }

        if self.database.poll_interval_ms == 0 {
            return Err(BufmondError::Configuration(
                "poll_interval_ms must be > 0".to_string(),
            ));
        }

        if self.control.socket_path.trim().is_empty() {
            return Err(BufmondError::Configuration(
                "control socket_path must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}
