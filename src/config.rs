//! Configuration for the aggregator and the probe agent.
//!
//! Both binaries read a YAML file whose path comes from an environment
//! variable (`VIGIL_SERVER_CONFIG` / `VIGIL_PROBE_CONFIG`) with a sensible
//! default next to the working directory. Missing or invalid configuration
//! is fatal at startup.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::db::CheckSpec;

/// Configuration error types.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Aggregator configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Shared secret probes must present in the `X-Wacht-Secret` header.
    pub secret: String,
    /// Checks seeded into the store at startup. Existing rows win.
    #[serde(default)]
    pub checks: Vec<CheckSpec>,
    /// Listen address for the HTTP server.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub db_path: String,
    /// Result rows older than this many days are evicted.
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_db_path() -> String {
    "vigil.db".to_string()
}

fn default_retention_days() -> u32 {
    30
}

impl ServerConfig {
    /// Load and validate an aggregator config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Self = serde_yaml::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::Invalid("secret is required".to_string()));
        }
        for check in &self.checks {
            check
                .validate()
                .map_err(|e| ConfigError::Invalid(format!("check {:?}: {}", check.id, e)))?;
        }
        Ok(())
    }
}

/// Probe agent configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Shared secret sent in the `X-Wacht-Secret` header.
    pub secret: String,
    /// Aggregator base URL, e.g. "http://aggregator:8080".
    pub server: String,
    /// Stable identifier this probe registers under.
    pub probe_id: String,
    #[serde(default = "default_heartbeat_seconds")]
    pub heartbeat_interval_seconds: u64,
    /// How often the cached check list is re-fetched from the aggregator.
    #[serde(default = "default_refresh_seconds")]
    pub refresh_interval_seconds: u64,
}

fn default_heartbeat_seconds() -> u64 {
    30
}

fn default_refresh_seconds() -> u64 {
    300
}

impl ProbeConfig {
    /// Load and validate a probe config file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Self = serde_yaml::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.secret.is_empty() {
            return Err(ConfigError::Invalid("secret is required".to_string()));
        }
        if self.server.is_empty() {
            return Err(ConfigError::Invalid("server is required".to_string()));
        }
        if self.probe_id.is_empty() {
            return Err(ConfigError::Invalid("probe_id is required".to_string()));
        }
        if self.heartbeat_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "heartbeat_interval_seconds must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_seconds)
    }
}
