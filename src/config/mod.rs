//! Configuration loading and management.
//!
//! Split into [`types`] (the struct definitions), [`defaults`] (serde
//! default-value functions), and [`validation`] (startup sanity checks).

mod defaults;
mod types;
mod validation;

pub use types::{
    BusConfig, Config, DatabaseConfig, HeartbeatConfig, KvTtls, LogFormat, OutboxConfig,
    RedisConfig, ServerConfig, SyncConfig, WebhookConfig,
};
pub use validation::{ValidationError, validate};

use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Config {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
