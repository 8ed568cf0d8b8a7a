//! Configuration validation.

use super::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("server.name is required")]
    MissingServerName,
    #[error("server.node_id is required")]
    MissingNodeId,
    #[error("server.auth_secret must be at least 16 bytes")]
    WeakAuthSecret,
    #[error("database.path must not be empty")]
    EmptyDatabasePath,
    #[error("outbox.worker_count must be at least 1")]
    ZeroOutboxWorkers,
}

/// Validate a configuration, returning all errors found rather than
/// stopping at the first.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server.name.is_empty() {
        errors.push(ValidationError::MissingServerName);
    }
    if config.server.node_id.is_empty() {
        errors.push(ValidationError::MissingNodeId);
    }
    if config.server.auth_secret.len() < 16 {
        errors.push(ValidationError::WeakAuthSecret);
    }
    if config.database.path.is_empty() {
        errors.push(ValidationError::EmptyDatabasePath);
    }
    if config.outbox.worker_count == 0 {
        errors.push(ValidationError::ZeroOutboxWorkers);
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BusConfig, DatabaseConfig, HeartbeatConfig, LogFormat, OutboxConfig, RedisConfig,
        ServerConfig, SyncConfig, WebhookConfig,
    };

    fn base_config() -> Config {
        Config {
            server: ServerConfig {
                name: "test".into(),
                node_id: "node-1".into(),
                bind_addr: "127.0.0.1:0".into(),
                metrics_port: 0,
                log_format: LogFormat::Pretty,
                auth_secret: "0123456789abcdef".into(),
            },
            database: DatabaseConfig { path: ":memory:".into() },
            redis: RedisConfig::default(),
            bus: BusConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            sync: SyncConfig::default(),
            webhook: WebhookConfig::default(),
            outbox: OutboxConfig::default(),
        }
    }

    #[test]
    fn accepts_a_well_formed_config() {
        assert!(validate(&base_config()).is_ok());
    }

    #[test]
    fn rejects_weak_auth_secret() {
        let mut config = base_config();
        config.server.auth_secret = "short".into();
        let errors = validate(&config).unwrap_err();
        assert!(matches!(errors[0], ValidationError::WeakAuthSecret));
    }

    #[test]
    fn collects_multiple_errors() {
        let mut config = base_config();
        config.server.name = String::new();
        config.server.node_id = String::new();
        let errors = validate(&config).unwrap_err();
        assert_eq!(errors.len(), 2);
    }
}
