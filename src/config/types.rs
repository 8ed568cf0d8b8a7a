//! Configuration type definitions.

use serde::Deserialize;

use super::defaults::*;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub bus: BusConfig,
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub webhook: WebhookConfig,
    #[serde(default)]
    pub outbox: OutboxConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub name: String,
    /// Identity of this node in the cluster; embedded in session records so
    /// a dead node's sessions can be attributed during a zombie sweep.
    pub node_id: String,
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// 0 disables the metrics endpoint (used by tests).
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    #[serde(default)]
    pub log_format: LogFormat,
    /// HMAC secret used to verify bearer session tokens locally.
    pub auth_secret: String,
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,
    #[serde(default = "default_typing_ttl_secs")]
    pub typing_ttl_secs: u64,
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            typing_ttl_secs: default_typing_ttl_secs(),
        }
    }
}

impl RedisConfig {
    pub fn ttls(&self) -> KvTtls {
        KvTtls {
            dedup_secs: self.dedup_ttl_secs,
            typing_secs: self.typing_ttl_secs,
        }
    }
}

/// Selects the room/pub-sub fan-out backend.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_bus_kind")]
    pub kind: String,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            kind: default_bus_kind(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    #[serde(default = "default_heartbeat_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_zombie_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_heartbeat_interval_secs(),
            sweep_interval_secs: default_zombie_sweep_interval_secs(),
        }
    }
}

impl HeartbeatConfig {
    /// Session TTL is 2x the ping interval.
    pub fn session_ttl(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.interval_secs * 2)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_sync_page_limit")]
    pub default_page_limit: u32,
    #[serde(default = "default_sync_lock_ttl_secs")]
    pub offline_pull_lock_ttl_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            default_page_limit: default_sync_page_limit(),
            offline_pull_lock_ttl_secs: default_sync_lock_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_webhook_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutboxConfig {
    #[serde(default = "default_outbox_worker_count")]
    pub worker_count: usize,
    #[serde(default = "default_outbox_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_outbox_grace_secs")]
    pub retry_grace_secs: i64,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            worker_count: default_outbox_worker_count(),
            poll_interval_ms: default_outbox_poll_interval_ms(),
            retry_grace_secs: default_outbox_grace_secs(),
        }
    }
}

/// Dedup cache / typing-indicator TTLs, both backed by the same Redis KV.
#[derive(Debug, Clone, Copy)]
pub struct KvTtls {
    pub dedup_secs: u64,
    pub typing_secs: u64,
}

impl Default for KvTtls {
    fn default() -> Self {
        Self {
            dedup_secs: default_dedup_ttl_secs(),
            typing_secs: default_typing_ttl_secs(),
        }
    }
}
