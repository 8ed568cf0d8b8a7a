//! Default value functions for configuration (serde `#[serde(default = "...")]`).

pub fn default_true() -> bool {
    true
}

pub fn default_heartbeat_interval_secs() -> u64 {
    25
}

pub fn default_zombie_sweep_interval_secs() -> u64 {
    30
}

pub fn default_dedup_ttl_secs() -> u64 {
    300
}

pub fn default_typing_ttl_secs() -> u64 {
    5
}

pub fn default_sync_lock_ttl_secs() -> u64 {
    30
}

pub fn default_webhook_timeout_secs() -> u64 {
    5
}

pub fn default_sync_page_limit() -> u32 {
    100
}

pub fn default_outbox_grace_secs() -> i64 {
    10
}

pub fn default_outbox_worker_count() -> usize {
    4
}

pub fn default_outbox_poll_interval_ms() -> u64 {
    250
}

pub fn default_database_path() -> String {
    "imcore.db".to_string()
}

pub fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

pub fn default_metrics_port() -> u16 {
    9090
}

pub fn default_bus_kind() -> String {
    "local".to_string()
}
