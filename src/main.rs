//! imcored - real-time instant-messaging delivery pipeline.
//!
//! Gateway (WebSocket) + HTTP sync/create API, backed by SQLite for
//! durable storage and Redis for dedup/typing/distributed locks. A bus
//! abstraction (local broadcast or Redis pub/sub) fans messages out to
//! every node's connected sockets.

mod auth;
mod bus;
mod config;
mod db;
mod error;
mod gateway;
mod http;
mod kv;
mod metrics;
mod model;
mod presence;
mod router;
mod state;
mod sync;
mod worker;
mod workspace;

use crate::bus::{Bus, LocalBus, RedisBus};
use crate::config::Config;
use crate::db::Database;
use crate::gateway::Gateway;
use crate::kv::Kv;
use crate::state::Hub;
use std::sync::Arc;
use tracing::{error, info};

/// Resolve the configuration path from CLI arguments: `-c <path>`,
/// `--config <path>`, or a bare path. Falls back to `config.toml`.
fn resolve_config_path() -> String {
    let mut args = std::env::args().skip(1);

    match args.next() {
        Some(flag) if flag == "-c" || flag == "--config" => args.next().unwrap_or_else(|| {
            eprintln!("Missing path after {flag}");
            std::process::exit(1);
        }),
        Some(path) => path,
        None => "config.toml".to_string(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = resolve_config_path();

    let config = Config::load(&config_path).map_err(|e| {
        eprintln!("ERROR: failed to load config from {config_path}: {e}");
        e
    })?;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match config.server.log_format {
        crate::config::LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .json()
                .init();
        }
        crate::config::LogFormat::Pretty => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .init();
        }
    }

    if let Err(errors) = crate::config::validate(&config) {
        for err in &errors {
            error!(error = %err, "configuration validation failed");
        }
        return Err(anyhow::anyhow!(
            "configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    info!(server = %config.server.name, node_id = %config.server.node_id, "starting imcored");

    let db = Database::new(&config.database.path).await?;
    let kv = Kv::new(&config.redis.url, config.redis.ttls())?;

    let bus: Arc<dyn Bus> = match config.bus.kind.as_str() {
        "redis" => Arc::new(RedisBus::new(&config.redis.url)?),
        _ => Arc::new(LocalBus::new()),
    };

    let config = Arc::new(config);
    let hub = Hub::new(config.clone(), db, kv, bus);

    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");

        tokio::select! {
            _ = sigint.recv() => info!("received SIGINT, shutting down"),
            _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        }

        std::process::exit(0);
    });

    tokio::spawn(presence::run_zombie_sweeper(hub.clone()));
    tokio::spawn(worker::run_worker_pool(hub.clone()));
    tokio::spawn(worker::run_stuck_scanner(hub.clone()));

    if config.server.metrics_port == 0 {
        info!("http server disabled (metrics_port = 0)");
    } else {
        metrics::init();
        let http_hub = hub.clone();
        let http_addr = format!("0.0.0.0:{}", config.server.metrics_port);
        tokio::spawn(async move {
            http::run(&http_addr, http_hub).await;
        });
    }

    let gateway = Gateway::bind(&config.server.bind_addr, hub).await?;
    gateway.run().await?;

    Ok(())
}
