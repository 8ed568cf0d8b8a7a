//! Fan-out between gateway nodes: one producer publishes an event once, every
//! subscribed node receives it and relays to its own locally-connected
//! sockets. [`LocalBus`] is an in-process broadcast used by tests and
//! single-node deployments; [`RedisBus`] is the multi-node backend.

mod local;
mod redis_bus;

pub use local::LocalBus;
pub use redis_bus::RedisBus;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};

/// A room a node can publish into or subscribe from: a channel's message
/// feed (`room:<channelId>`) or a user's private notification feed
/// (`notify:<userId>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Topic {
    Room(String),
    Notify(String),
    Workspace(String),
}

impl Topic {
    pub fn key(&self) -> String {
        match self {
            Topic::Room(id) => format!("room:{id}"),
            Topic::Notify(id) => format!("notify:{id}"),
            Topic::Workspace(id) => format!("workspace:{id}"),
        }
    }
}

/// Object-safe so a [`crate::state::Hub`] can hold either backend behind
/// one `Arc<dyn Bus>`. Payloads cross the trait boundary pre-serialized;
/// typed helpers live on [`BusSubscription`] and at call sites.
#[async_trait]
pub trait Bus: Send + Sync {
    async fn publish_raw(&self, topic: &Topic, payload: String) -> anyhow::Result<()>;

    async fn subscribe(&self, topic: &Topic) -> anyhow::Result<BusSubscription>;
}

#[async_trait]
pub trait BusExt: Bus {
    async fn publish<T: Serialize + Send + Sync>(&self, topic: &Topic, payload: &T) -> anyhow::Result<()> {
        let raw = serde_json::to_string(payload)?;
        self.publish_raw(topic, raw).await
    }
}

impl<T: Bus + ?Sized> BusExt for T {}

pub struct BusSubscription {
    pub rx: tokio::sync::mpsc::Receiver<String>,
}

impl BusSubscription {
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Option<T> {
        loop {
            let raw = self.rx.recv().await?;
            match serde_json::from_str(&raw) {
                Ok(value) => return Some(value),
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed bus frame");
                    continue;
                }
            }
        }
    }
}
