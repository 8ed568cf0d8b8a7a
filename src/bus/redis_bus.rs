use super::{Bus, BusSubscription, Topic};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::AsyncCommands;

const CHANNEL_CAPACITY: usize = 1024;

/// Multi-node fan-out over Redis pub/sub. Every gateway node keeps one
/// dedicated connection per active subscription; publishing borrows a
/// connection from the shared pool.
pub struct RedisBus {
    client: redis::Client,
    publish_pool: deadpool_redis::Pool,
}

impl RedisBus {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let pool_cfg = deadpool_redis::Config::from_url(redis_url);
        let publish_pool = pool_cfg.create_pool(Some(deadpool_redis::Runtime::Tokio1))?;
        Ok(Self { client, publish_pool })
    }
}

#[async_trait]
impl Bus for RedisBus {
    async fn publish_raw(&self, topic: &Topic, payload: String) -> anyhow::Result<()> {
        let mut conn = self.publish_pool.get().await?;
        let _: i64 = conn.publish(topic.key(), payload).await?;
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> anyhow::Result<BusSubscription> {
        let pubsub_conn = self.client.get_async_pubsub().await?;
        let key = topic.key();
        let (tx, rx) = tokio::sync::mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            let mut pubsub = pubsub_conn;
            if let Err(e) = pubsub.subscribe(&key).await {
                tracing::error!(error = %e, topic = %key, "failed to subscribe to redis topic");
                return;
            }

            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        tracing::warn!(error = %e, "dropping non-utf8 redis bus frame");
                        continue;
                    }
                };
                if tx.send(payload).await.is_err() {
                    break;
                }
            }
        });

        Ok(BusSubscription { rx })
    }
}
