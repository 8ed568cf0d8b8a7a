use super::{Bus, BusSubscription, Topic};
use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

/// In-process pub/sub over `tokio::sync::broadcast`, one channel per topic
/// created lazily on first use. Good enough for a single node or a test
/// harness; a multi-node deployment needs [`super::RedisBus`] instead.
pub struct LocalBus {
    topics: DashMap<String, broadcast::Sender<String>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self {
            topics: DashMap::new(),
        }
    }

    fn sender_for(&self, key: &str) -> broadcast::Sender<String> {
        self.topics
            .entry(key.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Bus for LocalBus {
    async fn publish_raw(&self, topic: &Topic, payload: String) -> anyhow::Result<()> {
        // No subscribers yet is not an error; the message is simply not
        // replayed to anyone.
        let _ = self.sender_for(&topic.key()).send(payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic) -> anyhow::Result<BusSubscription> {
        let mut broadcast_rx = self.sender_for(&topic.key()).subscribe();
        let (tx, rx) = tokio::sync::mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            loop {
                match broadcast_rx.recv().await {
                    Ok(msg) => {
                        if tx.send(msg).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "local bus subscriber lagged, dropping frames");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(BusSubscription { rx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn published_frame_reaches_subscriber() {
        let bus = LocalBus::new();
        let topic = Topic::Room("c1".to_string());
        let mut sub = bus.subscribe(&topic).await.unwrap();

        bus.publish_raw(&topic, "\"hello\"".to_string()).await.unwrap();

        let received: String = sub.recv().await.unwrap();
        assert_eq!(received, "hello");
    }

    #[tokio::test]
    async fn distinct_topics_do_not_cross_talk() {
        let bus = LocalBus::new();
        let room_a = Topic::Room("a".to_string());
        let room_b = Topic::Room("b".to_string());

        let mut sub_b = bus.subscribe(&room_b).await.unwrap();
        bus.publish_raw(&room_a, "\"for-a\"".to_string()).await.unwrap();
        bus.publish_raw(&room_b, "\"for-b\"".to_string()).await.unwrap();

        let received: String = sub_b.recv().await.unwrap();
        assert_eq!(received, "for-b");
    }
}
