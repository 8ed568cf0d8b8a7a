//! Redis-backed fast paths: client-message-id dedup cache, typing-indicator
//! TTL keys, and the distributed offline-pull lock. The database remains
//! the authority for dedup; this cache only spares a round trip on the
//! common case.

use crate::config::KvTtls;
use crate::error::KvError;
use deadpool_redis::{Config as PoolConfig, Connection, Pool, Runtime};
use redis::AsyncCommands;

#[derive(Clone)]
pub struct Kv {
    pool: Pool,
    ttls: KvTtls,
}

impl Kv {
    pub fn new(redis_url: &str, ttls: KvTtls) -> Result<Self, KvError> {
        let cfg = PoolConfig::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| KvError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "failed to build redis pool",
                e.to_string(),
            ))))?;
        Ok(Self { pool, ttls })
    }

    async fn conn(&self) -> Result<Connection, KvError> {
        Ok(self.pool.get().await?)
    }

    fn dedup_key(channel_id: &str, client_msg_id: &str) -> String {
        format!("dedup:{channel_id}:{client_msg_id}")
    }

    fn typing_key(channel_id: &str, user_id: &str) -> String {
        format!("typing:{channel_id}:{user_id}")
    }

    fn sync_lock_key(user_id: &str) -> String {
        format!("sync-lock:{user_id}")
    }

    /// Record that `client_msg_id` has been accepted for `channel_id`,
    /// mapped to the resulting `(msg_id, seq_id)`. Best-effort: a miss on
    /// lookup always falls through to the database's unique constraint.
    pub async fn record_dedup(
        &self,
        channel_id: &str,
        client_msg_id: &str,
        msg_id: &str,
        seq_id: &str,
    ) -> Result<(), KvError> {
        let mut conn = self.conn().await?;
        let key = Self::dedup_key(channel_id, client_msg_id);
        let value = format!("{msg_id}:{seq_id}");
        let () = conn.set_ex(key, value, self.ttls.dedup_secs).await?;
        Ok(())
    }

    /// Returns `(msg_id, seq_id)` on a cache hit, without touching the
    /// database.
    pub async fn lookup_dedup(&self, channel_id: &str, client_msg_id: &str) -> Result<Option<(String, String)>, KvError> {
        let mut conn = self.conn().await?;
        let key = Self::dedup_key(channel_id, client_msg_id);
        let value: Option<String> = conn.get(key).await?;
        Ok(value.and_then(|v| v.split_once(':').map(|(m, s)| (m.to_string(), s.to_string()))))
    }

    pub async fn set_typing(&self, channel_id: &str, user_id: &str) -> Result<(), KvError> {
        let mut conn = self.conn().await?;
        let key = Self::typing_key(channel_id, user_id);
        let () = conn.set_ex(key, "1", self.ttls.typing_secs).await?;
        Ok(())
    }

    pub async fn clear_typing(&self, channel_id: &str, user_id: &str) -> Result<(), KvError> {
        let mut conn = self.conn().await?;
        let key = Self::typing_key(channel_id, user_id);
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    /// Acquire the per-user offline-pull lock via `SET NX EX`, so two
    /// gateway nodes racing a reconnect don't both run the catch-up sync.
    /// Returns `true` if this caller won the lock.
    pub async fn try_acquire_sync_lock(&self, user_id: &str, ttl_secs: u64) -> Result<bool, KvError> {
        let mut conn = self.conn().await?;
        let key = Self::sync_lock_key(user_id);
        let acquired: bool = redis::cmd("SET")
            .arg(&key)
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await
            .map(|v: Option<String>| v.is_some())?;
        Ok(acquired)
    }

    pub async fn release_sync_lock(&self, user_id: &str) -> Result<(), KvError> {
        let mut conn = self.conn().await?;
        let key = Self::sync_lock_key(user_id);
        let _: i64 = conn.del(key).await?;
        Ok(())
    }
}
