//! Catch-up sync for a reconnecting or just-logged-in client: pull every
//! message committed after the client's last known `seq_id`, and let the
//! client acknowledge a read position once it has caught up.

use crate::error::RouterError;
use crate::model::Message;
use crate::state::Hub;
use im_proto::{MsgId, SeqId};

pub struct SyncPage {
    pub messages: Vec<Message>,
    pub max_seq_id: SeqId,
}

pub struct SyncEngine<'a> {
    hub: &'a Hub,
}

impl<'a> SyncEngine<'a> {
    pub fn new(hub: &'a Hub) -> Self {
        Self { hub }
    }

    /// Messages committed to `channel_id` after `since_seq_id`, capped at
    /// `limit` (falling back to the configured default). `max_seq_id` is the
    /// channel's current high-water mark, so a client can tell whether it
    /// needs to page again.
    pub async fn sync_channel(
        &self,
        channel_id: &str,
        since_seq_id: SeqId,
        limit: Option<u32>,
    ) -> Result<SyncPage, RouterError> {
        let limit = limit.unwrap_or(self.hub.config.sync.default_page_limit);
        let messages = self.hub.db.messages().since_seq(channel_id, since_seq_id, limit).await?;

        let max_seq_id = self
            .hub
            .db
            .channels()
            .find(channel_id)
            .await?
            .map(|c| c.max_seq_id)
            .unwrap_or(since_seq_id);

        Ok(SyncPage { messages, max_seq_id })
    }

    /// Advance `user_id`'s read cursor on `channel_id` to `message_id`. The
    /// underlying upsert is a monotonic max-merge, so an out-of-order ack
    /// (e.g. from a second device) can never move the cursor backwards.
    pub async fn ack(&self, user_id: &str, channel_id: &str, message_id: MsgId) -> Result<(), RouterError> {
        let seq_id = self
            .hub
            .db
            .messages()
            .seq_id_of(message_id)
            .await?
            .ok_or(RouterError::MessageNotFound)?;

        self.hub
            .db
            .read_status()
            .mark_read(user_id, channel_id, message_id, seq_id)
            .await?;
        Ok(())
    }

    /// Acquire the per-user offline-pull lock so two gateway nodes racing a
    /// reconnect don't both replay the same backlog. Callers should treat a
    /// `false` return as "another node already owns this pull" and skip.
    pub async fn try_start_offline_pull(&self, user_id: &str) -> bool {
        self.hub
            .kv
            .try_acquire_sync_lock(user_id, self.hub.config.sync.offline_pull_lock_ttl_secs)
            .await
            .unwrap_or(true)
    }

    pub async fn finish_offline_pull(&self, user_id: &str) {
        let _ = self.hub.kv.release_sync_lock(user_id).await;
    }
}
