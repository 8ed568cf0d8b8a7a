use crate::error::DbError;
use crate::model::UserChannelReadStatus;
use im_proto::{MsgId, SeqId};
use sqlx::SqlitePool;

pub struct ReadStatusRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ReadStatusRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, user_id: &str, channel_id: &str) -> Result<Option<UserChannelReadStatus>, DbError> {
        let row: Option<(Option<String>, i64, i64)> = sqlx::query_as(
            r#"
            SELECT last_read_message_id, last_read_seq_id, unread_count
            FROM user_channel_read_status
            WHERE user_id = ? AND channel_id = ?
            "#,
        )
        .bind(user_id)
        .bind(channel_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(last_read_message_id, last_read_seq_id, unread_count)| UserChannelReadStatus {
            user_id: user_id.to_string(),
            channel_id: channel_id.to_string(),
            last_read_message_id: last_read_message_id.and_then(|s| s.parse().ok()),
            last_read_seq_id: SeqId(last_read_seq_id as u64),
            unread_count: unread_count as u64,
        }))
    }

    /// Advance the read cursor to `seq_id`/`message_id`, never backwards —
    /// `last_read_seq_id = max(old, new)`. Clears unread count down to
    /// whatever's left above the new cursor.
    pub async fn mark_read(
        &self,
        user_id: &str,
        channel_id: &str,
        message_id: MsgId,
        seq_id: SeqId,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO user_channel_read_status
                (user_id, channel_id, last_read_message_id, last_read_seq_id, unread_count)
            VALUES (?, ?, ?, ?, 0)
            ON CONFLICT(user_id, channel_id) DO UPDATE SET
                last_read_message_id = CASE
                    WHEN excluded.last_read_seq_id > user_channel_read_status.last_read_seq_id
                    THEN excluded.last_read_message_id
                    ELSE user_channel_read_status.last_read_message_id
                END,
                unread_count = CASE
                    WHEN excluded.last_read_seq_id > user_channel_read_status.last_read_seq_id
                    THEN 0
                    ELSE user_channel_read_status.unread_count
                END,
                last_read_seq_id = MAX(user_channel_read_status.last_read_seq_id, excluded.last_read_seq_id)
            "#,
        )
        .bind(user_id)
        .bind(channel_id)
        .bind(message_id.to_string())
        .bind(seq_id.0 as i64)
        .execute(self.pool)
        .await?;

        Ok(())
    }

    /// Bump unread counts for every active member of `channel_id` except the
    /// sender. Called by the post-broadcast worker, guarded by
    /// `MessageOutbox::last_observed_seq_id` so a retried delivery can't
    /// double count the same message.
    pub async fn increment_unread_for_channel(
        &self,
        channel_id: &str,
        sender_id: &str,
    ) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO user_channel_read_status (user_id, channel_id, last_read_message_id, last_read_seq_id, unread_count)
            SELECT user_id, channel_id, NULL, 0, 1
            FROM channel_members
            WHERE channel_id = ? AND user_id != ? AND left_at IS NULL
            ON CONFLICT(user_id, channel_id) DO UPDATE SET unread_count = unread_count + 1
            "#,
        )
        .bind(channel_id)
        .bind(sender_id)
        .execute(self.pool)
        .await?;

        Ok(())
    }
}
