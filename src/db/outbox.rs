use crate::error::DbError;
use crate::model::{MessageOutbox, OutboxStatus};
use chrono::{DateTime, Utc};
use im_proto::{MsgId, OutboxEventPayload, SeqId};
use sqlx::{Sqlite, SqlitePool, Transaction};

pub struct OutboxRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> OutboxRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.pool
    }

    /// Insert the outbox row inside the same transaction as the message
    /// insert, so a post-broadcast job is never created for a message that
    /// didn't actually commit.
    pub async fn insert(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        message_id: MsgId,
        channel_id: &str,
        payload: &OutboxEventPayload,
    ) -> Result<(), DbError> {
        let payload_json = serde_json::to_string(payload)?;
        let now = Utc::now().to_rfc3339();

        sqlx::query(
            r#"
            INSERT INTO message_outbox
                (message_id, channel_id, status, payload, created_at, updated_at, completed_at, last_observed_seq_id)
            VALUES (?, ?, 'pending', ?, ?, ?, NULL, NULL)
            "#,
        )
        .bind(message_id.to_string())
        .bind(channel_id)
        .bind(payload_json)
        .bind(&now)
        .bind(&now)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    /// Pending rows, oldest first, atomically claimed by a worker poll
    /// cycle: the transition to `'claimed'` happens in the same statement as
    /// the row selection and excludes the row from every other worker's
    /// `WHERE status = 'pending'` filter from that instant on, so two
    /// workers polling concurrently never process the same row. A worker
    /// that crashes mid-delivery leaves the row parked in `'claimed'` with
    /// `updated_at` stamped at claim time, which is exactly what makes it
    /// eligible for `stuck_pending` once the grace period elapses.
    pub async fn claim_pending(&self, limit: u32) -> Result<Vec<MessageOutbox>, DbError> {
        let now = Utc::now().to_rfc3339();
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            UPDATE message_outbox
            SET status = 'claimed', updated_at = ?
            WHERE message_id IN (
                SELECT message_id FROM message_outbox
                WHERE status = 'pending'
                ORDER BY updated_at ASC
                LIMIT ?
            )
            RETURNING message_id, channel_id, status, payload, created_at, completed_at, last_observed_seq_id
            "#,
        )
        .bind(&now)
        .bind(limit as i64)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(row_to_outbox).collect()
    }

    /// Count of rows not yet `completed`/`failed` (queued or in-flight), for
    /// the outbox backlog gauge.
    pub async fn count_pending(&self) -> Result<i64, DbError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM message_outbox WHERE status IN ('pending', 'claimed')")
                .fetch_one(self.pool)
                .await?;
        Ok(count)
    }

    /// Rows left `claimed` past `grace_secs` — a worker took them off the
    /// pending queue and then crashed or stalled before reaching
    /// `mark_completed`/`mark_failed`. Re-bumps `updated_at` as part of the
    /// same claim so the periodic scanner's own concurrent runs (or a
    /// worker's regular poll) can't double-reclaim the row either.
    pub async fn stuck_pending(&self, grace_secs: i64, limit: u32) -> Result<Vec<MessageOutbox>, DbError> {
        let cutoff = (Utc::now() - chrono::Duration::seconds(grace_secs)).to_rfc3339();
        let now = Utc::now().to_rfc3339();
        let rows = sqlx::query_as::<_, OutboxRow>(
            r#"
            UPDATE message_outbox
            SET updated_at = ?
            WHERE message_id IN (
                SELECT message_id FROM message_outbox
                WHERE status = 'claimed' AND updated_at < ?
                ORDER BY updated_at ASC
                LIMIT ?
            )
            RETURNING message_id, channel_id, status, payload, created_at, completed_at, last_observed_seq_id
            "#,
        )
        .bind(&now)
        .bind(cutoff)
        .bind(limit as i64)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(row_to_outbox).collect()
    }

    pub async fn mark_completed(&self, message_id: MsgId) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "UPDATE message_outbox SET status = 'completed', completed_at = ?, updated_at = ? WHERE message_id = ?",
        )
        .bind(&now)
        .bind(&now)
        .bind(message_id.to_string())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(&self, message_id: MsgId) -> Result<(), DbError> {
        sqlx::query("UPDATE message_outbox SET status = 'failed', updated_at = ? WHERE message_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(message_id.to_string())
            .execute(self.pool)
            .await?;
        Ok(())
    }

    /// Records the `seq_id` a worker last used to bump unread counters for
    /// this message, so a retried delivery can't double count.
    pub async fn set_last_observed_seq_id(&self, message_id: MsgId, seq_id: SeqId) -> Result<(), DbError> {
        sqlx::query("UPDATE message_outbox SET last_observed_seq_id = ?, updated_at = ? WHERE message_id = ?")
            .bind(seq_id.0 as i64)
            .bind(Utc::now().to_rfc3339())
            .bind(message_id.to_string())
            .execute(self.pool)
            .await?;
        Ok(())
    }
}

type OutboxRow = (String, String, String, String, String, Option<String>, Option<i64>);

fn row_to_outbox(row: OutboxRow) -> Result<MessageOutbox, DbError> {
    let (message_id, channel_id, status, payload, created_at, completed_at, last_observed_seq_id) = row;
    let payload: OutboxEventPayload = serde_json::from_str(&payload)?;

    Ok(MessageOutbox {
        message_id: message_id.parse().unwrap_or_else(|_| MsgId::generate()),
        channel_id,
        status: str_to_status(&status),
        payload,
        created_at: created_at.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
        completed_at: completed_at.and_then(|s| s.parse().ok()),
        last_observed_seq_id: last_observed_seq_id.map(|v| SeqId(v as u64)),
    })
}

fn str_to_status(s: &str) -> OutboxStatus {
    match s {
        "claimed" => OutboxStatus::Claimed,
        "completed" => OutboxStatus::Completed,
        "failed" => OutboxStatus::Failed,
        _ => OutboxStatus::Pending,
    }
}
