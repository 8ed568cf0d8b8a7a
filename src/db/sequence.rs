use crate::error::DbError;
use im_proto::SeqId;
use sqlx::{Sqlite, SqlitePool, Transaction};

/// Allocates the next `seq_id` for a channel inside an already-open
/// transaction, so the bump and the message insert commit atomically. SQLite
/// serializes writers at the connection/transaction level, which is enough
/// to give the strictly-increasing, gap-free-after-commit contract without a
/// separate lock primitive.
pub struct SequenceRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> SequenceRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.pool
    }

    /// Allocate the next seq_id for `channel_id` within `tx`. The caller
    /// must commit `tx` together with the message insert for the allocation
    /// to become visible.
    pub async fn allocate(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        channel_id: &str,
    ) -> Result<SeqId, DbError> {
        let row: (i64,) = sqlx::query_as(
            "UPDATE channels SET max_seq_id = max_seq_id + 1 WHERE id = ? RETURNING max_seq_id",
        )
        .bind(channel_id)
        .fetch_one(&mut **tx)
        .await?;

        Ok(SeqId(row.0 as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::ChannelKind;

    #[tokio::test]
    async fn allocation_is_strictly_increasing_within_a_channel() {
        let db = Database::new(":memory:").await.unwrap();
        db.channels().create("c1", None, ChannelKind::Public).await.unwrap();

        let mut seen = Vec::new();
        for _ in 0..20 {
            let mut tx = db.pool().begin().await.unwrap();
            let seq = db.sequences().allocate(&mut tx, "c1").await.unwrap();
            tx.commit().await.unwrap();
            seen.push(seq.0);
        }

        let mut sorted = seen.clone();
        sorted.sort_unstable();
        assert_eq!(seen, sorted, "allocations must already be in increasing order");
        let mut dedup = sorted.clone();
        dedup.dedup();
        assert_eq!(dedup.len(), sorted.len(), "no duplicate seq ids");
        assert_eq!(seen, (1..=20).collect::<Vec<_>>());
    }
}
