use crate::error::DbError;
use crate::model::{Mention, Message};
use chrono::{DateTime, Utc};
use im_proto::{MentionType, MessageType, MsgId, SeqId};
use sqlx::{Sqlite, SqlitePool, Transaction};

pub struct MessageRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> MessageRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        self.pool
    }

    /// Insert the message row and its mentions inside `tx`. The outbox row
    /// for the same message must be inserted in the same transaction by the
    /// caller (the router), so both commit or neither does.
    pub async fn insert(&self, tx: &mut Transaction<'_, Sqlite>, message: &Message) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO messages
                (id, channel_id, sender_id, seq_id, client_msg_id, parent_id, root_id,
                 message_type, content, created_at, is_deleted)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(message.id.to_string())
        .bind(&message.channel_id)
        .bind(&message.sender_id)
        .bind(message.seq_id.0 as i64)
        .bind(&message.client_msg_id)
        .bind(message.parent_id.map(|p| p.to_string()))
        .bind(message.root_id.map(|r| r.to_string()))
        .bind(message_type_to_str(message.message_type))
        .bind(&message.content)
        .bind(message.created_at.to_rfc3339())
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    pub async fn insert_mentions(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        mentions: &[Mention],
    ) -> Result<(), DbError> {
        for mention in mentions {
            sqlx::query(
                "INSERT INTO mentions (message_id, mention_type, mentioned_user_id) VALUES (?, ?, ?)",
            )
            .bind(mention.message_id.to_string())
            .bind(mention_type_to_str(mention.mention_type))
            .bind(&mention.mentioned_user_id)
            .execute(&mut **tx)
            .await?;
        }
        Ok(())
    }

    pub async fn sender_of(&self, message_id: MsgId) -> Result<Option<String>, DbError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT sender_id FROM messages WHERE id = ?")
            .bind(message_id.to_string())
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(|(sender,)| sender))
    }

    pub async fn channel_id_of(&self, message_id: MsgId) -> Result<Option<String>, DbError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT channel_id FROM messages WHERE id = ?")
            .bind(message_id.to_string())
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(|(channel_id,)| channel_id))
    }

    pub async fn seq_id_of(&self, message_id: MsgId) -> Result<Option<SeqId>, DbError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT seq_id FROM messages WHERE id = ?")
            .bind(message_id.to_string())
            .fetch_optional(self.pool)
            .await?;
        Ok(row.map(|(seq,)| SeqId(seq as u64)))
    }

    pub async fn exists(&self, message_id: MsgId) -> Result<bool, DbError> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM messages WHERE id = ?")
            .bind(message_id.to_string())
            .fetch_optional(self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// `root_id` of an existing message, needed to flatten a reply chain one
    /// level (`Message::derive_root_id`). Callers must check [`Self::exists`]
    /// first if they need to distinguish "no parent" from "root is itself
    /// the thread root".
    pub async fn root_id_of(&self, message_id: MsgId) -> Result<Option<MsgId>, DbError> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT root_id FROM messages WHERE id = ?")
                .bind(message_id.to_string())
                .fetch_optional(self.pool)
                .await?;

        Ok(row.and_then(|(root,)| root).and_then(|s| s.parse().ok()))
    }

    /// Existing `(msgId, seqId)` for a `(channelId, clientMsgId)` pair —
    /// the DB unique index is the ultimate dedup authority even if the
    /// faster KV cache missed.
    pub async fn find_by_client_msg_id(
        &self,
        channel_id: &str,
        client_msg_id: &str,
    ) -> Result<Option<(MsgId, SeqId)>, DbError> {
        let row: Option<(String, i64)> = sqlx::query_as(
            "SELECT id, seq_id FROM messages WHERE channel_id = ? AND client_msg_id = ?",
        )
        .bind(channel_id)
        .bind(client_msg_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.and_then(|(id, seq)| id.parse().ok().map(|id| (id, SeqId(seq as u64)))))
    }

    /// Messages with `seq_id > since_seq_id`, ascending, capped at `limit`.
    pub async fn since_seq(
        &self,
        channel_id: &str,
        since_seq_id: SeqId,
        limit: u32,
    ) -> Result<Vec<Message>, DbError> {
        let rows = sqlx::query_as::<
            _,
            (
                String,
                String,
                String,
                i64,
                Option<String>,
                Option<String>,
                Option<String>,
                String,
                String,
                String,
                i64,
            ),
        >(
            r#"
            SELECT id, channel_id, sender_id, seq_id, client_msg_id, parent_id, root_id,
                   message_type, content, created_at, is_deleted
            FROM messages
            WHERE channel_id = ? AND seq_id > ?
            ORDER BY seq_id ASC
            LIMIT ?
            "#,
        )
        .bind(channel_id)
        .bind(since_seq_id.0 as i64)
        .bind(limit as i64)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(row_to_message).collect())
    }
}

type MessageRow = (
    String,
    String,
    String,
    i64,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
    String,
    String,
    i64,
);

fn row_to_message(row: MessageRow) -> Message {
    let (id, channel_id, sender_id, seq_id, client_msg_id, parent_id, root_id, message_type, content, created_at, is_deleted) = row;
    Message {
        id: id.parse().unwrap_or_else(|_| MsgId::generate()),
        channel_id,
        sender_id,
        seq_id: SeqId(seq_id as u64),
        client_msg_id,
        parent_id: parent_id.and_then(|s| s.parse().ok()),
        root_id: root_id.and_then(|s| s.parse().ok()),
        message_type: str_to_message_type(&message_type),
        content,
        created_at: created_at.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
        is_deleted: is_deleted != 0,
    }
}

pub fn message_type_to_str(t: MessageType) -> &'static str {
    match t {
        MessageType::Text => "text",
        MessageType::Image => "image",
        MessageType::File => "file",
        MessageType::System => "system",
    }
}

fn str_to_message_type(s: &str) -> MessageType {
    match s {
        "image" => MessageType::Image,
        "file" => MessageType::File,
        "system" => MessageType::System,
        _ => MessageType::Text,
    }
}

pub fn mention_type_to_str(t: MentionType) -> &'static str {
    match t {
        MentionType::User => "user",
        MentionType::Everyone => "everyone",
        MentionType::Here => "here",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::model::ChannelKind;
    use im_proto::MessageType;

    fn message(id: MsgId, channel_id: &str, client_msg_id: &str) -> Message {
        Message {
            id,
            channel_id: channel_id.to_string(),
            sender_id: "alice".to_string(),
            seq_id: SeqId(1),
            client_msg_id: Some(client_msg_id.to_string()),
            parent_id: None,
            root_id: None,
            message_type: MessageType::Text,
            content: "hi".to_string(),
            created_at: Utc::now(),
            is_deleted: false,
        }
    }

    #[tokio::test]
    async fn a_second_insert_with_the_same_client_msg_id_is_a_unique_violation() {
        let db = Database::new(":memory:").await.unwrap();
        db.channels().create("c1", None, ChannelKind::Public).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        db.messages().insert(&mut tx, &message(MsgId::generate(), "c1", "abc")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        let err = db.messages().insert(&mut tx, &message(MsgId::generate(), "c1", "abc")).await.unwrap_err();

        assert!(err.is_unique_violation());
    }

    #[tokio::test]
    async fn distinct_channels_may_reuse_the_same_client_msg_id() {
        let db = Database::new(":memory:").await.unwrap();
        db.channels().create("c1", None, ChannelKind::Public).await.unwrap();
        db.channels().create("c2", None, ChannelKind::Public).await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        db.messages().insert(&mut tx, &message(MsgId::generate(), "c1", "abc")).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = db.pool().begin().await.unwrap();
        db.messages().insert(&mut tx, &message(MsgId::generate(), "c2", "abc")).await.unwrap();
        tx.commit().await.unwrap();
    }
}
