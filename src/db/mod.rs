//! Persistent storage: an async SQLite pool plus one repository per entity
//! family. The allocator, outbox, and message insert share one transaction
//! per `create_message` call; each repository method that needs to
//! participate takes an already-open `&mut Transaction` rather than
//! acquiring its own connection.

mod channels;
mod messages;
mod outbox;
mod read_status;
mod sequence;
mod users;

pub use channels::ChannelRepository;
pub use messages::MessageRepository;
pub use outbox::OutboxRepository;
pub use read_status::ReadStatusRepository;
pub use sequence::SequenceRepository;
pub use users::UserRepository;

use crate::error::DbError;
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    pub async fn new(path: &str) -> Result<Self, DbError> {
        let pool = if path == ":memory:" {
            let options = SqliteConnectOptions::new()
                .filename("file::memory:")
                .shared_cache(true)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "database connected");
        Self::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn channels(&self) -> ChannelRepository<'_> {
        ChannelRepository::new(&self.pool)
    }

    pub fn messages(&self) -> MessageRepository<'_> {
        MessageRepository::new(&self.pool)
    }

    pub fn outbox(&self) -> OutboxRepository<'_> {
        OutboxRepository::new(&self.pool)
    }

    pub fn read_status(&self) -> ReadStatusRepository<'_> {
        ReadStatusRepository::new(&self.pool)
    }

    pub fn sequences(&self) -> SequenceRepository<'_> {
        SequenceRepository::new(&self.pool)
    }

    pub fn users(&self) -> UserRepository<'_> {
        UserRepository::new(&self.pool)
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                display_name TEXT NOT NULL,
                webhook_url TEXT,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS channels (
                id TEXT PRIMARY KEY,
                workspace_id TEXT,
                kind TEXT NOT NULL,
                max_seq_id INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS channel_members (
                channel_id TEXT NOT NULL,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                joined_at TEXT NOT NULL,
                left_at TEXT,
                PRIMARY KEY (channel_id, user_id)
            );

            CREATE INDEX IF NOT EXISTS idx_channel_members_user
                ON channel_members(user_id);

            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                channel_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                seq_id INTEGER NOT NULL,
                client_msg_id TEXT,
                parent_id TEXT,
                root_id TEXT,
                message_type TEXT NOT NULL,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                UNIQUE(channel_id, seq_id),
                UNIQUE(channel_id, client_msg_id)
            );

            CREATE INDEX IF NOT EXISTS idx_messages_channel_seq
                ON messages(channel_id, seq_id);

            CREATE TABLE IF NOT EXISTS mentions (
                message_id TEXT NOT NULL,
                mention_type TEXT NOT NULL,
                mentioned_user_id TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_mentions_message
                ON mentions(message_id);

            CREATE TABLE IF NOT EXISTS message_outbox (
                message_id TEXT PRIMARY KEY,
                channel_id TEXT NOT NULL,
                status TEXT NOT NULL,
                payload TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                completed_at TEXT,
                last_observed_seq_id INTEGER
            );

            CREATE INDEX IF NOT EXISTS idx_outbox_status
                ON message_outbox(status, updated_at);

            CREATE TABLE IF NOT EXISTS user_channel_read_status (
                user_id TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                last_read_message_id TEXT,
                last_read_seq_id INTEGER NOT NULL DEFAULT 0,
                unread_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (user_id, channel_id)
            );
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }
}
