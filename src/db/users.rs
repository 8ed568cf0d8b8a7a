use crate::error::DbError;
use crate::model::{User, UserKind};
use chrono::Utc;
use sqlx::SqlitePool;

pub struct UserRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> UserRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn upsert(&self, user: &User) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO users (id, kind, display_name, webhook_url, created_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                display_name = excluded.display_name,
                webhook_url = excluded.webhook_url
            "#,
        )
        .bind(&user.id)
        .bind(kind_to_str(user.kind))
        .bind(&user.display_name)
        .bind(&user.webhook_url)
        .bind(user.created_at.to_rfc3339())
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn find(&self, id: &str) -> Result<Option<User>, DbError> {
        let row = sqlx::query_as::<_, (String, String, String, Option<String>, String)>(
            "SELECT id, kind, display_name, webhook_url, created_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(id, kind, display_name, webhook_url, created_at)| User {
            id,
            kind: str_to_kind(&kind),
            display_name,
            webhook_url,
            created_at: created_at
                .parse()
                .unwrap_or_else(|_| Utc::now()),
        }))
    }

    /// Active bots in a channel carrying a webhook URL, excluding `exclude_user_id`
    /// (the sender). Joined against active membership.
    pub async fn active_bots_with_webhook(
        &self,
        channel_id: &str,
        exclude_user_id: &str,
    ) -> Result<Vec<User>, DbError> {
        let rows = sqlx::query_as::<_, (String, String, String, Option<String>, String)>(
            r#"
            SELECT u.id, u.kind, u.display_name, u.webhook_url, u.created_at
            FROM users u
            JOIN channel_members m ON m.user_id = u.id AND m.channel_id = ?
            WHERE u.kind = 'bot'
              AND u.webhook_url IS NOT NULL
              AND m.left_at IS NULL
              AND u.id != ?
            "#,
        )
        .bind(channel_id)
        .bind(exclude_user_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, kind, display_name, webhook_url, created_at)| User {
                id,
                kind: str_to_kind(&kind),
                display_name,
                webhook_url,
                created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            })
            .collect())
    }
}

fn kind_to_str(kind: UserKind) -> &'static str {
    match kind {
        UserKind::Human => "human",
        UserKind::Bot => "bot",
        UserKind::System => "system",
    }
}

fn str_to_kind(s: &str) -> UserKind {
    match s {
        "bot" => UserKind::Bot,
        "system" => UserKind::System,
        _ => UserKind::Human,
    }
}
