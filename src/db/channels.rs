use crate::error::DbError;
use crate::model::{Channel, ChannelKind, ChannelMember, MemberRole};
use chrono::{DateTime, Utc};
use im_proto::SeqId;
use sqlx::SqlitePool;

pub struct ChannelRepository<'a> {
    pool: &'a SqlitePool,
}

impl<'a> ChannelRepository<'a> {
    pub fn new(pool: &'a SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, id: &str, workspace_id: Option<&str>, kind: ChannelKind) -> Result<Channel, DbError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO channels (id, workspace_id, kind, max_seq_id, created_at) VALUES (?, ?, ?, 0, ?)",
        )
        .bind(id)
        .bind(workspace_id)
        .bind(kind_to_str(kind))
        .bind(now.to_rfc3339())
        .execute(self.pool)
        .await?;

        Ok(Channel {
            id: id.to_string(),
            workspace_id: workspace_id.map(String::from),
            kind,
            max_seq_id: SeqId::ZERO,
            created_at: now,
        })
    }

    pub async fn find(&self, id: &str) -> Result<Option<Channel>, DbError> {
        let row = sqlx::query_as::<_, (String, Option<String>, String, i64, String)>(
            "SELECT id, workspace_id, kind, max_seq_id, created_at FROM channels WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(|(id, workspace_id, kind, max_seq_id, created_at)| Channel {
            id,
            workspace_id,
            kind: str_to_kind(&kind),
            max_seq_id: SeqId(max_seq_id as u64),
            created_at: created_at.parse::<DateTime<Utc>>().unwrap_or_else(|_| Utc::now()),
        }))
    }

    pub async fn add_member(&self, channel_id: &str, user_id: &str, role: MemberRole) -> Result<(), DbError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            r#"
            INSERT INTO channel_members (channel_id, user_id, role, joined_at, left_at)
            VALUES (?, ?, ?, ?, NULL)
            ON CONFLICT(channel_id, user_id) DO UPDATE SET left_at = NULL, role = excluded.role
            "#,
        )
        .bind(channel_id)
        .bind(user_id)
        .bind(role_to_str(role))
        .bind(now)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_member(&self, channel_id: &str, user_id: &str) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE channel_members SET left_at = ? WHERE channel_id = ? AND user_id = ? AND left_at IS NULL",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(channel_id)
        .bind(user_id)
        .execute(self.pool)
        .await?;
        Ok(())
    }

    /// Active members only.
    pub async fn active_members(&self, channel_id: &str) -> Result<Vec<ChannelMember>, DbError> {
        let rows = sqlx::query_as::<_, (String, String, String, String, Option<String>)>(
            r#"
            SELECT channel_id, user_id, role, joined_at, left_at
            FROM channel_members
            WHERE channel_id = ? AND left_at IS NULL
            "#,
        )
        .bind(channel_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(channel_id, user_id, role, joined_at, left_at)| ChannelMember {
                channel_id,
                user_id,
                role: str_to_role(&role),
                joined_at: joined_at.parse().unwrap_or_else(|_| Utc::now()),
                left_at: left_at.and_then(|s| s.parse().ok()),
            })
            .collect())
    }

    pub async fn is_active_member(&self, channel_id: &str, user_id: &str) -> Result<bool, DbError> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT 1 FROM channel_members WHERE channel_id = ? AND user_id = ? AND left_at IS NULL",
        )
        .bind(channel_id)
        .bind(user_id)
        .fetch_optional(self.pool)
        .await?;
        Ok(row.is_some())
    }

    /// All channel ids a user actively belongs to (used to rebuild the
    /// gateway's room-join set on reconnect).
    pub async fn channels_for_user(&self, user_id: &str) -> Result<Vec<String>, DbError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT channel_id FROM channel_members WHERE user_id = ? AND left_at IS NULL",
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(|(c,)| c).collect())
    }

    /// Distinct workspaces a user actively belongs to, derived through its
    /// channel memberships. Used to fan presence transitions to the right
    /// workspace rooms.
    pub async fn workspaces_for_user(&self, user_id: &str) -> Result<Vec<String>, DbError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT c.workspace_id
            FROM channel_members m
            JOIN channels c ON c.id = m.channel_id
            WHERE m.user_id = ? AND m.left_at IS NULL AND c.workspace_id IS NOT NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool)
        .await?;
        Ok(rows.into_iter().map(|(w,)| w).collect())
    }
}

pub fn kind_to_str(kind: ChannelKind) -> &'static str {
    match kind {
        ChannelKind::Public => "public",
        ChannelKind::Private => "private",
        ChannelKind::Direct => "direct",
    }
}

fn str_to_kind(s: &str) -> ChannelKind {
    match s {
        "private" => ChannelKind::Private,
        "direct" => ChannelKind::Direct,
        _ => ChannelKind::Public,
    }
}

fn role_to_str(role: MemberRole) -> &'static str {
    match role {
        MemberRole::Owner => "owner",
        MemberRole::Admin => "admin",
        MemberRole::Member => "member",
        MemberRole::Guest => "guest",
    }
}

fn str_to_role(s: &str) -> MemberRole {
    match s {
        "owner" => MemberRole::Owner,
        "admin" => MemberRole::Admin,
        "guest" => MemberRole::Guest,
        _ => MemberRole::Member,
    }
}
