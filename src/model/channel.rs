use chrono::{DateTime, Utc};
use im_proto::SeqId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    Public,
    Private,
    Direct,
}

/// Keyed by `channel_id`; `max_seq_id` is advanced only through
/// [`crate::db::SequenceRepository::allocate`], never written directly.
#[derive(Debug, Clone)]
pub struct Channel {
    pub id: String,
    pub workspace_id: Option<String>,
    pub kind: ChannelKind,
    pub max_seq_id: SeqId,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberRole {
    Owner,
    Admin,
    Member,
    Guest,
}

/// `(channelId, userId)` with a soft `leftAt`; active iff `leftAt` is absent.
#[derive(Debug, Clone)]
pub struct ChannelMember {
    pub channel_id: String,
    pub user_id: String,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
}

impl ChannelMember {
    pub fn is_active(&self) -> bool {
        self.left_at.is_none()
    }
}
