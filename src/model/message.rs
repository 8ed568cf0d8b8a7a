use chrono::{DateTime, Utc};
use im_proto::{MentionType, MessageType, MsgId, SeqId};

/// Immutable once inserted; `root_id` is the 1-level-flattened thread root
/// (if the parent is itself a reply, `root_id` inherits the parent's
/// `root_id`; otherwise `root_id = parent_id`).
#[derive(Debug, Clone)]
pub struct Message {
    pub id: MsgId,
    pub channel_id: String,
    pub sender_id: String,
    pub seq_id: SeqId,
    pub client_msg_id: Option<String>,
    pub parent_id: Option<MsgId>,
    pub root_id: Option<MsgId>,
    pub message_type: MessageType,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub is_deleted: bool,
}

impl Message {
    /// Derive this message's `root_id` given its own `parent_id` and the
    /// parent's already-stored `root_id` — the only context this needs,
    /// since threads are flattened one level deep at write time.
    pub fn derive_root_id(parent_id: Option<MsgId>, parent_root_id: Option<MsgId>) -> Option<MsgId> {
        parent_id.map(|parent| parent_root_id.unwrap_or(parent))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,
    Claimed,
    Completed,
    Failed,
}

/// One row per message, created with the message in a single transaction.
#[derive(Debug, Clone)]
pub struct MessageOutbox {
    pub message_id: MsgId,
    pub channel_id: String,
    pub status: OutboxStatus,
    pub payload: im_proto::OutboxEventPayload,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Highest `seq_id` the worker has folded into `UserChannelReadStatus`
    /// for this row's replay, guarding the unread-increment idempotency.
    pub last_observed_seq_id: Option<SeqId>,
}

/// Parsed from content at write time.
#[derive(Debug, Clone)]
pub struct Mention {
    pub message_id: MsgId,
    pub mention_type: MentionType,
    pub mentioned_user_id: Option<String>,
}
