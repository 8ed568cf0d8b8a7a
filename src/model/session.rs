use chrono::{DateTime, Utc};
use im_proto::{MsgId, SeqId};
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresenceStatus {
    Online,
    Offline,
    Away,
    Busy,
}

/// One active connection of one user. Owned by the gateway node that
/// accepted the socket; `expires_at` is renewed by heartbeats and is the
/// authority for zombie detection, independent of any wall-clock skew
/// between nodes.
#[derive(Debug, Clone)]
pub struct DeviceSession {
    pub user_id: String,
    pub socket_id: String,
    pub gateway_node_id: String,
    pub platform: String,
    pub device_id: Option<String>,
    pub login_time: DateTime<Utc>,
    pub last_active_time: DateTime<Utc>,
    pub expires_at: Instant,
}

/// `(userId, channelId)` → last-read cursor and unread count.
/// `last_read_seq_id` is monotonic; only ever advanced by `max(old, new)`.
#[derive(Debug, Clone)]
pub struct UserChannelReadStatus {
    pub user_id: String,
    pub channel_id: String,
    pub last_read_message_id: Option<MsgId>,
    pub last_read_seq_id: SeqId,
    pub unread_count: u64,
}
