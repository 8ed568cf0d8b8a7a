//! Inbound and outbound frame kinds for the persistent connection endpoint.
//!
//! Frames are tagged JSON objects (`{"type": "...", ...}`) rather than a
//! binary codec: the gateway's clients are thin, heterogeneous, and the
//! wire-level perf of the socket is not a core invariant the way the
//! delivery guarantees are.

use crate::envelope::MessageEnvelope;
use crate::ids::{MsgId, SeqId};
use serde::{Deserialize, Serialize};

/// A frame read from a client socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundFrame {
    #[serde(rename = "channel.join")]
    ChannelJoin { channel_id: String },
    #[serde(rename = "channel.leave")]
    ChannelLeave { channel_id: String },
    #[serde(rename = "workspace.join")]
    WorkspaceJoin { workspace_id: String },
    #[serde(rename = "read.mark")]
    ReadMark {
        channel_id: String,
        message_id: MsgId,
    },
    #[serde(rename = "typing.start")]
    TypingStart { channel_id: String },
    #[serde(rename = "typing.stop")]
    TypingStop { channel_id: String },
    #[serde(rename = "reaction.add")]
    ReactionAdd { message_id: MsgId, emoji: String },
    #[serde(rename = "reaction.remove")]
    ReactionRemove { message_id: MsgId, emoji: String },
    Ping { timestamp: i64 },
    Ack { msg_id: MsgId, ack_type: AckType },
    /// Upstream message create, routed through the same handler as the HTTP
    /// create-message endpoint.
    #[serde(rename = "message.create")]
    MessageCreate(Box<crate::envelope::CreateMessageRequest>),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AckType {
    Delivered,
    Read,
}

/// A frame written to a client socket.
///
/// Within one socket these are emitted strictly in the order the server
/// decided to send them; no ordering is implied
/// across distinct sockets.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundFrame {
    #[serde(rename = "auth.ok")]
    AuthOk { user_id: String },
    #[serde(rename = "auth.err")]
    AuthErr { reason: String },
    #[serde(rename = "channel.joined")]
    ChannelJoined { channel_id: String, user_id: String },
    #[serde(rename = "channel.left")]
    ChannelLeft { channel_id: String, user_id: String },
    #[serde(rename = "message.new")]
    MessageNew { envelope: MessageEnvelope },
    #[serde(rename = "message.updated")]
    MessageUpdated { message_id: MsgId },
    #[serde(rename = "message.deleted")]
    MessageDeleted { message_id: MsgId },
    #[serde(rename = "reaction.added")]
    ReactionAdded {
        message_id: MsgId,
        user_id: String,
        emoji: String,
    },
    #[serde(rename = "reaction.removed")]
    ReactionRemoved {
        message_id: MsgId,
        user_id: String,
        emoji: String,
    },
    #[serde(rename = "presence.online")]
    PresenceOnline { user_id: String, workspace_id: String },
    #[serde(rename = "presence.offline")]
    PresenceOffline { user_id: String, workspace_id: String },
    #[serde(rename = "read.updated")]
    ReadUpdated {
        channel_id: String,
        user_id: String,
        last_read_message_id: MsgId,
    },
    #[serde(rename = "typing.update")]
    TypingUpdate {
        channel_id: String,
        user_id: String,
        is_typing: bool,
    },
    Pong { timestamp: i64, server_time: i64 },
    #[serde(rename = "ack.response")]
    AckResponse { msg_id: MsgId, status: String },
    #[serde(rename = "workspace.member_joined")]
    WorkspaceMemberJoined { workspace_id: String, user_id: String },
    #[serde(rename = "workspace.members_list")]
    WorkspaceMembersList {
        workspace_id: String,
        user_ids: Vec<String>,
    },
    #[serde(rename = "channel.created")]
    ChannelCreated { channel_id: String },
}

impl OutboundFrame {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Ack status reported by `ack.response` / the HTTP create reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreateStatus {
    Persisted,
    Duplicate,
}

impl CreateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CreateStatus::Persisted => "persisted",
            CreateStatus::Duplicate => "duplicate",
        }
    }
}

/// Response to a message create, shared by the HTTP and gateway paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageResponse {
    pub msg_id: MsgId,
    pub seq_id: SeqId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_msg_id: Option<String>,
    pub status: CreateStatus,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frame_tag_round_trips() {
        let json = r#"{"type":"channel.join","channel_id":"c1"}"#;
        let frame: InboundFrame = serde_json::from_str(json).unwrap();
        matches!(frame, InboundFrame::ChannelJoin { .. });
    }

    #[test]
    fn create_status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&CreateStatus::Duplicate).unwrap(),
            "\"duplicate\""
        );
    }
}
