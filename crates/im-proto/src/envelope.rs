//! Broadcast envelopes and the create-message request/outbox payload shapes.

use crate::ids::{MsgId, SeqId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    Text,
    Image,
    File,
    System,
}

/// Body of a `POST` create-message request, also reused as the payload
/// carried by the `message.create` upstream frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateMessageRequest {
    pub channel_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MsgId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_msg_id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub url: String,
    #[serde(default)]
    pub content_type: Option<String>,
    #[serde(default)]
    pub size_bytes: Option<i64>,
}

/// The envelope broadcast to gateways over the pub/sub bus, and embedded in
/// the `message.new` outbound frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub msg_id: MsgId,
    pub channel_id: String,
    pub seq_id: SeqId,
    pub sender_id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MsgId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_id: Option<MsgId>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Payload stored on the `MessageOutbox` row, sufficient on its own to
/// reconstruct the broadcast if the original publish attempt was lost.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxEventPayload {
    pub envelope: MessageEnvelope,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub mentions: Vec<MentionPayload>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MentionType {
    User,
    Everyone,
    Here,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MentionPayload {
    #[serde(rename = "type")]
    pub mention_type: MentionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mentioned_user_id: Option<String>,
}

/// What kind of targeted notification a [`NotificationTask`] represents.
/// Distinct from the live room broadcast: these are handed off to the
/// (out-of-scope) notification service, which is expected to reach a
/// recipient whether or not any of their devices are currently connected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Dm,
    Reply,
    ThreadReply,
    Mention,
}

/// A single targeted notification, published at-least-once to
/// `notify:<recipientId>`. Consumers are expected to dedupe by
/// `envelope.msg_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTask {
    pub kind: NotificationKind,
    pub recipient_id: String,
    pub envelope: MessageEnvelope,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_sender_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mention_type: Option<MentionType>,
}

/// Outbound POST body delivered to a bot's webhook URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotWebhookPayload {
    pub event: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub data: BotWebhookData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotWebhookData {
    pub message_id: MsgId,
    pub channel_id: String,
    pub sender_id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<MsgId>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub sender: serde_json::Value,
    pub channel: serde_json::Value,
}
