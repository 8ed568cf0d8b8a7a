//! Wire types shared by the gateway, the HTTP surface, and any client.
//!
//! This crate has no I/O and no async runtime dependency: just the frame
//! and envelope shapes the delivery pipeline needs to serialize.

pub mod envelope;
pub mod frame;
pub mod ids;

pub use envelope::{
    Attachment, BotWebhookData, BotWebhookPayload, CreateMessageRequest, MentionPayload,
    MentionType, MessageEnvelope, MessageType, NotificationKind, NotificationTask,
    OutboxEventPayload,
};
pub use frame::{AckType, CreateMessageResponse, CreateStatus, InboundFrame, OutboundFrame};
pub use ids::{MsgId, SeqId};
