//! `Router::create_message` is the single entry point for persisting and
//! broadcasting a new message, shared by the HTTP create-message endpoint
//! and the gateway's `message.create` upstream frame. Both callers build a
//! [`CreateMessageRequest`] and get back a [`CreateMessageResult`].

mod mentions;

use crate::bus::{BusExt, Topic};
use crate::error::{DbError, RouterError};
use crate::model::Message;
use crate::state::Hub;
use im_proto::{
    CreateMessageRequest, CreateStatus, MentionPayload, MessageEnvelope, MsgId, OutboundFrame,
    OutboxEventPayload, SeqId,
};

pub struct CreateMessageResult {
    pub msg_id: MsgId,
    pub seq_id: SeqId,
    pub status: CreateStatus,
}

pub struct Router<'a> {
    hub: &'a Hub,
}

const MAX_CONTENT_LEN: usize = 8000;

impl<'a> Router<'a> {
    pub fn new(hub: &'a Hub) -> Self {
        Self { hub }
    }

    pub async fn create_message(&self, req: CreateMessageRequest) -> Result<CreateMessageResult, RouterError> {
        if req.content.chars().count() > MAX_CONTENT_LEN {
            return Err(RouterError::ContentTooLong);
        }

        if let Some(client_msg_id) = req.client_msg_id.as_deref()
            && let Some((msg_id, seq_id)) = self.lookup_existing(&req.channel_id, client_msg_id).await?
        {
            return Ok(CreateMessageResult {
                msg_id,
                seq_id,
                status: CreateStatus::Duplicate,
            });
        }

        let parent_root_id = match req.parent_id {
            Some(parent_id) => {
                if !self.hub.db.messages().exists(parent_id).await? {
                    return Err(RouterError::ParentNotFound);
                }
                self.hub.db.messages().root_id_of(parent_id).await?
            }
            None => None,
        };

        let msg_id = MsgId::generate();
        let now = chrono::Utc::now();
        let root_id = Message::derive_root_id(req.parent_id, parent_root_id);

        let mut tx = self.hub.db.pool().begin().await.map_err(DbError::from)?;
        let seq_id = self.hub.db.sequences().allocate(&mut tx, &req.channel_id).await?;

        let message = Message {
            id: msg_id,
            channel_id: req.channel_id.clone(),
            sender_id: req.sender_id.clone(),
            seq_id,
            client_msg_id: req.client_msg_id.clone(),
            parent_id: req.parent_id,
            root_id,
            message_type: req.message_type,
            content: req.content.clone(),
            created_at: now,
            is_deleted: false,
        };
        if let Err(e) = self.hub.db.messages().insert(&mut tx, &message).await {
            // Two concurrent creates with the same clientMsgId can both miss
            // the KV/DB dedup pre-check above and race to insert; the
            // `UNIQUE(channel_id, client_msg_id)` index lets exactly one
            // win. Dropping `tx` here rolls back our half-written row, and
            // the loser reports the winner's ids as a duplicate rather than
            // a storage error.
            if e.is_unique_violation()
                && let Some(client_msg_id) = req.client_msg_id.as_deref()
            {
                drop(tx);
                if let Some((msg_id, seq_id)) =
                    self.hub.db.messages().find_by_client_msg_id(&req.channel_id, client_msg_id).await?
                {
                    return Ok(CreateMessageResult {
                        msg_id,
                        seq_id,
                        status: CreateStatus::Duplicate,
                    });
                }
            }
            return Err(e.into());
        }

        let mentions = mentions::parse_mentions(msg_id, &req.content);
        self.hub.db.messages().insert_mentions(&mut tx, &mentions).await?;

        let envelope = MessageEnvelope {
            msg_id,
            channel_id: req.channel_id.clone(),
            seq_id,
            sender_id: req.sender_id.clone(),
            message_type: req.message_type,
            content: req.content.clone(),
            parent_id: req.parent_id,
            root_id,
            timestamp: now,
        };
        let payload = OutboxEventPayload {
            envelope: envelope.clone(),
            mentions: mentions.iter().map(to_mention_payload).collect(),
        };
        self.hub
            .db
            .outbox()
            .insert(&mut tx, msg_id, &req.channel_id, &payload)
            .await?;

        tx.commit().await.map_err(DbError::from)?;

        if let Some(client_msg_id) = req.client_msg_id.as_deref() {
            let _ = self
                .hub
                .kv
                .record_dedup(&req.channel_id, client_msg_id, &msg_id.to_string(), &seq_id.to_string())
                .await;
        }

        // Best-effort: a missed live publish is recovered by the outbox
        // scanner, so a bus failure here must not fail the request.
        let frame = OutboundFrame::MessageNew { envelope };
        if let Err(e) = self.hub.bus.publish(&Topic::Room(req.channel_id.clone()), &frame).await {
            tracing::warn!(error = %e, channel_id = %req.channel_id, "live publish failed, outbox scanner will retry");
        }

        crate::metrics::MESSAGES_CREATED.inc();

        Ok(CreateMessageResult {
            msg_id,
            seq_id,
            status: CreateStatus::Persisted,
        })
    }

    /// Checks the KV cache first, falling back to the database's unique
    /// constraint, which remains the ultimate dedup authority.
    async fn lookup_existing(
        &self,
        channel_id: &str,
        client_msg_id: &str,
    ) -> Result<Option<(MsgId, SeqId)>, RouterError> {
        if let Some((msg_id, seq_id)) = self.hub.kv.lookup_dedup(channel_id, client_msg_id).await.ok().flatten()
            && let (Ok(msg_id), Ok(seq_id)) = (msg_id.parse::<MsgId>(), seq_id.parse::<u64>())
        {
            return Ok(Some((msg_id, SeqId(seq_id))));
        }

        Ok(self.hub.db.messages().find_by_client_msg_id(channel_id, client_msg_id).await?)
    }
}

fn to_mention_payload(m: &crate::model::Mention) -> MentionPayload {
    MentionPayload {
        mention_type: m.mention_type,
        mentioned_user_id: m.mentioned_user_id.clone(),
    }
}
