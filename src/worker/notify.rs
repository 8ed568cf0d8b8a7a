//! Targeted notification tasks: DM, reply/thread-reply, and mention
//! fan-out. Distinct from the live room broadcast the router already
//! published — these are handed to the (out-of-scope) notification
//! service via the bus's per-user `notify:<userId>` topic, published
//! unconditionally of whether the recipient is online, since push
//! notifications exist precisely to reach offline users. Consumers
//! dedupe by `envelope.msg_id`.

use crate::bus::{BusExt, Topic};
use crate::model::{Channel, ChannelKind};
use crate::state::Hub;
use im_proto::{MentionPayload, MentionType, MessageEnvelope, NotificationKind, NotificationTask};
use std::collections::HashSet;
use tracing::warn;

pub async fn dispatch(hub: &Hub, channel: &Channel, envelope: &MessageEnvelope, mentions: &[MentionPayload]) {
    if channel.kind == ChannelKind::Direct {
        dispatch_dm(hub, channel, envelope).await;
    }

    dispatch_reply(hub, envelope).await;

    if channel.workspace_id.is_some() {
        dispatch_mentions(hub, channel, envelope, mentions).await;
    }
}

async fn dispatch_dm(hub: &Hub, channel: &Channel, envelope: &MessageEnvelope) {
    let members = match hub.db.channels().active_members(&channel.id).await {
        Ok(m) => m,
        Err(e) => {
            warn!(error = %e, channel_id = %channel.id, "failed to load members for DM notification");
            return;
        }
    };

    for member in members.into_iter().filter(|m| m.user_id != envelope.sender_id) {
        publish(
            hub,
            NotificationTask {
                kind: NotificationKind::Dm,
                recipient_id: member.user_id,
                envelope: envelope.clone(),
                root_sender_id: None,
                mention_type: None,
            },
        )
        .await;
    }
}

async fn dispatch_reply(hub: &Hub, envelope: &MessageEnvelope) {
    let Some(parent_id) = envelope.parent_id else {
        return;
    };

    let parent_sender = match hub.db.messages().sender_of(parent_id).await {
        Ok(Some(sender)) => sender,
        Ok(None) => return,
        Err(e) => {
            warn!(error = %e, "failed to load parent sender for reply notification");
            return;
        }
    };

    if parent_sender == envelope.sender_id {
        return;
    }

    // `root_id` inherits the parent's root during derivation, so a reply
    // directly on a root message has `root_id == parent_id`; anything else
    // is a reply to a reply, i.e. a thread reply one level deeper.
    let is_thread_reply = envelope.root_id.is_some_and(|root| Some(root) != envelope.parent_id);

    let (kind, root_sender_id) = if is_thread_reply {
        let root_sender = match envelope.root_id {
            Some(root_id) => hub.db.messages().sender_of(root_id).await.ok().flatten(),
            None => None,
        };
        (NotificationKind::ThreadReply, root_sender)
    } else {
        (NotificationKind::Reply, None)
    };

    publish(
        hub,
        NotificationTask {
            kind,
            recipient_id: parent_sender,
            envelope: envelope.clone(),
            root_sender_id,
            mention_type: None,
        },
    )
    .await;
}

async fn dispatch_mentions(hub: &Hub, channel: &Channel, envelope: &MessageEnvelope, mentions: &[MentionPayload]) {
    let mut broadcast_recipients: Option<HashSet<String>> = None;

    for mention in mentions {
        match mention.mention_type {
            MentionType::User => {
                let Some(recipient_id) = mention.mentioned_user_id.clone() else {
                    continue;
                };
                if recipient_id == envelope.sender_id {
                    continue;
                }
                publish(
                    hub,
                    NotificationTask {
                        kind: NotificationKind::Mention,
                        recipient_id,
                        envelope: envelope.clone(),
                        root_sender_id: None,
                        mention_type: Some(MentionType::User),
                    },
                )
                .await;
            }
            MentionType::Everyone | MentionType::Here => {
                if broadcast_recipients.is_none() {
                    broadcast_recipients = Some(channel_recipients(hub, channel, envelope).await);
                }
                let Some(recipients) = &broadcast_recipients else { continue };
                for recipient_id in recipients {
                    publish(
                        hub,
                        NotificationTask {
                            kind: NotificationKind::Mention,
                            recipient_id: recipient_id.clone(),
                            envelope: envelope.clone(),
                            root_sender_id: None,
                            mention_type: Some(mention.mention_type),
                        },
                    )
                    .await;
                }
            }
        }
    }
}

async fn channel_recipients(hub: &Hub, channel: &Channel, envelope: &MessageEnvelope) -> HashSet<String> {
    match hub.db.channels().active_members(&channel.id).await {
        Ok(members) => members
            .into_iter()
            .map(|m| m.user_id)
            .filter(|id| id != &envelope.sender_id)
            .collect(),
        Err(e) => {
            warn!(error = %e, channel_id = %channel.id, "failed to load members for broadcast mention");
            HashSet::new()
        }
    }
}

async fn publish(hub: &Hub, task: NotificationTask) {
    let recipient_id = task.recipient_id.clone();
    match hub.bus.publish(&Topic::Notify(recipient_id.clone()), &task).await {
        Ok(()) => crate::metrics::NOTIFICATIONS_DISPATCHED.inc(),
        Err(e) => warn!(error = %e, recipient_id, kind = ?task.kind, "failed to publish notification task"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::config::Config;
    use crate::db::Database;
    use crate::kv::Kv;
    use crate::model::{ChannelKind, MemberRole, Message};
    use im_proto::{MessageType, MsgId, SeqId};
    use std::sync::Arc;
    use std::time::Duration;

    fn test_config() -> Config {
        toml::from_str(
            r#"
            [server]
            name = "test"
            node_id = "node-1"
            auth_secret = "0123456789abcdef0123456789abcdef"
            "#,
        )
        .unwrap()
    }

    async fn test_hub() -> Hub {
        let db = Database::new(":memory:").await.unwrap();
        let kv = Kv::new("redis://127.0.0.1:0", Default::default()).unwrap();
        let bus: Arc<dyn crate::bus::Bus> = Arc::new(LocalBus::new());
        Hub::new(Arc::new(test_config()), db, kv, bus)
    }

    fn envelope(channel_id: &str, sender_id: &str, parent_id: Option<MsgId>, root_id: Option<MsgId>) -> MessageEnvelope {
        MessageEnvelope {
            msg_id: MsgId::generate(),
            channel_id: channel_id.to_string(),
            seq_id: SeqId(1),
            sender_id: sender_id.to_string(),
            message_type: MessageType::Text,
            content: "hi".to_string(),
            parent_id,
            root_id,
            timestamp: chrono::Utc::now(),
        }
    }

    async fn recv_one(hub: &Hub, user_id: &str) -> NotificationTask {
        let mut sub = hub.bus.subscribe(&Topic::Notify(user_id.to_string())).await.unwrap();
        tokio::time::timeout(Duration::from_millis(200), sub.recv::<NotificationTask>())
            .await
            .expect("expected a notification task")
            .expect("subscription closed")
    }

    #[tokio::test]
    async fn dm_notifies_every_other_member_but_not_the_sender() {
        let hub = test_hub().await;
        let channel = hub.db.channels().create("dm1", None, ChannelKind::Direct).await.unwrap();
        hub.db.channels().add_member("dm1", "alice", MemberRole::Member).await.unwrap();
        hub.db.channels().add_member("dm1", "bob", MemberRole::Member).await.unwrap();

        let env = envelope("dm1", "alice", None, None);
        let hub2 = hub.clone();
        let sub_task = tokio::spawn(async move { recv_one(&hub2, "bob").await });
        // give the subscriber a moment to register before publishing
        tokio::time::sleep(Duration::from_millis(10)).await;
        dispatch_dm(&hub, &channel, &env).await;

        let task = sub_task.await.unwrap();
        assert_eq!(task.kind, NotificationKind::Dm);
        assert_eq!(task.recipient_id, "bob");
    }

    #[tokio::test]
    async fn reply_notifies_parent_author_as_reply_when_root_equals_parent() {
        let hub = test_hub().await;
        let channel = hub.db.channels().create("c1", None, ChannelKind::Public).await.unwrap();
        let _ = channel;

        let mut tx = hub.db.messages().pool().begin().await.unwrap();
        let parent = Message {
            id: MsgId::generate(),
            channel_id: "c1".to_string(),
            sender_id: "alice".to_string(),
            seq_id: SeqId(1),
            client_msg_id: None,
            parent_id: None,
            root_id: None,
            message_type: MessageType::Text,
            content: "root".to_string(),
            created_at: chrono::Utc::now(),
            is_deleted: false,
        };
        hub.db.messages().insert(&mut tx, &parent).await.unwrap();
        tx.commit().await.unwrap();

        let env = envelope("c1", "bob", Some(parent.id), Some(parent.id));

        let hub2 = hub.clone();
        let sub_task = tokio::spawn(async move { recv_one(&hub2, "alice").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        dispatch_reply(&hub, &env).await;

        let task = sub_task.await.unwrap();
        assert_eq!(task.kind, NotificationKind::Reply);
        assert_eq!(task.recipient_id, "alice");
        assert!(task.root_sender_id.is_none());
    }

    #[tokio::test]
    async fn reply_does_not_notify_when_replying_to_own_message() {
        let hub = test_hub().await;
        hub.db.channels().create("c1", None, ChannelKind::Public).await.unwrap();

        let mut tx = hub.db.messages().pool().begin().await.unwrap();
        let parent = Message {
            id: MsgId::generate(),
            channel_id: "c1".to_string(),
            sender_id: "alice".to_string(),
            seq_id: SeqId(1),
            client_msg_id: None,
            parent_id: None,
            root_id: None,
            message_type: MessageType::Text,
            content: "root".to_string(),
            created_at: chrono::Utc::now(),
            is_deleted: false,
        };
        hub.db.messages().insert(&mut tx, &parent).await.unwrap();
        tx.commit().await.unwrap();

        let env = envelope("c1", "alice", Some(parent.id), Some(parent.id));
        let mut sub = hub.bus.subscribe(&Topic::Notify("alice".to_string())).await.unwrap();
        dispatch_reply(&hub, &env).await;

        let result = tokio::time::timeout(Duration::from_millis(50), sub.recv::<NotificationTask>()).await;
        assert!(result.is_err(), "replying to your own message must not notify yourself");
    }

    #[tokio::test]
    async fn thread_reply_one_level_deeper_notifies_as_thread_reply() {
        let hub = test_hub().await;
        hub.db.channels().create("c1", None, ChannelKind::Public).await.unwrap();

        let mut tx = hub.db.messages().pool().begin().await.unwrap();
        let root = Message {
            id: MsgId::generate(),
            channel_id: "c1".to_string(),
            sender_id: "alice".to_string(),
            seq_id: SeqId(1),
            client_msg_id: None,
            parent_id: None,
            root_id: None,
            message_type: MessageType::Text,
            content: "root".to_string(),
            created_at: chrono::Utc::now(),
            is_deleted: false,
        };
        hub.db.messages().insert(&mut tx, &root).await.unwrap();
        let reply = Message {
            id: MsgId::generate(),
            channel_id: "c1".to_string(),
            sender_id: "bob".to_string(),
            seq_id: SeqId(2),
            client_msg_id: None,
            parent_id: Some(root.id),
            root_id: Some(root.id),
            message_type: MessageType::Text,
            content: "first reply".to_string(),
            created_at: chrono::Utc::now(),
            is_deleted: false,
        };
        hub.db.messages().insert(&mut tx, &reply).await.unwrap();
        tx.commit().await.unwrap();

        // carol replies to bob's reply: parent_id = reply.id, root_id = root.id (deeper than one level)
        let env = envelope("c1", "carol", Some(reply.id), Some(root.id));

        let hub2 = hub.clone();
        let sub_task = tokio::spawn(async move { recv_one(&hub2, "bob").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        dispatch_reply(&hub, &env).await;

        let task = sub_task.await.unwrap();
        assert_eq!(task.kind, NotificationKind::ThreadReply);
        assert_eq!(task.recipient_id, "bob");
        assert_eq!(task.root_sender_id.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn everyone_mention_notifies_all_active_members_except_sender() {
        let hub = test_hub().await;
        let channel = hub.db.channels().create("c1", Some("w1"), ChannelKind::Public).await.unwrap();
        hub.db.channels().add_member("c1", "alice", MemberRole::Member).await.unwrap();
        hub.db.channels().add_member("c1", "bob", MemberRole::Member).await.unwrap();
        hub.db.channels().add_member("c1", "carol", MemberRole::Member).await.unwrap();

        let env = envelope("c1", "alice", None, None);
        let mentions = vec![MentionPayload { mention_type: MentionType::Everyone, mentioned_user_id: None }];

        let hub_bob = hub.clone();
        let hub_carol = hub.clone();
        let bob_task = tokio::spawn(async move { recv_one(&hub_bob, "bob").await });
        let carol_task = tokio::spawn(async move { recv_one(&hub_carol, "carol").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        dispatch_mentions(&hub, &channel, &env, &mentions).await;

        let bob_notification = bob_task.await.unwrap();
        let carol_notification = carol_task.await.unwrap();
        assert_eq!(bob_notification.kind, NotificationKind::Mention);
        assert_eq!(carol_notification.kind, NotificationKind::Mention);
    }

    #[tokio::test]
    async fn user_mention_targets_only_the_mentioned_user() {
        let hub = test_hub().await;
        let channel = hub.db.channels().create("c1", Some("w1"), ChannelKind::Public).await.unwrap();

        let env = envelope("c1", "alice", None, None);
        let mentions = vec![MentionPayload {
            mention_type: MentionType::User,
            mentioned_user_id: Some("bob".to_string()),
        }];

        let hub2 = hub.clone();
        let sub_task = tokio::spawn(async move { recv_one(&hub2, "bob").await });
        tokio::time::sleep(Duration::from_millis(10)).await;
        dispatch_mentions(&hub, &channel, &env, &mentions).await;

        let task = sub_task.await.unwrap();
        assert_eq!(task.recipient_id, "bob");
        assert_eq!(task.mention_type, Some(MentionType::User));
    }

    #[tokio::test]
    async fn self_mention_is_ignored() {
        let hub = test_hub().await;
        let channel = hub.db.channels().create("c1", Some("w1"), ChannelKind::Public).await.unwrap();

        let env = envelope("c1", "alice", None, None);
        let mentions = vec![MentionPayload {
            mention_type: MentionType::User,
            mentioned_user_id: Some("alice".to_string()),
        }];

        let mut sub = hub.bus.subscribe(&Topic::Notify("alice".to_string())).await.unwrap();
        dispatch_mentions(&hub, &channel, &env, &mentions).await;

        let result = tokio::time::timeout(Duration::from_millis(50), sub.recv::<NotificationTask>()).await;
        assert!(result.is_err(), "mentioning yourself must not notify yourself");
    }
}
