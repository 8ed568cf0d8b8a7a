use crate::model::User;
use im_proto::{BotWebhookData, BotWebhookPayload, MessageEnvelope};
use std::time::Duration;

/// POSTs a bot webhook event with a fixed timeout; failures are logged and
/// swallowed by the caller — a missed webhook delivery isn't grounds for
/// the outbox row to stay pending forever.
pub struct WebhookClient {
    client: reqwest::Client,
}

impl WebhookClient {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client builder should not fail with a timeout-only config");
        Self { client }
    }

    pub async fn deliver(&self, bot: &User, envelope: &MessageEnvelope) -> Result<(), reqwest::Error> {
        let Some(url) = bot.webhook_url.as_deref() else {
            return Ok(());
        };

        let payload = BotWebhookPayload {
            event: "message.created".to_string(),
            timestamp: chrono::Utc::now(),
            data: BotWebhookData {
                message_id: envelope.msg_id,
                channel_id: envelope.channel_id.clone(),
                sender_id: envelope.sender_id.clone(),
                content: envelope.content.clone(),
                message_type: envelope.message_type,
                parent_id: envelope.parent_id,
                created_at: envelope.timestamp,
                sender: serde_json::json!({ "id": envelope.sender_id }),
                channel: serde_json::json!({ "id": envelope.channel_id }),
            },
        };

        self.client
            .post(url)
            .header("X-Imcore-Event", "message.created")
            .header("X-Imcore-Bot-Id", bot.id.as_str())
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::UserKind;
    use im_proto::{MessageType, MsgId, SeqId};

    fn bot(id: &str, webhook_url: Option<String>) -> User {
        User {
            id: id.to_string(),
            kind: UserKind::Bot,
            display_name: id.to_string(),
            webhook_url,
            created_at: chrono::Utc::now(),
        }
    }

    fn envelope() -> MessageEnvelope {
        MessageEnvelope {
            msg_id: MsgId::generate(),
            channel_id: "c1".to_string(),
            seq_id: SeqId(1),
            sender_id: "alice".to_string(),
            message_type: MessageType::Text,
            content: "hi".to_string(),
            parent_id: None,
            root_id: None,
            timestamp: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn delivers_event_and_bot_id_headers_on_success() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/hook")
            .match_header("X-Imcore-Event", "message.created")
            .match_header("X-Imcore-Bot-Id", "b1")
            .with_status(200)
            .create_async()
            .await;

        let client = WebhookClient::new(Duration::from_secs(5));
        let bot = bot("b1", Some(format!("{}/hook", server.url())));
        client.deliver(&bot, &envelope()).await.unwrap();

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn server_error_is_surfaced_as_err_but_does_not_panic() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", "/hook").with_status(500).create_async().await;

        let client = WebhookClient::new(Duration::from_secs(5));
        let bot = bot("b1", Some(format!("{}/hook", server.url())));
        let result = client.deliver(&bot, &envelope()).await;

        mock.assert_async().await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn bot_without_webhook_url_is_a_silent_no_op() {
        let client = WebhookClient::new(Duration::from_secs(5));
        let bot = bot("b1", None);
        client.deliver(&bot, &envelope()).await.unwrap();
    }
}
