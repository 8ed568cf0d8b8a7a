//! HTTP surface: message creation, catch-up sync, and the Prometheus
//! metrics endpoint. Runs on its own tokio task, independent of the
//! WebSocket gateway.

use crate::error::RouterError;
use crate::router::Router;
use crate::state::Hub;
use crate::sync::SyncEngine;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router as AxumRouter};
use chrono::{DateTime, Utc};
use im_proto::{CreateMessageRequest, CreateMessageResponse, MessageType, MsgId, SeqId};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

pub async fn run(bind_addr: &str, hub: Hub) {
    let app = AxumRouter::new()
        .route("/metrics", get(metrics_handler))
        .route("/v1/messages", post(create_message))
        .route("/v1/channels/:channel_id/sync", get(sync_channel))
        .route("/v1/channels/:channel_id/read", post(mark_read))
        .with_state(hub);

    let addr: SocketAddr = match bind_addr.parse() {
        Ok(addr) => addr,
        Err(e) => {
            tracing::error!(bind_addr, error = %e, "invalid http bind address");
            return;
        }
    };

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "failed to bind http server");
            return;
        }
    };

    tracing::info!(%addr, "http server listening");
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!(error = %e, "http server error");
    }
}

async fn metrics_handler() -> String {
    crate::metrics::gather_metrics()
}

async fn create_message(
    State(hub): State<Hub>,
    Json(req): Json<CreateMessageRequest>,
) -> Result<Json<CreateMessageResponse>, ApiError> {
    let client_msg_id = req.client_msg_id.clone();
    let result = Router::new(&hub).create_message(req).await?;
    Ok(Json(CreateMessageResponse {
        msg_id: result.msg_id,
        seq_id: result.seq_id,
        client_msg_id,
        status: result.status,
        timestamp: Utc::now(),
    }))
}

#[derive(Debug, Deserialize)]
struct SyncQuery {
    user_id: String,
    since_seq_id: u64,
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct MessageDto {
    msg_id: MsgId,
    channel_id: String,
    sender_id: String,
    seq_id: SeqId,
    #[serde(skip_serializing_if = "Option::is_none")]
    client_msg_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<MsgId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    root_id: Option<MsgId>,
    #[serde(rename = "type")]
    message_type: MessageType,
    content: String,
    created_at: DateTime<Utc>,
}

impl From<crate::model::Message> for MessageDto {
    fn from(m: crate::model::Message) -> Self {
        Self {
            msg_id: m.id,
            channel_id: m.channel_id,
            sender_id: m.sender_id,
            seq_id: m.seq_id,
            client_msg_id: m.client_msg_id,
            parent_id: m.parent_id,
            root_id: m.root_id,
            message_type: m.message_type,
            content: m.content,
            created_at: m.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct SyncResponse {
    messages: Vec<MessageDto>,
    max_seq_id: SeqId,
}

async fn sync_channel(
    State(hub): State<Hub>,
    Path(channel_id): Path<String>,
    Query(query): Query<SyncQuery>,
) -> Result<Json<SyncResponse>, ApiError> {
    let engine = SyncEngine::new(&hub);

    // Two devices (or two gateway nodes) racing the same user's reconnect
    // must not both replay the backlog; the loser is told to back off and
    // rely on the winner's pull plus the live bus for anything after it.
    if !engine.try_start_offline_pull(&query.user_id).await {
        return Err(ApiError(RouterError::SyncInProgress));
    }

    let result = engine.sync_channel(&channel_id, SeqId(query.since_seq_id), query.limit).await;
    engine.finish_offline_pull(&query.user_id).await;
    let page = result?;

    Ok(Json(SyncResponse {
        messages: page.messages.into_iter().map(MessageDto::from).collect(),
        max_seq_id: page.max_seq_id,
    }))
}

#[derive(Debug, Deserialize)]
struct MarkReadRequest {
    user_id: String,
    message_id: MsgId,
}

async fn mark_read(
    State(hub): State<Hub>,
    Path(channel_id): Path<String>,
    Json(req): Json<MarkReadRequest>,
) -> Result<StatusCode, ApiError> {
    SyncEngine::new(&hub).ack(&req.user_id, &channel_id, req.message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

struct ApiError(RouterError);

impl From<RouterError> for ApiError {
    fn from(e: RouterError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(serde_json::json!({ "error": self.0.to_string() }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::config::Config;
    use crate::db::Database;
    use crate::kv::Kv;
    use crate::model::ChannelKind;
    use im_proto::MessageType;
    use std::sync::Arc;

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

    #[tokio::test]
    async fn create_message_persists_and_echoes_client_msg_id() {
        let hub = test_hub().await;
        hub.db.channels().create("c1", None, ChannelKind::Public).await.unwrap();

        let req = CreateMessageRequest {
            channel_id: "c1".to_string(),
            sender_id: "alice".to_string(),
            content: "hello".to_string(),
            message_type: MessageType::Text,
            parent_id: None,
            client_msg_id: None,
            attachments: vec![],
            metadata: None,
        };

        let Json(resp) = create_message(State(hub), Json(req)).await.unwrap();
        assert_eq!(resp.seq_id, SeqId(1));
        assert_eq!(resp.client_msg_id, None);
    }

    #[tokio::test]
    async fn create_message_rejects_content_over_the_limit() {
        let hub = test_hub().await;
        hub.db.channels().create("c1", None, ChannelKind::Public).await.unwrap();

        let req = CreateMessageRequest {
            channel_id: "c1".to_string(),
            sender_id: "alice".to_string(),
            content: "x".repeat(8001),
            message_type: MessageType::Text,
            parent_id: None,
            client_msg_id: None,
            attachments: vec![],
            metadata: None,
        };

        let err = create_message(State(hub), Json(req)).await.unwrap_err();
        assert_eq!(err.0.http_status(), 400);
    }

    #[tokio::test]
    async fn sync_channel_returns_messages_after_the_given_seq_id() {
        let hub = test_hub().await;
        hub.db.channels().create("c1", None, ChannelKind::Public).await.unwrap();

        for _ in 0..3 {
            let req = CreateMessageRequest {
                channel_id: "c1".to_string(),
                sender_id: "alice".to_string(),
                content: "hi".to_string(),
                message_type: MessageType::Text,
                parent_id: None,
                client_msg_id: None,
                attachments: vec![],
                metadata: None,
            };
            Router::new(&hub).create_message(req).await.unwrap();
        }

        let Json(resp) = sync_channel(
            State(hub),
            Path("c1".to_string()),
            Query(SyncQuery { user_id: "bob".to_string(), since_seq_id: 1, limit: None }),
        )
        .await
        .unwrap();

        assert_eq!(resp.messages.len(), 2);
        assert_eq!(resp.max_seq_id, SeqId(3));
        assert!(resp.messages.iter().all(|m| m.seq_id.0 > 1));
    }

    #[tokio::test]
    async fn mark_read_advances_the_read_cursor() {
        let hub = test_hub().await;
        hub.db.channels().create("c1", None, ChannelKind::Public).await.unwrap();

        let req = CreateMessageRequest {
            channel_id: "c1".to_string(),
            sender_id: "alice".to_string(),
            content: "hi".to_string(),
            message_type: MessageType::Text,
            parent_id: None,
            client_msg_id: None,
            attachments: vec![],
            metadata: None,
        };
        let result = Router::new(&hub).create_message(req).await.unwrap();

        let status = mark_read(
            State(hub.clone()),
            Path("c1".to_string()),
            Json(MarkReadRequest { user_id: "bob".to_string(), message_id: result.msg_id }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::NO_CONTENT);
    }
}
