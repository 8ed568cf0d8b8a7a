//! Unified error hierarchy.
//!
//! Errors are split by the boundary they cross: [`GatewayError`] for
//! frame-level faults on a live socket, [`RouterError`] for message
//! creation, and [`DbError`]/[`KvError`] for the storage layers underneath
//! both. Each has a `to_frame` or HTTP-status mapping so a given fault
//! renders exactly one way to the client.

use im_proto::OutboundFrame;
use thiserror::Error;

/// Faults surfaced while handling a frame on an already-authenticated
/// socket. Authorization and validation errors keep the socket open;
/// nothing here closes the connection on its own.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("not a member of channel {0}")]
    NotAMember(String),
    #[error("unknown channel {0}")]
    UnknownChannel(String),
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
    #[error("content exceeds maximum length")]
    ContentTooLong,
    #[error(transparent)]
    Router(#[from] RouterError),
}

impl GatewayError {
    pub fn to_frame(&self) -> OutboundFrame {
        OutboundFrame::AckResponse {
            msg_id: im_proto::MsgId::generate(),
            status: self.error_code().to_string(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotAMember(_) => "not_a_member",
            Self::UnknownChannel(_) => "unknown_channel",
            Self::MalformedFrame(_) => "malformed_frame",
            Self::ContentTooLong => "content_too_long",
            Self::Router(_) => "router_error",
        }
    }
}

/// Faults from `Router::create_message`, shared by the HTTP and gateway
/// entry points.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("database error: {0}")]
    Db(#[from] DbError),
    #[error("kv error: {0}")]
    Kv(#[from] KvError),
    #[error("content exceeds maximum length")]
    ContentTooLong,
    #[error("parent message not found")]
    ParentNotFound,
    #[error("message not found")]
    MessageNotFound,
    #[error("an offline-pull sync is already in progress for this user")]
    SyncInProgress,
}

impl RouterError {
    /// Maps onto an HTTP status code for the create-message/sync endpoints.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::ContentTooLong | Self::ParentNotFound | Self::MessageNotFound => 400,
            Self::SyncInProgress => 409,
            Self::Db(_) | Self::Kv(_) => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl DbError {
    /// True for a `UNIQUE` constraint violation — the signal the router
    /// uses to resolve a racing duplicate `clientMsgId` insert into the
    /// winner's row instead of surfacing a storage error.
    pub fn is_unique_violation(&self) -> bool {
        use sqlx::error::DatabaseError;
        matches!(
            self,
            DbError::Sqlx(sqlx::Error::Database(e)) if e.kind() == sqlx::error::ErrorKind::UniqueViolation
        )
    }
}

#[derive(Debug, Error)]
pub enum KvError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("pool error: {0}")]
    Pool(#[from] deadpool_redis::PoolError),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Faults from the authentication handshake, surfaced as `auth.err` and a
/// closed socket, or HTTP 401. Never retried.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,
    #[error("invalid token signature")]
    InvalidSignature,
}

impl AuthError {
    pub fn to_frame(&self) -> OutboundFrame {
        OutboundFrame::AuthErr {
            reason: self.to_string(),
        }
    }
}
