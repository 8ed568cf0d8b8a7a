//! Per-socket lifecycle: `connecting -> authenticated -> active <-> draining
//! -> closed`. `closed` always releases the session row, on every exit path.

use super::dispatch;
use crate::auth;
use crate::bus::{Bus, BusExt, Topic};
use crate::model::DeviceSession;
use crate::state::Hub;
use crate::workspace::WorkspaceBroadcaster;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use im_proto::OutboundFrame;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tracing::{info, warn};

/// Everything a running connection needs beyond the shared [`Hub`]: its
/// identity and the set of live room/workspace bus forwarders it owns.
/// Forwarders are plain tasks that subscribe to one bus topic and relay
/// frames into this socket's outbound channel via the session registry;
/// they are aborted as a group when the socket closes.
pub struct ConnectionState {
    pub hub: Hub,
    pub socket_id: String,
    pub user_id: String,
    room_handles: HashMap<String, JoinHandle<()>>,
    workspace_handles: HashMap<String, JoinHandle<()>>,
}

impl ConnectionState {
    pub fn join_room(&mut self, channel_id: &str) {
        if self.room_handles.contains_key(channel_id) {
            return;
        }
        self.hub.sessions.join_room(channel_id, &self.socket_id);
        let handle = spawn_forwarder(&self.hub, &self.socket_id, Topic::Room(channel_id.to_string()));
        self.room_handles.insert(channel_id.to_string(), handle);
    }

    pub fn leave_room(&mut self, channel_id: &str) {
        self.hub.sessions.leave_room(channel_id, &self.socket_id);
        if let Some(handle) = self.room_handles.remove(channel_id) {
            handle.abort();
        }
    }

    pub fn join_workspace(&mut self, workspace_id: &str) {
        if self.workspace_handles.contains_key(workspace_id) {
            return;
        }
        self.hub.sessions.join_workspace(workspace_id, &self.socket_id);
        let handle = spawn_forwarder(&self.hub, &self.socket_id, Topic::Workspace(workspace_id.to_string()));
        self.workspace_handles.insert(workspace_id.to_string(), handle);
    }

    fn teardown(&mut self) {
        for (_, handle) in self.room_handles.drain() {
            handle.abort();
        }
        for (_, handle) in self.workspace_handles.drain() {
            handle.abort();
        }
    }
}

#[cfg(test)]
impl ConnectionState {
    pub(crate) fn for_test(hub: Hub, socket_id: String, user_id: String) -> Self {
        Self {
            hub,
            socket_id,
            user_id,
            room_handles: HashMap::new(),
            workspace_handles: HashMap::new(),
        }
    }

    pub(crate) fn room_count(&self) -> usize {
        self.room_handles.len()
    }

    pub(crate) fn workspace_count(&self) -> usize {
        self.workspace_handles.len()
    }
}

fn spawn_forwarder(hub: &Hub, socket_id: &str, topic: Topic) -> JoinHandle<()> {
    let hub = hub.clone();
    let socket_id = socket_id.to_string();
    tokio::spawn(async move {
        let mut sub = match hub.bus.subscribe(&topic).await {
            Ok(sub) => sub,
            Err(e) => {
                warn!(error = %e, "failed to subscribe to bus topic for forwarder");
                return;
            }
        };
        while let Some(frame) = sub.recv::<OutboundFrame>().await {
            hub.sessions.send_to_socket(&socket_id, frame);
        }
    })
}

/// Runs one WebSocket connection end to end: upgrade, authenticate, join
/// rooms, pump frames, and clean up on the way out regardless of how it
/// ends.
pub async fn run(hub: Hub, stream: TcpStream, addr: SocketAddr) -> anyhow::Result<()> {
    let header_token: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let captured = header_token.clone();
    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if let Some(value) = req.headers().get("authorization")
            && let Ok(s) = value.to_str()
        {
            *captured.lock().unwrap() = Some(s.to_string());
        }
        Ok(resp)
    };

    let ws_stream = tokio_tungstenite::accept_hdr_async(stream, callback).await?;
    let (mut sink, mut incoming) = ws_stream.split();

    let header_token = header_token.lock().unwrap().clone();
    let user_id = match authenticate(&hub, header_token, &mut incoming).await {
        Ok(user_id) => user_id,
        Err(auth_err) => {
            crate::metrics::AUTH_FAILURES.inc();
            let frame = auth_err.to_frame();
            let _ = sink.send(WsMessage::Text(frame.to_json()?.into())).await;
            return Ok(());
        }
    };

    let socket_id = uuid::Uuid::new_v4().to_string();
    info!(%addr, user_id, socket_id, "socket authenticated");

    let session = DeviceSession {
        user_id: user_id.clone(),
        socket_id: socket_id.clone(),
        gateway_node_id: hub.config.server.node_id.clone(),
        platform: "unknown".to_string(),
        device_id: None,
        login_time: Utc::now(),
        last_active_time: Utc::now(),
        expires_at: Instant::now() + hub.config.heartbeat.session_ttl(),
    };
    let mut outbound_rx = hub.sessions.register(session);
    crate::metrics::CONNECTED_SESSIONS.inc();

    let write_hub = hub.clone();
    let write_socket_id = socket_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            let json = match frame.to_json() {
                Ok(j) => j,
                Err(e) => {
                    warn!(error = %e, "failed to serialize outbound frame");
                    continue;
                }
            };
            if sink.send(WsMessage::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = write_socket_id;
        let _ = write_hub;
    });

    let mut state = ConnectionState {
        hub: hub.clone(),
        socket_id: socket_id.clone(),
        user_id: user_id.clone(),
        room_handles: HashMap::new(),
        workspace_handles: HashMap::new(),
    };

    let notify_handle = spawn_forwarder(&hub, &socket_id, Topic::Notify(user_id.clone()));

    hub.sessions.send_to_socket(&socket_id, OutboundFrame::AuthOk { user_id: user_id.clone() });
    WorkspaceBroadcaster::new(&hub).announce_online_if_first_session(&user_id).await;

    for channel_id in hub.db.channels().channels_for_user(&user_id).await.unwrap_or_default() {
        state.join_room(&channel_id);
    }
    for workspace_id in hub.db.channels().workspaces_for_user(&user_id).await.unwrap_or_default() {
        state.join_workspace(&workspace_id);
    }

    while let Some(msg) = incoming.next().await {
        let text = match msg {
            Ok(WsMessage::Text(text)) => text,
            Ok(WsMessage::Ping(_)) | Ok(WsMessage::Pong(_)) => continue,
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                warn!(error = %e, socket_id, "socket read error");
                break;
            }
        };

        dispatch::handle_text(&mut state, &text).await;
    }

    notify_handle.abort();
    state.teardown();
    hub.sessions.unregister(&socket_id);
    crate::metrics::CONNECTED_SESSIONS.dec();
    writer.abort();

    WorkspaceBroadcaster::new(&hub).announce_offline_if_last_session(&user_id).await;
    info!(%addr, user_id, socket_id, "socket closed");

    Ok(())
}

/// Resolve the authenticated user id from a header captured during the
/// WebSocket handshake, falling back to the first inbound frame carrying
/// `{"token": "..."}` when no header was present.
async fn authenticate(
    hub: &Hub,
    header_token: Option<String>,
    incoming: &mut (impl StreamExt<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin),
) -> Result<String, crate::error::AuthError> {
    use crate::error::AuthError;

    if let Some(token) = header_token {
        return auth::verify_token(&hub.config.server.auth_secret, &token);
    }

    let first = incoming.next().await.ok_or(AuthError::MissingToken)?;
    let text = match first {
        Ok(WsMessage::Text(text)) => text,
        _ => return Err(AuthError::MissingToken),
    };
    let token = auth::extract_from_first_frame(&text).ok_or(AuthError::MissingToken)?;
    auth::verify_token(&hub.config.server.auth_secret, token)
}
