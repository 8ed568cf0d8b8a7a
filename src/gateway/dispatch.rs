//! Tagged dispatch over every [`InboundFrame`] variant. Each arm owns its
//! own authorization check; there is no shared middleware layer since the
//! checks differ enough per frame type (membership, sender identity,
//! nothing at all) that factoring them out would just be indirection.

use super::connection::ConnectionState;
use crate::bus::{BusExt, Topic};
use crate::error::GatewayError;
use crate::presence;
use crate::router::Router;
use crate::sync::SyncEngine;
use im_proto::{CreateMessageRequest, InboundFrame, OutboundFrame};
use tracing::warn;

pub async fn handle_text(state: &mut ConnectionState, text: &str) {
    let frame: InboundFrame = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            state.hub.sessions.send_to_socket(
                &state.socket_id,
                GatewayError::MalformedFrame(e.to_string()).to_frame(),
            );
            return;
        }
    };

    if let Err(e) = handle(state, frame).await {
        warn!(error = %e, socket_id = %state.socket_id, "frame handling failed");
        state.hub.sessions.send_to_socket(&state.socket_id, e.to_frame());
    }
}

async fn handle(state: &mut ConnectionState, frame: InboundFrame) -> Result<(), GatewayError> {
    match frame {
        InboundFrame::ChannelJoin { channel_id } => handle_channel_join(state, channel_id).await,
        InboundFrame::ChannelLeave { channel_id } => {
            state.leave_room(&channel_id);
            state.hub.sessions.send_to_socket(
                &state.socket_id,
                OutboundFrame::ChannelLeft {
                    channel_id,
                    user_id: state.user_id.clone(),
                },
            );
            Ok(())
        }
        InboundFrame::WorkspaceJoin { workspace_id } => handle_workspace_join(state, workspace_id).await,
        InboundFrame::ReadMark { channel_id, message_id } => handle_read_mark(state, channel_id, message_id).await,
        InboundFrame::TypingStart { channel_id } => handle_typing(state, channel_id, true).await,
        InboundFrame::TypingStop { channel_id } => handle_typing(state, channel_id, false).await,
        InboundFrame::ReactionAdd { message_id, emoji } => handle_reaction(state, message_id, emoji, true).await,
        InboundFrame::ReactionRemove { message_id, emoji } => handle_reaction(state, message_id, emoji, false).await,
        InboundFrame::Ping { timestamp } => {
            presence::renew(&state.hub, &state.socket_id);
            state.hub.sessions.send_to_socket(
                &state.socket_id,
                OutboundFrame::Pong {
                    timestamp,
                    server_time: chrono::Utc::now().timestamp_millis(),
                },
            );
            Ok(())
        }
        // Delivery/read acks are already covered by `read.mark`; this is a
        // liveness signal only.
        InboundFrame::Ack { .. } => Ok(()),
        InboundFrame::MessageCreate(req) => handle_message_create(state, *req).await,
    }
}

async fn handle_channel_join(state: &mut ConnectionState, channel_id: String) -> Result<(), GatewayError> {
    let is_member = state
        .hub
        .db
        .channels()
        .is_active_member(&channel_id, &state.user_id)
        .await
        .map_err(crate::error::RouterError::Db)?;

    if !is_member {
        return Err(GatewayError::NotAMember(channel_id));
    }

    state.join_room(&channel_id);
    state.hub.sessions.send_to_socket(
        &state.socket_id,
        OutboundFrame::ChannelJoined {
            channel_id,
            user_id: state.user_id.clone(),
        },
    );
    Ok(())
}

async fn handle_workspace_join(state: &mut ConnectionState, workspace_id: String) -> Result<(), GatewayError> {
    state.join_workspace(&workspace_id);
    let user_ids = state.hub.sessions.users_in_workspace(&workspace_id);
    state.hub.sessions.send_to_socket(
        &state.socket_id,
        OutboundFrame::WorkspaceMembersList { workspace_id, user_ids },
    );
    Ok(())
}

async fn handle_read_mark(
    state: &mut ConnectionState,
    channel_id: String,
    message_id: im_proto::MsgId,
) -> Result<(), GatewayError> {
    SyncEngine::new(&state.hub)
        .ack(&state.user_id, &channel_id, message_id)
        .await?;

    let frame = OutboundFrame::ReadUpdated {
        channel_id: channel_id.clone(),
        user_id: state.user_id.clone(),
        last_read_message_id: message_id,
    };
    if let Err(e) = state.hub.bus.publish(&Topic::Room(channel_id), &frame).await {
        warn!(error = %e, "failed to publish read.updated");
    }
    Ok(())
}

async fn handle_typing(state: &mut ConnectionState, channel_id: String, is_typing: bool) -> Result<(), GatewayError> {
    let result = if is_typing {
        state.hub.kv.set_typing(&channel_id, &state.user_id).await
    } else {
        state.hub.kv.clear_typing(&channel_id, &state.user_id).await
    };
    if let Err(e) = result {
        warn!(error = %e, "failed to update typing indicator");
    }

    let frame = OutboundFrame::TypingUpdate {
        channel_id: channel_id.clone(),
        user_id: state.user_id.clone(),
        is_typing,
    };
    if let Err(e) = state.hub.bus.publish(&Topic::Room(channel_id), &frame).await {
        warn!(error = %e, "failed to publish typing.update");
    }
    Ok(())
}

/// Reactions are live-only: there is no persisted `Reaction` entity, so a
/// client that was offline when one fired simply never sees it. Anyone can
/// react as long as they can resolve the message's channel and are a
/// member of it.
async fn handle_reaction(
    state: &mut ConnectionState,
    message_id: im_proto::MsgId,
    emoji: String,
    added: bool,
) -> Result<(), GatewayError> {
    let channel_id = state
        .hub
        .db
        .messages()
        .channel_id_of(message_id)
        .await
        .map_err(crate::error::RouterError::Db)?
        .ok_or_else(|| GatewayError::MalformedFrame("unknown message".to_string()))?;

    let is_member = state
        .hub
        .db
        .channels()
        .is_active_member(&channel_id, &state.user_id)
        .await
        .map_err(crate::error::RouterError::Db)?;
    if !is_member {
        return Err(GatewayError::NotAMember(channel_id));
    }

    let frame = if added {
        OutboundFrame::ReactionAdded {
            message_id,
            user_id: state.user_id.clone(),
            emoji,
        }
    } else {
        OutboundFrame::ReactionRemoved {
            message_id,
            user_id: state.user_id.clone(),
            emoji,
        }
    };
    if let Err(e) = state.hub.bus.publish(&Topic::Room(channel_id), &frame).await {
        warn!(error = %e, "failed to publish reaction event");
    }
    Ok(())
}

async fn handle_message_create(state: &mut ConnectionState, req: CreateMessageRequest) -> Result<(), GatewayError> {
    if req.sender_id != state.user_id {
        return Err(GatewayError::MalformedFrame("sender_id does not match authenticated user".to_string()));
    }

    let is_member = state
        .hub
        .db
        .channels()
        .is_active_member(&req.channel_id, &state.user_id)
        .await
        .map_err(crate::error::RouterError::Db)?;
    if !is_member {
        return Err(GatewayError::NotAMember(req.channel_id));
    }

    let result = Router::new(&state.hub).create_message(req).await?;

    state.hub.sessions.send_to_socket(
        &state.socket_id,
        OutboundFrame::AckResponse {
            msg_id: result.msg_id,
            status: result.status.as_str().to_string(),
        },
    );
    Ok(())
}
