//! Heartbeat renewal and the zombie-session sweeper: a dead gateway
//! connection (crashed process, dropped TCP, no clean close frame) is
//! reclaimed once its TTL lapses rather than lingering forever.

use crate::bus::{Bus, BusExt, Topic};
use crate::state::Hub;
use im_proto::OutboundFrame;
use std::time::Duration;
use tracing::{info, warn};

/// Renew a socket's TTL on every inbound heartbeat/ping frame.
pub fn renew(hub: &Hub, socket_id: &str) {
    hub.sessions.touch(socket_id, hub.config.heartbeat.session_ttl());
}

/// Background task: periodically sweep sessions whose TTL has elapsed,
/// unregister them, and — for any user whose last session just dropped —
/// publish a presence-offline event to every workspace that user belongs
/// to, so other nodes' workspace broadcasters can relay it.
pub async fn run_zombie_sweeper(hub: Hub) {
    let mut interval = tokio::time::interval(Duration::from_secs(hub.config.heartbeat.sweep_interval_secs));

    loop {
        interval.tick().await;
        sweep_once(&hub).await;
    }
}

async fn sweep_once(hub: &Hub) {
    let expired = hub.sessions.expired();
    if expired.is_empty() {
        return;
    }

    for session in expired {
        warn!(
            socket_id = %session.socket_id,
            user_id = %session.user_id,
            node = %session.gateway_node_id,
            "reclaiming zombie session"
        );
        hub.sessions.unregister(&session.socket_id);

        if hub.sessions.is_online(&session.user_id) {
            continue;
        }

        let workspaces = match hub.db.channels().workspaces_for_user(&session.user_id).await {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, user_id = %session.user_id, "failed to load workspaces for offline transition");
                continue;
            }
        };

        for workspace_id in workspaces {
            let frame = OutboundFrame::PresenceOffline {
                user_id: session.user_id.clone(),
                workspace_id: workspace_id.clone(),
            };
            if let Err(e) = hub.bus.publish(&Topic::Workspace(workspace_id.clone()), &frame).await {
                warn!(error = %e, workspace_id, "failed to publish presence-offline event");
            }
        }

        info!(user_id = %session.user_id, "user transitioned to offline via zombie sweep");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::config::Config;
    use crate::db::Database;
    use crate::kv::Kv;
    use crate::model::{ChannelKind, DeviceSession, MemberRole};
    use chrono::Utc;
    use std::sync::Arc;
    use std::time::Instant;

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

    #[tokio::test]
    async fn zombie_sweep_reclaims_expired_session_and_marks_offline() {
        let db = Database::new(":memory:").await.unwrap();
        db.channels().create("c1", Some("w1"), ChannelKind::Public).await.unwrap();
        db.channels().add_member("c1", "u1", MemberRole::Member).await.unwrap();

        let kv = Kv::new("redis://127.0.0.1:0", Default::default()).unwrap();
        let bus: Arc<dyn Bus> = Arc::new(LocalBus::new());
        let hub = Hub::new(Arc::new(test_config()), db, kv, bus);

        let session = DeviceSession {
            user_id: "u1".to_string(),
            socket_id: "s1".to_string(),
            gateway_node_id: "node-1".to_string(),
            platform: "test".to_string(),
            device_id: None,
            login_time: Utc::now(),
            last_active_time: Utc::now(),
            expires_at: Instant::now(),
        };
        hub.sessions.register(session);

        std::thread::sleep(Duration::from_millis(5));
        sweep_once(&hub).await;

        assert!(!hub.sessions.is_online("u1"));
    }
}
