//! WorkspaceBroadcaster: fans membership and presence events to every
//! workspace room a user belongs to. Online devices hear these live;
//! offline devices are expected to discover the same facts (who's in a
//! channel, who's online) the next time they sync the affected resource —
//! this component never persists a per-user event queue for them.

use crate::bus::{BusExt, Topic};
use crate::state::Hub;
use im_proto::OutboundFrame;
use tracing::warn;

pub struct WorkspaceBroadcaster<'a> {
    hub: &'a Hub,
}

impl<'a> WorkspaceBroadcaster<'a> {
    pub fn new(hub: &'a Hub) -> Self {
        Self { hub }
    }

    /// Call once a socket has just been registered. If it is the user's
    /// only live session, this is the online transition: publish
    /// `presence.online` to every workspace they belong to, exactly once.
    pub async fn announce_online_if_first_session(&self, user_id: &str) {
        if self.hub.sessions.socket_count_for_user(user_id) != 1 {
            return;
        }

        let workspaces = match self.hub.db.channels().workspaces_for_user(user_id).await {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, user_id, "failed to load workspaces for online transition");
                return;
            }
        };

        for workspace_id in workspaces {
            let frame = OutboundFrame::PresenceOnline {
                user_id: user_id.to_string(),
                workspace_id: workspace_id.clone(),
            };
            if let Err(e) = self.hub.bus.publish(&Topic::Workspace(workspace_id.clone()), &frame).await {
                warn!(error = %e, workspace_id, "failed to publish presence-online event");
            }
        }
    }

    /// Call after a socket has been unregistered. If the user now has no
    /// live session anywhere, publish `presence.offline` to every
    /// workspace they belong to, exactly once. Mirrors the zombie
    /// sweeper's offline path for a graceful disconnect.
    pub async fn announce_offline_if_last_session(&self, user_id: &str) {
        if self.hub.sessions.is_online(user_id) {
            return;
        }

        let workspaces = match self.hub.db.channels().workspaces_for_user(user_id).await {
            Ok(w) => w,
            Err(e) => {
                warn!(error = %e, user_id, "failed to load workspaces for offline transition");
                return;
            }
        };

        for workspace_id in workspaces {
            let frame = OutboundFrame::PresenceOffline {
                user_id: user_id.to_string(),
                workspace_id: workspace_id.clone(),
            };
            if let Err(e) = self.hub.bus.publish(&Topic::Workspace(workspace_id.clone()), &frame).await {
                warn!(error = %e, workspace_id, "failed to publish presence-offline event");
            }
        }
    }

    /// A user was just added to `channel_id`. Push `channel.created`
    /// straight to any of their sockets that are online right now so they
    /// don't have to wait for a reconnect to discover the new room; an
    /// offline member sees it the next time they sync and list their
    /// channels, which is outside this pipeline's scope. This intentionally
    /// does not persist a `member_joined` event for offline delivery,
    /// mirroring the source system's choice to let clients rediscover
    /// membership via sync instead.
    pub async fn notify_member_added(&self, channel_id: &str, user_id: &str) {
        if !self.hub.sessions.is_online(user_id) {
            return;
        }

        let frame = OutboundFrame::ChannelCreated {
            channel_id: channel_id.to_string(),
        };
        if let Err(e) = self.hub.bus.publish(&Topic::Notify(user_id.to_string()), &frame).await {
            warn!(error = %e, user_id, channel_id, "failed to publish channel.created notification");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::LocalBus;
    use crate::config::Config;
    use crate::db::Database;
    use crate::kv::Kv;
    use crate::model::{ChannelKind, MemberRole};
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
    async fn announces_online_exactly_once_for_first_session() {
        let hub = test_hub().await;
        hub.db.channels().create("c1", Some("w1"), ChannelKind::Public).await.unwrap();
        hub.db.channels().add_member("c1", "u1", MemberRole::Member).await.unwrap();

        let mut sub = hub.bus.subscribe(&Topic::Workspace("w1".to_string())).await.unwrap();

        hub.sessions.register(crate::model::DeviceSession {
            user_id: "u1".to_string(),
            socket_id: "s1".to_string(),
            gateway_node_id: "node-1".to_string(),
            platform: "test".to_string(),
            device_id: None,
            login_time: chrono::Utc::now(),
            last_active_time: chrono::Utc::now(),
            expires_at: std::time::Instant::now() + std::time::Duration::from_secs(60),
        });

        WorkspaceBroadcaster::new(&hub).announce_online_if_first_session("u1").await;

        let frame: OutboundFrame = sub.recv().await.unwrap();
        assert!(matches!(frame, OutboundFrame::PresenceOnline { .. }));

        // A second device connecting must not re-announce.
        hub.sessions.register(crate::model::DeviceSession {
            user_id: "u1".to_string(),
            socket_id: "s2".to_string(),
            gateway_node_id: "node-1".to_string(),
            platform: "test".to_string(),
            device_id: None,
            login_time: chrono::Utc::now(),
            last_active_time: chrono::Utc::now(),
            expires_at: std::time::Instant::now() + std::time::Duration::from_secs(60),
        });
        WorkspaceBroadcaster::new(&hub).announce_online_if_first_session("u1").await;

        let second = tokio::time::timeout(std::time::Duration::from_millis(50), sub.recv::<OutboundFrame>()).await;
        assert!(second.is_err(), "no second presence.online should be published");
    }
}
