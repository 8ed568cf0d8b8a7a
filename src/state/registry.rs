use crate::model::DeviceSession;
use chrono::Utc;
use dashmap::{DashMap, DashSet};
use im_proto::OutboundFrame;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

const OUTBOUND_CHANNEL_CAPACITY: usize = 256;

/// Concurrent, in-memory map from sockets to sessions, from users to their
/// sockets, and from channels to the sockets currently joined to them —
/// the three lookups the gateway and presence sweeper need on every frame.
/// Sharded `DashMap`s stand in for a single global lock.
pub struct SessionRegistry {
    sessions: DashMap<String, DeviceSession>,
    by_user: DashMap<String, DashSet<String>>,
    outbound: DashMap<String, mpsc::Sender<OutboundFrame>>,
    room_members: DashMap<String, DashSet<String>>,
    workspace_members: DashMap<String, DashSet<String>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
            by_user: DashMap::new(),
            outbound: DashMap::new(),
            room_members: DashMap::new(),
            workspace_members: DashMap::new(),
        }
    }

    /// Register a newly-authenticated socket, returning the outbound
    /// receiver the gateway's write task should drain.
    pub fn register(&self, session: DeviceSession) -> mpsc::Receiver<OutboundFrame> {
        let (tx, rx) = mpsc::channel(OUTBOUND_CHANNEL_CAPACITY);
        self.by_user
            .entry(session.user_id.clone())
            .or_default()
            .insert(session.socket_id.clone());
        self.outbound.insert(session.socket_id.clone(), tx);
        self.sessions.insert(session.socket_id.clone(), session);
        rx
    }

    /// Remove a socket entirely: from its user's session set, from every
    /// room it joined, and from the outbound map. Returns the removed
    /// session so the caller can decide whether the user just went offline.
    pub fn unregister(&self, socket_id: &str) -> Option<DeviceSession> {
        self.outbound.remove(socket_id);
        let session = self.sessions.remove(socket_id).map(|(_, s)| s);

        if let Some(session) = &session
            && let Some(sockets) = self.by_user.get(&session.user_id)
        {
            sockets.remove(socket_id);
        }

        for room in self.room_members.iter() {
            room.remove(socket_id);
        }
        for workspace in self.workspace_members.iter() {
            workspace.remove(socket_id);
        }

        session
    }

    pub fn touch(&self, socket_id: &str, ttl: Duration) {
        if let Some(mut session) = self.sessions.get_mut(socket_id) {
            session.last_active_time = Utc::now();
            session.expires_at = Instant::now() + ttl;
        }
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.by_user
            .get(user_id)
            .is_some_and(|sockets| !sockets.is_empty())
    }

    pub fn socket_count_for_user(&self, user_id: &str) -> usize {
        self.by_user.get(user_id).map(|s| s.len()).unwrap_or(0)
    }

    /// This user's sockets that are local to this node.
    pub fn local_socket_ids(&self, user_id: &str) -> Vec<String> {
        self.by_user
            .get(user_id)
            .map(|sockets| sockets.iter().map(|s| s.clone()).collect())
            .unwrap_or_default()
    }

    /// Distinct user ids with a local socket currently joined to `workspace_id`.
    pub fn users_in_workspace(&self, workspace_id: &str) -> Vec<String> {
        let Some(sockets) = self.workspace_members.get(workspace_id) else {
            return Vec::new();
        };
        sockets
            .iter()
            .filter_map(|socket_id| self.sessions.get(socket_id.as_str()).map(|s| s.user_id.clone()))
            .collect()
    }

    pub fn join_room(&self, channel_id: &str, socket_id: &str) {
        self.room_members
            .entry(channel_id.to_string())
            .or_default()
            .insert(socket_id.to_string());
    }

    pub fn leave_room(&self, channel_id: &str, socket_id: &str) {
        if let Some(sockets) = self.room_members.get(channel_id) {
            sockets.remove(socket_id);
        }
    }

    /// Deliver a frame to every local socket of a user; silently drops
    /// sockets whose write task has already exited.
    pub fn send_to_user(&self, user_id: &str, frame: OutboundFrame) {
        let Some(sockets) = self.by_user.get(user_id) else {
            return;
        };
        for socket_id in sockets.iter() {
            self.send_to_socket(&socket_id, frame.clone());
        }
    }

    /// Deliver a frame to every local socket joined to a room.
    pub fn send_to_room(&self, channel_id: &str, frame: OutboundFrame) {
        let Some(sockets) = self.room_members.get(channel_id) else {
            return;
        };
        for socket_id in sockets.iter() {
            self.send_to_socket(&socket_id, frame.clone());
        }
    }

    pub fn join_workspace(&self, workspace_id: &str, socket_id: &str) {
        self.workspace_members
            .entry(workspace_id.to_string())
            .or_default()
            .insert(socket_id.to_string());
    }

    pub fn leave_workspace(&self, workspace_id: &str, socket_id: &str) {
        if let Some(sockets) = self.workspace_members.get(workspace_id) {
            sockets.remove(socket_id);
        }
    }

    /// Deliver a frame to every local socket joined to a workspace.
    pub fn send_to_workspace(&self, workspace_id: &str, frame: OutboundFrame) {
        let Some(sockets) = self.workspace_members.get(workspace_id) else {
            return;
        };
        for socket_id in sockets.iter() {
            self.send_to_socket(&socket_id, frame.clone());
        }
    }

    pub fn send_to_socket(&self, socket_id: &str, frame: OutboundFrame) {
        if let Some(tx) = self.outbound.get(socket_id) {
            let _ = tx.try_send(frame);
        }
    }

    /// Sessions whose TTL has already elapsed, for the zombie sweeper.
    pub fn expired(&self) -> Vec<DeviceSession> {
        let now = Instant::now();
        self.sessions
            .iter()
            .filter(|entry| entry.expires_at <= now)
            .map(|entry| entry.clone())
            .collect()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn session(user_id: &str, socket_id: &str, ttl: Duration) -> DeviceSession {
        DeviceSession {
            user_id: user_id.to_string(),
            socket_id: socket_id.to_string(),
            gateway_node_id: "node-1".to_string(),
            platform: "test".to_string(),
            device_id: None,
            login_time: Utc::now(),
            last_active_time: Utc::now(),
            expires_at: Instant::now() + ttl,
        }
    }

    #[test]
    fn online_iff_at_least_one_active_session() {
        let registry = SessionRegistry::new();
        assert!(!registry.is_online("u1"));

        registry.register(session("u1", "s1", Duration::from_secs(60)));
        assert!(registry.is_online("u1"));

        registry.unregister("s1");
        assert!(!registry.is_online("u1"));
    }

    #[test]
    fn multi_device_presence_survives_single_socket_disconnect() {
        let registry = SessionRegistry::new();
        registry.register(session("u1", "s1", Duration::from_secs(60)));
        registry.register(session("u1", "s2", Duration::from_secs(60)));

        registry.unregister("s1");
        assert!(registry.is_online("u1"), "second device keeps user online");

        registry.unregister("s2");
        assert!(!registry.is_online("u1"));
    }

    #[test]
    fn expired_sessions_are_reported_once_ttl_elapses() {
        let registry = SessionRegistry::new();
        registry.register(session("u1", "s1", Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(5));

        let expired = registry.expired();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].socket_id, "s1");
    }
}
