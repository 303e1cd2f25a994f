use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::models::{GroupRole, UserIdentity};

/// Group membership and roles, owned by the group service.
#[async_trait]
pub trait GroupRoster: Send + Sync {
    async fn members_of(&self, group_id: Uuid) -> anyhow::Result<Vec<Uuid>>;
    async fn role_of(&self, group_id: Uuid, user_id: Uuid) -> anyhow::Result<Option<GroupRole>>;
}

/// User identity resolution, owned by the user service.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn resolve(&self, user_id: Uuid) -> anyhow::Result<Option<UserIdentity>>;
}

/// Live delivery channel to connected sessions.
///
/// Implementations must be best-effort and non-blocking: a dead or slow
/// session is dropped from the fan-out set, it never stalls the sender. The
/// dispatcher completes all counter and index mutation before calling in
/// here.
pub trait SessionRegistry: Send + Sync {
    fn push_to_user(&self, user_id: Uuid, event: &str, payload: &serde_json::Value)
        -> anyhow::Result<()>;
    fn broadcast_to_group(
        &self,
        group_id: Uuid,
        event: &str,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()>;
}

// --- In-memory implementations (tests and local development) ---

#[derive(Default)]
pub struct MemoryRoster {
    groups: DashMap<Uuid, HashMap<Uuid, GroupRole>>,
}

impl MemoryRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_member(&self, group_id: Uuid, user_id: Uuid, role: GroupRole) {
        self.groups.entry(group_id).or_default().insert(user_id, role);
    }

    pub fn remove_member(&self, group_id: Uuid, user_id: Uuid) {
        if let Some(mut members) = self.groups.get_mut(&group_id) {
            members.remove(&user_id);
        }
    }
}

#[async_trait]
impl GroupRoster for MemoryRoster {
    async fn members_of(&self, group_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
        Ok(self
            .groups
            .get(&group_id)
            .map(|members| members.keys().copied().collect())
            .unwrap_or_default())
    }

    async fn role_of(&self, group_id: Uuid, user_id: Uuid) -> anyhow::Result<Option<GroupRole>> {
        Ok(self
            .groups
            .get(&group_id)
            .and_then(|members| members.get(&user_id).copied()))
    }
}

#[derive(Default)]
pub struct MemoryDirectory {
    users: DashMap<Uuid, UserIdentity>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, identity: UserIdentity) {
        self.users.insert(identity.user_id, identity);
    }
}

#[async_trait]
impl UserDirectory for MemoryDirectory {
    async fn resolve(&self, user_id: Uuid) -> anyhow::Result<Option<UserIdentity>> {
        Ok(self.users.get(&user_id).map(|u| u.clone()))
    }
}

/// One delivered live event, as a connected client would see it.
#[derive(Debug, Clone)]
pub struct PushedEvent {
    pub event: String,
    pub payload: serde_json::Value,
}

/// Channel-backed session registry. Each `connect` call models one device
/// session; dropping the receiver models a disconnect, and the next push
/// prunes the dead channel.
#[derive(Default)]
pub struct MemorySessions {
    sessions: DashMap<Uuid, Vec<mpsc::UnboundedSender<PushedEvent>>>,
    group_rooms: DashMap<Uuid, HashSet<Uuid>>,
}

impl MemorySessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&self, user_id: Uuid) -> mpsc::UnboundedReceiver<PushedEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.sessions.entry(user_id).or_default().push(tx);
        rx
    }

    /// Subscribes the user's sessions to the group broadcast room.
    pub fn join_group(&self, group_id: Uuid, user_id: Uuid) {
        self.group_rooms.entry(group_id).or_default().insert(user_id);
    }

    pub fn leave_group(&self, group_id: Uuid, user_id: Uuid) {
        if let Some(mut room) = self.group_rooms.get_mut(&group_id) {
            room.remove(&user_id);
        }
    }

    pub fn live_session_count(&self, user_id: Uuid) -> usize {
        self.sessions
            .get(&user_id)
            .map(|s| s.iter().filter(|tx| !tx.is_closed()).count())
            .unwrap_or(0)
    }
}

impl SessionRegistry for MemorySessions {
    fn push_to_user(
        &self,
        user_id: Uuid,
        event: &str,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()> {
        if let Some(mut senders) = self.sessions.get_mut(&user_id) {
            senders.retain(|tx| {
                tx.send(PushedEvent {
                    event: event.to_string(),
                    payload: payload.clone(),
                })
                .is_ok()
            });
        }
        Ok(())
    }

    fn broadcast_to_group(
        &self,
        group_id: Uuid,
        event: &str,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()> {
        let subscribers: Vec<Uuid> = self
            .group_rooms
            .get(&group_id)
            .map(|room| room.iter().copied().collect())
            .unwrap_or_default();

        for user_id in subscribers {
            self.push_to_user(user_id, event, payload)?;
        }
        Ok(())
    }
}
