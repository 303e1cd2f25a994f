use anyhow::Context;
use socketioxide::SocketIo;
use uuid::Uuid;

use crate::collab::SessionRegistry;

/// Session registry backed by Socket.IO rooms.
///
/// Every authenticated socket joins `user:{id}` on connect; group room
/// membership is managed by the `group.join` / `group.leave` handlers.
/// Emitting to a room with no subscribers is a successful no-op, which is
/// exactly the best-effort contract the dispatcher expects.
pub struct SocketSessions {
    io: SocketIo,
}

impl SocketSessions {
    pub fn new(io: SocketIo) -> Self {
        Self { io }
    }
}

impl SessionRegistry for SocketSessions {
    fn push_to_user(
        &self,
        user_id: Uuid,
        event: &str,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()> {
        self.io
            .to(format!("user:{user_id}"))
            .emit(event.to_string(), payload)
            .context("socket emit to user room failed")
    }

    fn broadcast_to_group(
        &self,
        group_id: Uuid,
        event: &str,
        payload: &serde_json::Value,
    ) -> anyhow::Result<()> {
        self.io
            .to(format!("group:{group_id}"))
            .emit(event.to_string(), payload)
            .context("socket emit to group room failed")
    }
}
