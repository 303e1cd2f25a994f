use std::collections::HashSet;
use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::collab::{GroupRoster, SessionRegistry, UserDirectory};
use crate::conversations::ConversationIndex;
use crate::error::{EngineError, EngineResult};
use crate::mentions::MentionIndex;
use crate::models::{ContentKind, ConversationKind, Message, NewMessage};
use crate::recall::{can_recall, within_recall_window, RecallOutcome};
use crate::receipts::ReceiptTracker;
use crate::store::MessageStore;
use crate::sync::SyncTracker;

/// Live push event names, shared by the socket layer and its clients.
pub mod push_events {
    pub const PRIVATE_MESSAGE: &str = "private.message";
    pub const GROUP_MESSAGE: &str = "group.message";
    pub const MENTION: &str = "mention";
    pub const MESSAGE_RECALLED: &str = "message.recalled";
    pub const READ_RECEIPT: &str = "message.read";
}

/// Orchestrates a send: append to the store, update every projection, then
/// push to live sessions.
///
/// The append is the durability boundary. Everything after it is an
/// at-least-once, idempotent side effect: a failed projection update or
/// live push is logged and swallowed, and the recipient reconciles through
/// device sync replay. All index and counter mutation completes before any
/// push I/O starts.
pub struct Dispatcher {
    store: Arc<MessageStore>,
    conversations: Arc<ConversationIndex>,
    receipts: Arc<ReceiptTracker>,
    mentions: Arc<MentionIndex>,
    sync: Arc<SyncTracker>,
    roster: Arc<dyn GroupRoster>,
    directory: Arc<dyn UserDirectory>,
    sessions: Arc<dyn SessionRegistry>,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<MessageStore>,
        conversations: Arc<ConversationIndex>,
        receipts: Arc<ReceiptTracker>,
        mentions: Arc<MentionIndex>,
        sync: Arc<SyncTracker>,
        roster: Arc<dyn GroupRoster>,
        directory: Arc<dyn UserDirectory>,
        sessions: Arc<dyn SessionRegistry>,
    ) -> Self {
        Self {
            store,
            conversations,
            receipts,
            mentions,
            sync,
            roster,
            directory,
            sessions,
        }
    }

    pub async fn send_private(
        &self,
        sender_id: Uuid,
        target_id: Uuid,
        content_kind: ContentKind,
        content: String,
        extra: Option<serde_json::Value>,
    ) -> EngineResult<Message> {
        if content.trim().is_empty() {
            return Err(EngineError::Validation(
                "message content is required".to_string(),
            ));
        }
        if sender_id == target_id {
            return Err(EngineError::Validation(
                "cannot send a private message to yourself".to_string(),
            ));
        }

        let message = self.store.append(NewMessage {
            kind: ConversationKind::Private,
            sender_id,
            target_id,
            content_kind,
            content,
            extra,
        })?;

        // Projections for both sides; each side is independently best-effort.
        for (owner, peer) in [(sender_id, target_id), (target_id, sender_id)] {
            let entry = self
                .conversations
                .upsert(owner, ConversationKind::Private, peer);
            self.project(owner, ConversationKind::Private, peer, &message);
            if owner == target_id && !entry.muted {
                self.bump(owner, ConversationKind::Private, peer);
            }
            self.sync.record(owner, message.id);
        }
        self.receipts.create_unread(message.id, target_id);

        let payload = Self::message_payload(&message);
        self.push_user(target_id, push_events::PRIVATE_MESSAGE, &payload);
        // Delivery confirmation echo to the sender's own sessions.
        self.push_user(sender_id, push_events::PRIVATE_MESSAGE, &payload);

        Ok(message)
    }

    pub async fn send_group(
        &self,
        sender_id: Uuid,
        group_id: Uuid,
        content_kind: ContentKind,
        content: String,
        extra: Option<serde_json::Value>,
        mentioned_user_ids: &[Uuid],
    ) -> EngineResult<Message> {
        if content.trim().is_empty() {
            return Err(EngineError::Validation(
                "message content is required".to_string(),
            ));
        }

        let members = self
            .roster
            .members_of(group_id)
            .await
            .map_err(EngineError::Collaborator)?;
        if !members.contains(&sender_id) {
            return Err(EngineError::PermissionDenied("not a group member"));
        }

        let message = self.store.append(NewMessage {
            kind: ConversationKind::Group,
            sender_id,
            target_id: group_id,
            content_kind,
            content,
            extra,
        })?;

        let mut recipients = Vec::with_capacity(members.len().saturating_sub(1));
        for &member in &members {
            let entry = self
                .conversations
                .upsert(member, ConversationKind::Group, group_id);
            self.project(member, ConversationKind::Group, group_id, &message);
            if member != sender_id {
                if !entry.muted {
                    self.bump(member, ConversationKind::Group, group_id);
                }
                recipients.push(member);
            }
            self.sync.record(member, message.id);
        }
        self.receipts.create_unread_many(message.id, &recipients);

        let member_set: HashSet<Uuid> = members.iter().copied().collect();
        let mentioned: Vec<Uuid> = mentioned_user_ids
            .iter()
            .copied()
            .filter(|id| member_set.contains(id))
            .collect();
        for &user_id in &mentioned {
            self.mentions.record(group_id, user_id, message.id);
        }

        // Dual delivery: room broadcast for subscribed clients plus a
        // directed push per member, identical payloads so clients
        // de-duplicate by message id.
        let payload = Self::message_payload(&message);
        if let Err(e) = self
            .sessions
            .broadcast_to_group(group_id, push_events::GROUP_MESSAGE, &payload)
        {
            tracing::warn!(group_id = %group_id, error = %e, "group broadcast failed");
        }
        for &member in &members {
            self.push_user(member, push_events::GROUP_MESSAGE, &payload);
        }

        if !mentioned.is_empty() {
            let sender_name = self.display_name(sender_id).await;
            let mention_payload = serde_json::json!({
                "message": &message,
                "group_id": group_id,
                "sender": sender_name,
            });
            for &user_id in &mentioned {
                self.push_user(user_id, push_events::MENTION, &mention_payload);
            }
        }

        Ok(message)
    }

    /// Gated in-place mutation of already-delivered history.
    pub async fn recall_message(
        &self,
        operator_id: Uuid,
        message_id: u64,
    ) -> EngineResult<RecallOutcome> {
        let message = self
            .store
            .get(message_id)
            .ok_or(EngineError::NotFound("message"))?;

        if message.recalled {
            return Ok(RecallOutcome::AlreadyRecalled);
        }

        match message.kind {
            ConversationKind::Private => {
                if message.sender_id != operator_id {
                    return Err(EngineError::PermissionDenied(
                        "only the sender may recall a private message",
                    ));
                }
            }
            ConversationKind::Group => {
                let role = self
                    .roster
                    .role_of(message.target_id, operator_id)
                    .await
                    .map_err(EngineError::Collaborator)?
                    .ok_or(EngineError::PermissionDenied("not a group member"))?;
                let is_self = message.sender_id == operator_id;
                let within = within_recall_window(message.sent_at, Utc::now());
                if !can_recall(role, is_self, within) {
                    return Err(EngineError::PermissionDenied(
                        "recall window expired or insufficient role",
                    ));
                }
            }
        }

        self.store.set_recalled(message_id)?;

        // The recall notice travels to the same targets the original
        // message reached.
        let notice = serde_json::json!({
            "message_id": message_id,
            "kind": message.kind,
            "target_id": message.target_id,
            "operator_id": operator_id,
        });
        match message.kind {
            ConversationKind::Private => {
                self.push_user(message.target_id, push_events::MESSAGE_RECALLED, &notice);
                self.push_user(message.sender_id, push_events::MESSAGE_RECALLED, &notice);
            }
            ConversationKind::Group => {
                if let Err(e) = self.sessions.broadcast_to_group(
                    message.target_id,
                    push_events::MESSAGE_RECALLED,
                    &notice,
                ) {
                    tracing::warn!(group_id = %message.target_id, error = %e, "recall broadcast failed");
                }
                match self.roster.members_of(message.target_id).await {
                    Ok(members) => {
                        for member in members {
                            self.push_user(member, push_events::MESSAGE_RECALLED, &notice);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(
                            group_id = %message.target_id,
                            error = %e,
                            "roster unavailable, directed recall notices skipped"
                        );
                    }
                }
            }
        }

        Ok(RecallOutcome::Recalled)
    }

    /// Soft delete, sender only. Deleting an already-deleted message is a
    /// no-op success.
    pub fn delete_message(&self, operator_id: Uuid, message_id: u64) -> EngineResult<()> {
        let message = self
            .store
            .get(message_id)
            .ok_or(EngineError::NotFound("message"))?;

        if message.sender_id != operator_id {
            return Err(EngineError::PermissionDenied(
                "only the sender may delete a message",
            ));
        }

        self.store.set_deleted(message_id)
    }

    /// Flips the reader's receipt and notifies the original sender's live
    /// sessions — only the sender, never a broadcast.
    pub fn mark_read(&self, reader_id: Uuid, message_id: u64) -> EngineResult<()> {
        let message = self
            .store
            .get(message_id)
            .ok_or(EngineError::NotFound("message"))?;

        let changed = self.receipts.mark_read(message_id, reader_id)?;
        if changed {
            let notice = serde_json::json!({
                "message_id": message_id,
                "reader_id": reader_id,
                "read_at": Utc::now(),
            });
            self.push_user(message.sender_id, push_events::READ_RECEIPT, &notice);
        }
        Ok(())
    }

    // --- helpers ---

    fn project(&self, owner: Uuid, kind: ConversationKind, target: Uuid, message: &Message) {
        if let Err(e) =
            self.conversations
                .set_last_message(owner, kind, target, message.id, message.sent_at)
        {
            tracing::warn!(
                owner = %owner,
                message_id = message.id,
                error = %e,
                "projection update failed"
            );
        }
    }

    fn bump(&self, owner: Uuid, kind: ConversationKind, target: Uuid) {
        if let Err(e) = self.conversations.bump_unread(owner, kind, target, 1) {
            tracing::warn!(owner = %owner, error = %e, "unread bump failed");
        }
    }

    fn push_user(&self, user_id: Uuid, event: &str, payload: &serde_json::Value) {
        if let Err(e) = self.sessions.push_to_user(user_id, event, payload) {
            tracing::warn!(user_id = %user_id, event = %event, error = %e, "live push failed");
        }
    }

    async fn display_name(&self, user_id: Uuid) -> String {
        match self.directory.resolve(user_id).await {
            Ok(Some(identity)) => identity.display_name,
            Ok(None) => user_id.to_string(),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "directory resolve failed");
                user_id.to_string()
            }
        }
    }

    fn message_payload(message: &Message) -> serde_json::Value {
        serde_json::json!({ "message": message })
    }
}
