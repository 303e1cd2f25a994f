use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;

use crate::error::{EngineError, EngineResult};
use crate::models::{ConversationKind, Message, NewMessage, Scope};

/// Durable, append-only record of messages, the source of truth for every
/// projection in the engine.
///
/// Ids come from a store-wide monotonic allocator, assigned while holding
/// the scope's log entry so that append order and id order agree within a
/// conversation scope. Independent scopes proceed in parallel; the shard
/// entry is the only sequencing point.
pub struct MessageStore {
    messages: DashMap<u64, Message>,
    scopes: DashMap<Scope, Vec<u64>>,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl Default for MessageStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageStore {
    pub fn new() -> Self {
        Self {
            messages: DashMap::new(),
            scopes: DashMap::new(),
            next_id: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Assigns the next id for the message's scope and persists it.
    ///
    /// Fails with `StoreUnavailable` once the store has been closed for
    /// shutdown; the caller must treat that as a failed send, nothing is
    /// partially written.
    pub fn append(&self, new: NewMessage) -> EngineResult<Message> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EngineError::StoreUnavailable);
        }

        let scope = match new.kind {
            ConversationKind::Private => Scope::private(new.sender_id, new.target_id),
            ConversationKind::Group => Scope::group(new.target_id),
        };

        // Holding the scope entry serializes appends for this conversation.
        let mut log = self.scopes.entry(scope).or_default();
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;

        let message = Message {
            id,
            kind: new.kind,
            sender_id: new.sender_id,
            target_id: new.target_id,
            content_kind: new.content_kind,
            content: new.content,
            extra: new.extra,
            sent_at: Utc::now(),
            recalled: false,
            deleted: false,
        };

        self.messages.insert(id, message.clone());
        log.push(id);

        Ok(message)
    }

    pub fn get(&self, id: u64) -> Option<Message> {
        self.messages.get(&id).map(|m| m.clone())
    }

    /// Single pagination primitive for both private and group history.
    ///
    /// Returns messages strictly older than `before_id` (or the newest
    /// `limit` when absent), descending by id. Soft-deleted messages are
    /// filtered out, so a page may come back short of `limit`.
    pub fn range(&self, scope: Scope, before_id: Option<u64>, limit: usize) -> Vec<Message> {
        let Some(log) = self.scopes.get(&scope) else {
            return Vec::new();
        };

        let cut = match before_id {
            Some(before) => log.partition_point(|&id| id < before),
            None => log.len(),
        };
        let start = cut.saturating_sub(limit);

        log[start..cut]
            .iter()
            .rev()
            .filter_map(|id| self.messages.get(id).map(|m| m.clone()))
            .filter(|m| !m.deleted)
            .collect()
    }

    /// Monotone flag setter; recalling an already-recalled message is a
    /// no-op success.
    pub fn set_recalled(&self, id: u64) -> EngineResult<()> {
        let mut message = self
            .messages
            .get_mut(&id)
            .ok_or(EngineError::NotFound("message"))?;
        message.recalled = true;
        Ok(())
    }

    /// Monotone flag setter; deleting an already-deleted message is a
    /// no-op success.
    pub fn set_deleted(&self, id: u64) -> EngineResult<()> {
        let mut message = self
            .messages
            .get_mut(&id)
            .ok_or(EngineError::NotFound("message"))?;
        message.deleted = true;
        Ok(())
    }

    /// Rejects further appends; reads keep working during drain.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentKind, ConversationKind};
    use uuid::Uuid;

    fn text(sender: Uuid, target: Uuid, kind: ConversationKind, body: &str) -> NewMessage {
        NewMessage {
            kind,
            sender_id: sender,
            target_id: target,
            content_kind: ContentKind::Text,
            content: body.to_string(),
            extra: None,
        }
    }

    #[test]
    fn append_assigns_ascending_ids_within_scope() {
        let store = MessageStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

        let m1 = store
            .append(text(a, b, ConversationKind::Private, "first"))
            .unwrap();
        let m2 = store
            .append(text(b, a, ConversationKind::Private, "second"))
            .unwrap();

        assert!(m1.id < m2.id);
        assert_eq!(m1.scope(), m2.scope());
    }

    #[test]
    fn private_scope_is_direction_independent() {
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        assert_eq!(Scope::private(a, b), Scope::private(b, a));
    }

    #[test]
    fn range_paginates_descending_before_id() {
        let store = MessageStore::new();
        let group = Uuid::new_v4();
        let sender = Uuid::new_v4();

        let ids: Vec<u64> = (0..5)
            .map(|i| {
                store
                    .append(text(sender, group, ConversationKind::Group, &format!("m{i}")))
                    .unwrap()
                    .id
            })
            .collect();

        // Newest page.
        let newest = store.range(Scope::group(group), None, 2);
        assert_eq!(
            newest.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![ids[4], ids[3]]
        );

        // Page strictly older than the oldest of the first page.
        let older = store.range(Scope::group(group), Some(ids[3]), 2);
        assert_eq!(
            older.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![ids[2], ids[1]]
        );

        // Nothing older than the very first message.
        assert!(store.range(Scope::group(group), Some(ids[0]), 2).is_empty());
    }

    #[test]
    fn range_skips_deleted_messages() {
        let store = MessageStore::new();
        let group = Uuid::new_v4();
        let sender = Uuid::new_v4();

        let m1 = store
            .append(text(sender, group, ConversationKind::Group, "kept"))
            .unwrap();
        let m2 = store
            .append(text(sender, group, ConversationKind::Group, "gone"))
            .unwrap();
        store.set_deleted(m2.id).unwrap();

        let page = store.range(Scope::group(group), None, 10);
        assert_eq!(page.iter().map(|m| m.id).collect::<Vec<_>>(), vec![m1.id]);
    }

    #[test]
    fn flag_setters_are_idempotent_and_monotone() {
        let store = MessageStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        let m = store
            .append(text(a, b, ConversationKind::Private, "hi"))
            .unwrap();

        store.set_recalled(m.id).unwrap();
        store.set_recalled(m.id).unwrap();
        assert!(store.get(m.id).unwrap().recalled);

        store.set_deleted(m.id).unwrap();
        store.set_deleted(m.id).unwrap();
        let stored = store.get(m.id).unwrap();
        assert!(stored.recalled && stored.deleted);

        assert!(matches!(
            store.set_recalled(9999),
            Err(EngineError::NotFound("message"))
        ));
    }

    #[test]
    fn closed_store_rejects_appends() {
        let store = MessageStore::new();
        let (a, b) = (Uuid::new_v4(), Uuid::new_v4());
        store.close();

        assert!(matches!(
            store.append(text(a, b, ConversationKind::Private, "late")),
            Err(EngineError::StoreUnavailable)
        ));
    }
}
