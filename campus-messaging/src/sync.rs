use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::Message;
use crate::store::MessageStore;

/// One replayable stream entry: the user-scoped sequence number and the
/// message it points at. Clients ack the `seq` of the last entry they
/// actually applied, so a truncated page never skips anything.
#[derive(Debug, Clone, Serialize)]
pub struct SyncEntry {
    pub seq: u64,
    pub message: Message,
}

#[derive(Default)]
struct UserStream {
    next_seq: u64,
    /// (sequence, message id), ascending by sequence.
    entries: Vec<(u64, u64)>,
}

/// Per-(user, device) watermark into the user's message stream, used for
/// reconnect replay.
///
/// The sequence numbers here are a user-scoped monotonic counter, distinct
/// from per-conversation message ids: they linearize "everything this user
/// should have seen" across all conversations.
pub struct SyncTracker {
    store: Arc<MessageStore>,
    cursors: DashMap<(Uuid, String), u64>,
    streams: DashMap<Uuid, UserStream>,
}

impl SyncTracker {
    pub fn new(store: Arc<MessageStore>) -> Self {
        Self {
            store,
            cursors: DashMap::new(),
            streams: DashMap::new(),
        }
    }

    /// Creates the device cursor at sequence 0 if absent. Re-registering an
    /// existing device keeps its watermark.
    pub fn register(&self, user_id: Uuid, device_id: &str) {
        self.cursors
            .entry((user_id, device_id.to_string()))
            .or_insert(0);
    }

    pub fn unregister(&self, user_id: Uuid, device_id: &str) {
        self.cursors.remove(&(user_id, device_id.to_string()));
    }

    /// Moves the cursor forward only; an attempt to move it backward is
    /// clamped to the current watermark.
    pub fn advance(&self, user_id: Uuid, device_id: &str, seq: u64) -> EngineResult<u64> {
        let mut cursor = self
            .cursors
            .get_mut(&(user_id, device_id.to_string()))
            .ok_or(EngineError::NotFound("device"))?;
        *cursor = (*cursor).max(seq);
        Ok(*cursor)
    }

    /// Appends a stream entry for one recipient of a freshly stored message
    /// and returns the assigned sequence number.
    pub fn record(&self, user_id: Uuid, message_id: u64) -> u64 {
        let mut stream = self.streams.entry(user_id).or_default();
        stream.next_seq += 1;
        let seq = stream.next_seq;
        stream.entries.push((seq, message_id));
        seq
    }

    /// Reconnect-replay read: every message addressed to `user_id` with a
    /// sequence above the device's watermark, ascending, capped at `limit`.
    /// Pure read — calling it repeatedly without `advance` returns the same
    /// page. Soft-deleted messages are skipped; recalled messages are
    /// delivered with their flag set. Each entry carries its sequence
    /// number so the caller can `advance` to exactly what it received.
    pub fn pending(
        &self,
        user_id: Uuid,
        device_id: &str,
        limit: usize,
    ) -> EngineResult<Vec<SyncEntry>> {
        let cursor = *self
            .cursors
            .get(&(user_id, device_id.to_string()))
            .ok_or(EngineError::NotFound("device"))?;

        let Some(stream) = self.streams.get(&user_id) else {
            return Ok(Vec::new());
        };

        let start = stream.entries.partition_point(|&(seq, _)| seq <= cursor);
        Ok(stream.entries[start..]
            .iter()
            .filter_map(|&(seq, message_id)| {
                self.store.get(message_id).map(|message| SyncEntry { seq, message })
            })
            .filter(|e| !e.message.deleted)
            .take(limit)
            .collect())
    }

    /// Highest sequence recorded for the user, for clients that want to ack
    /// to "now".
    pub fn latest_seq(&self, user_id: Uuid) -> u64 {
        self.streams.get(&user_id).map(|s| s.next_seq).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContentKind, ConversationKind, NewMessage};

    fn seed_message(store: &MessageStore, sender: Uuid, target: Uuid) -> Message {
        store
            .append(NewMessage {
                kind: ConversationKind::Private,
                sender_id: sender,
                target_id: target,
                content_kind: ContentKind::Text,
                content: "hi".to_string(),
                extra: None,
            })
            .unwrap()
    }

    fn tracker() -> (Arc<MessageStore>, SyncTracker) {
        let store = Arc::new(MessageStore::new());
        let tracker = SyncTracker::new(store.clone());
        (store, tracker)
    }

    #[test]
    fn register_is_idempotent_and_keeps_watermark() {
        let (_store, tracker) = tracker();
        let user = Uuid::new_v4();

        tracker.register(user, "phone");
        tracker.advance(user, "phone", 5).unwrap();
        tracker.register(user, "phone");

        // Re-registration must not rewind the cursor.
        assert_eq!(tracker.advance(user, "phone", 0).unwrap(), 5);
    }

    #[test]
    fn advance_never_moves_backward() {
        let (_store, tracker) = tracker();
        let user = Uuid::new_v4();
        tracker.register(user, "phone");

        assert_eq!(tracker.advance(user, "phone", 3).unwrap(), 3);
        assert_eq!(tracker.advance(user, "phone", 1).unwrap(), 3);
        assert_eq!(tracker.advance(user, "phone", 7).unwrap(), 7);
    }

    #[test]
    fn pending_is_a_pure_read() {
        let (store, tracker) = tracker();
        let (sender, user) = (Uuid::new_v4(), Uuid::new_v4());
        tracker.register(user, "phone");

        let m1 = seed_message(&store, sender, user);
        let m2 = seed_message(&store, sender, user);
        tracker.record(user, m1.id);
        tracker.record(user, m2.id);

        let first = tracker.pending(user, "phone", 10).unwrap();
        let second = tracker.pending(user, "phone", 10).unwrap();
        assert_eq!(
            first.iter().map(|e| e.message.id).collect::<Vec<_>>(),
            second.iter().map(|e| e.message.id).collect::<Vec<_>>()
        );
        assert_eq!(
            first.iter().map(|e| e.message.id).collect::<Vec<_>>(),
            vec![m1.id, m2.id]
        );
    }

    #[test]
    fn pending_honors_watermark_and_limit() {
        let (store, tracker) = tracker();
        let (sender, user) = (Uuid::new_v4(), Uuid::new_v4());
        tracker.register(user, "phone");

        let seqs: Vec<u64> = (0..4)
            .map(|_| {
                let m = seed_message(&store, sender, user);
                tracker.record(user, m.id)
            })
            .collect();

        tracker.advance(user, "phone", seqs[1]).unwrap();
        let page = tracker.pending(user, "phone", 1).unwrap();
        assert_eq!(page.len(), 1);

        tracker.advance(user, "phone", seqs[3]).unwrap();
        assert!(tracker.pending(user, "phone", 10).unwrap().is_empty());
    }

    #[test]
    fn pending_skips_deleted_keeps_recalled() {
        let (store, tracker) = tracker();
        let (sender, user) = (Uuid::new_v4(), Uuid::new_v4());
        tracker.register(user, "phone");

        let deleted = seed_message(&store, sender, user);
        let recalled = seed_message(&store, sender, user);
        tracker.record(user, deleted.id);
        tracker.record(user, recalled.id);
        store.set_deleted(deleted.id).unwrap();
        store.set_recalled(recalled.id).unwrap();

        let page = tracker.pending(user, "phone", 10).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].message.id, recalled.id);
        assert!(page[0].message.recalled);
    }

    #[test]
    fn truncated_page_acks_by_last_entry_without_losing_messages() {
        let (store, tracker) = tracker();
        let (sender, user) = (Uuid::new_v4(), Uuid::new_v4());
        tracker.register(user, "phone");

        let ids: Vec<u64> = (0..3)
            .map(|_| {
                let m = seed_message(&store, sender, user);
                tracker.record(user, m.id);
                m.id
            })
            .collect();

        // The backlog exceeds the page size; the client acks exactly the
        // sequence of the last entry it received.
        let page = tracker.pending(user, "phone", 2).unwrap();
        assert_eq!(page.len(), 2);
        tracker
            .advance(user, "phone", page.last().unwrap().seq)
            .unwrap();

        // The next page picks up where the truncated one stopped.
        let rest = tracker.pending(user, "phone", 2).unwrap();
        assert_eq!(
            rest.iter().map(|e| e.message.id).collect::<Vec<_>>(),
            vec![ids[2]]
        );
    }

    #[test]
    fn unregistered_device_is_not_found() {
        let (_store, tracker) = tracker();
        assert!(matches!(
            tracker.pending(Uuid::new_v4(), "ghost", 10),
            Err(EngineError::NotFound("device"))
        ));
    }
}
