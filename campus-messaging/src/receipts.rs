use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::Receipt;

/// Per-message, per-recipient read state. Rows are created unread when a
/// message is fanned out and only ever move unread -> read.
pub struct ReceiptTracker {
    receipts: DashMap<(u64, Uuid), Receipt>,
}

impl Default for ReceiptTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ReceiptTracker {
    pub fn new() -> Self {
        Self {
            receipts: DashMap::new(),
        }
    }

    /// Creates an unread receipt row; keeps an existing row (and its read
    /// state) untouched.
    pub fn create_unread(&self, message_id: u64, user_id: Uuid) {
        self.receipts
            .entry((message_id, user_id))
            .or_insert(Receipt {
                message_id,
                user_id,
                read: false,
                read_at: None,
            });
    }

    pub fn create_unread_many(&self, message_id: u64, user_ids: &[Uuid]) {
        for user_id in user_ids {
            self.create_unread(message_id, *user_id);
        }
    }

    /// Flips unread -> read, idempotent. Returns whether this call made the
    /// transition, so the caller can fire the read notice exactly once.
    pub fn mark_read(&self, message_id: u64, user_id: Uuid) -> EngineResult<bool> {
        let mut receipt = self
            .receipts
            .get_mut(&(message_id, user_id))
            .ok_or(EngineError::NotFound("receipt"))?;

        if receipt.read {
            return Ok(false);
        }
        receipt.read = true;
        receipt.read_at = Some(Utc::now());
        Ok(true)
    }

    pub fn get(&self, message_id: u64, user_id: Uuid) -> Option<Receipt> {
        self.receipts.get(&(message_id, user_id)).map(|r| r.clone())
    }

    pub fn readers_of(&self, message_id: u64) -> Vec<Uuid> {
        self.recipients_where(message_id, true)
    }

    pub fn unread_recipients_of(&self, message_id: u64) -> Vec<Uuid> {
        self.recipients_where(message_id, false)
    }

    pub fn read_count(&self, message_id: u64) -> usize {
        self.readers_of(message_id).len()
    }

    pub fn unread_count(&self, message_id: u64) -> usize {
        self.unread_recipients_of(message_id).len()
    }

    fn recipients_where(&self, message_id: u64, read: bool) -> Vec<Uuid> {
        self.receipts
            .iter()
            .filter(|r| r.message_id == message_id && r.read == read)
            .map(|r| r.user_id)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_read_is_one_way_and_idempotent() {
        let tracker = ReceiptTracker::new();
        let reader = Uuid::new_v4();
        tracker.create_unread(1, reader);

        assert!(tracker.mark_read(1, reader).unwrap());
        assert!(!tracker.mark_read(1, reader).unwrap());

        let receipt = tracker.get(1, reader).unwrap();
        assert!(receipt.read);
        assert!(receipt.read_at.is_some());
    }

    #[test]
    fn mark_read_without_receipt_is_not_found() {
        let tracker = ReceiptTracker::new();
        assert!(matches!(
            tracker.mark_read(42, Uuid::new_v4()),
            Err(EngineError::NotFound("receipt"))
        ));
    }

    #[test]
    fn create_unread_keeps_existing_read_state() {
        let tracker = ReceiptTracker::new();
        let reader = Uuid::new_v4();
        tracker.create_unread(1, reader);
        tracker.mark_read(1, reader).unwrap();

        // Replayed fan-out must not reset the receipt.
        tracker.create_unread(1, reader);
        assert!(tracker.get(1, reader).unwrap().read);
    }

    #[test]
    fn splits_readers_from_unread_recipients() {
        let tracker = ReceiptTracker::new();
        let (a, b, c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        tracker.create_unread_many(7, &[a, b, c]);
        tracker.mark_read(7, b).unwrap();

        let mut readers = tracker.readers_of(7);
        readers.sort();
        assert_eq!(readers, {
            let mut v = vec![b];
            v.sort();
            v
        });

        let mut unread = tracker.unread_recipients_of(7);
        unread.sort();
        let mut expected = vec![a, c];
        expected.sort();
        assert_eq!(unread, expected);
        assert_eq!(tracker.read_count(7), 1);
        assert_eq!(tracker.unread_count(7), 2);
    }
}
