use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};
use crate::models::{ConversationEntry, ConversationKind};

type OwnerKey = (Uuid, ConversationKind, Uuid);

/// Per-(owner, kind, target) projection of the message log: unread count,
/// last-message pointer, pin/mute flags.
///
/// Rows are created lazily on first message exchange or explicit open and
/// only ever soft-deleted. Id-addressed mutators verify ownership; the
/// dispatcher-side mutators are keyed by owner and cannot cross rows.
pub struct ConversationIndex {
    entries: DashMap<Uuid, ConversationEntry>,
    by_owner: DashMap<OwnerKey, Uuid>,
}

impl Default for ConversationIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationIndex {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            by_owner: DashMap::new(),
        }
    }

    /// Returns the owner's entry for (kind, target), creating it with zero
    /// unread and no flags if absent. A soft-deleted entry is revived with
    /// its unread count and last-message pointer reset. Idempotent.
    pub fn upsert(
        &self,
        owner_id: Uuid,
        kind: ConversationKind,
        target_id: Uuid,
    ) -> ConversationEntry {
        let key = (owner_id, kind, target_id);
        let entry_id = *self
            .by_owner
            .entry(key)
            .or_insert_with(Uuid::now_v7);

        let mut entry = self
            .entries
            .entry(entry_id)
            .or_insert_with(|| ConversationEntry {
                id: entry_id,
                owner_id,
                kind,
                target_id,
                unread_count: 0,
                last_message_id: None,
                last_message_at: None,
                pinned: false,
                muted: false,
                deleted: false,
                created_at: Utc::now(),
            });

        if entry.deleted {
            entry.deleted = false;
            entry.unread_count = 0;
            entry.last_message_id = None;
            entry.last_message_at = None;
        }

        entry.clone()
    }

    pub fn get(&self, owner_id: Uuid, kind: ConversationKind, target_id: Uuid) -> Option<ConversationEntry> {
        let entry_id = *self.by_owner.get(&(owner_id, kind, target_id))?;
        self.entries.get(&entry_id).map(|e| e.clone())
    }

    /// Adjusts the unread counter, clamping at zero. A large negative delta
    /// is how callers reset the counter.
    pub fn bump_unread(
        &self,
        owner_id: Uuid,
        kind: ConversationKind,
        target_id: Uuid,
        delta: i32,
    ) -> EngineResult<u32> {
        let entry_id = *self
            .by_owner
            .get(&(owner_id, kind, target_id))
            .ok_or(EngineError::NotFound("conversation"))?;
        let mut entry = self
            .entries
            .get_mut(&entry_id)
            .ok_or(EngineError::NotFound("conversation"))?;

        let next = entry.unread_count as i64 + delta as i64;
        entry.unread_count = next.max(0) as u32;
        Ok(entry.unread_count)
    }

    pub fn set_last_message(
        &self,
        owner_id: Uuid,
        kind: ConversationKind,
        target_id: Uuid,
        message_id: u64,
        at: DateTime<Utc>,
    ) -> EngineResult<()> {
        let entry_id = *self
            .by_owner
            .get(&(owner_id, kind, target_id))
            .ok_or(EngineError::NotFound("conversation"))?;
        let mut entry = self
            .entries
            .get_mut(&entry_id)
            .ok_or(EngineError::NotFound("conversation"))?;

        entry.last_message_id = Some(message_id);
        entry.last_message_at = Some(at);
        Ok(())
    }

    /// Conversation list for one user: pinned entries first, then newest
    /// activity first. Soft-deleted entries are hidden.
    pub fn list_for(&self, owner_id: Uuid) -> Vec<ConversationEntry> {
        let mut entries: Vec<ConversationEntry> = self
            .entries
            .iter()
            .filter(|e| e.owner_id == owner_id && !e.deleted)
            .map(|e| e.clone())
            .collect();

        entries.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then(b.last_message_at.cmp(&a.last_message_at))
                .then(b.created_at.cmp(&a.created_at))
        });
        entries
    }

    pub fn set_pinned(&self, entry_id: Uuid, owner_id: Uuid, pinned: bool) -> EngineResult<()> {
        let mut entry = self.owned_entry(entry_id, owner_id)?;
        entry.pinned = pinned;
        Ok(())
    }

    pub fn set_muted(&self, entry_id: Uuid, owner_id: Uuid, muted: bool) -> EngineResult<()> {
        let mut entry = self.owned_entry(entry_id, owner_id)?;
        entry.muted = muted;
        Ok(())
    }

    /// Resets the unread counter to zero.
    pub fn mark_read(&self, entry_id: Uuid, owner_id: Uuid) -> EngineResult<()> {
        let mut entry = self.owned_entry(entry_id, owner_id)?;
        entry.unread_count = 0;
        Ok(())
    }

    /// Drops the last-message pointer and unread count without touching the
    /// underlying message log.
    pub fn clear(&self, entry_id: Uuid, owner_id: Uuid) -> EngineResult<()> {
        let mut entry = self.owned_entry(entry_id, owner_id)?;
        entry.unread_count = 0;
        entry.last_message_id = None;
        entry.last_message_at = None;
        Ok(())
    }

    /// Soft delete; the row is revived by the next `upsert`.
    pub fn soft_delete(&self, entry_id: Uuid, owner_id: Uuid) -> EngineResult<()> {
        let mut entry = self.owned_entry(entry_id, owner_id)?;
        entry.deleted = true;
        Ok(())
    }

    fn owned_entry(
        &self,
        entry_id: Uuid,
        owner_id: Uuid,
    ) -> EngineResult<dashmap::mapref::one::RefMut<'_, Uuid, ConversationEntry>> {
        let entry = self
            .entries
            .get_mut(&entry_id)
            .ok_or(EngineError::NotFound("conversation"))?;
        if entry.owner_id != owner_id {
            return Err(EngineError::PermissionDenied("not the conversation owner"));
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_is_idempotent() {
        let index = ConversationIndex::new();
        let (owner, target) = (Uuid::new_v4(), Uuid::new_v4());

        let first = index.upsert(owner, ConversationKind::Private, target);
        let second = index.upsert(owner, ConversationKind::Private, target);

        assert_eq!(first.id, second.id);
        assert_eq!(second.unread_count, 0);
        assert!(!second.pinned && !second.muted);
    }

    #[test]
    fn bump_unread_clamps_at_zero() {
        let index = ConversationIndex::new();
        let (owner, target) = (Uuid::new_v4(), Uuid::new_v4());
        index.upsert(owner, ConversationKind::Private, target);

        index
            .bump_unread(owner, ConversationKind::Private, target, 2)
            .unwrap();
        let count = index
            .bump_unread(owner, ConversationKind::Private, target, -5)
            .unwrap();
        assert_eq!(count, 0);

        // Any interleaving of +1/-1 never goes negative.
        for delta in [1, -1, -1, 1, -1, -1] {
            let count = index
                .bump_unread(owner, ConversationKind::Private, target, delta)
                .unwrap();
            assert!(count <= 2);
        }
        assert_eq!(
            index
                .get(owner, ConversationKind::Private, target)
                .unwrap()
                .unread_count,
            0
        );
    }

    #[test]
    fn mutators_reject_foreign_owner() {
        let index = ConversationIndex::new();
        let (owner, stranger, target) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let entry = index.upsert(owner, ConversationKind::Private, target);

        assert!(matches!(
            index.set_pinned(entry.id, stranger, true),
            Err(EngineError::PermissionDenied(_))
        ));
        assert!(matches!(
            index.soft_delete(entry.id, stranger),
            Err(EngineError::PermissionDenied(_))
        ));
    }

    #[test]
    fn list_orders_pinned_then_recent() {
        let index = ConversationIndex::new();
        let owner = Uuid::new_v4();
        let (t1, t2, t3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());

        let old = index.upsert(owner, ConversationKind::Private, t1);
        let recent = index.upsert(owner, ConversationKind::Private, t2);
        let pinned = index.upsert(owner, ConversationKind::Group, t3);

        let base = Utc::now();
        index
            .set_last_message(owner, ConversationKind::Private, t1, 1, base)
            .unwrap();
        index
            .set_last_message(
                owner,
                ConversationKind::Private,
                t2,
                2,
                base + chrono::Duration::seconds(10),
            )
            .unwrap();
        index.set_pinned(pinned.id, owner, true).unwrap();

        let listed = index.list_for(owner);
        let ids: Vec<Uuid> = listed.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![pinned.id, recent.id, old.id]);
    }

    #[test]
    fn soft_deleted_entry_revives_reset() {
        let index = ConversationIndex::new();
        let (owner, target) = (Uuid::new_v4(), Uuid::new_v4());

        let entry = index.upsert(owner, ConversationKind::Private, target);
        index
            .set_last_message(owner, ConversationKind::Private, target, 7, Utc::now())
            .unwrap();
        index
            .bump_unread(owner, ConversationKind::Private, target, 3)
            .unwrap();
        index.soft_delete(entry.id, owner).unwrap();

        assert!(index.list_for(owner).is_empty());

        let revived = index.upsert(owner, ConversationKind::Private, target);
        assert_eq!(revived.id, entry.id);
        assert_eq!(revived.unread_count, 0);
        assert_eq!(revived.last_message_id, None);
        assert_eq!(index.list_for(owner).len(), 1);
    }
}
