use dashmap::{DashMap, DashSet};
use serde::Serialize;
use uuid::Uuid;

use crate::counters::Counters;

/// One recorded mention: which group, which message.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct MentionRef {
    pub group_id: Uuid,
    pub message_id: u64,
}

/// Per-user inverted index of messages that mention them, plus a global
/// unread-mention counter per user.
///
/// Lists are append-only; the counter moves down only through an explicit,
/// idempotent acknowledgment of a specific message.
pub struct MentionIndex {
    by_group: DashMap<(Uuid, Uuid), Vec<u64>>,
    by_user: DashMap<Uuid, Vec<MentionRef>>,
    acknowledged: DashSet<(Uuid, u64)>,
    unread: Counters,
}

impl Default for MentionIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl MentionIndex {
    pub fn new() -> Self {
        Self {
            by_group: DashMap::new(),
            by_user: DashMap::new(),
            acknowledged: DashSet::new(),
            unread: Counters::new(),
        }
    }

    pub fn record(&self, group_id: Uuid, user_id: Uuid, message_id: u64) {
        self.by_group
            .entry((group_id, user_id))
            .or_default()
            .push(message_id);
        self.by_user.entry(user_id).or_default().push(MentionRef {
            group_id,
            message_id,
        });
        self.unread.incr(user_id);
    }

    /// Mentions for one user, newest first; scoped to one group when
    /// `group_id` is given, merged across groups otherwise.
    pub fn list(
        &self,
        user_id: Uuid,
        group_id: Option<Uuid>,
        limit: usize,
        offset: usize,
    ) -> Vec<MentionRef> {
        match group_id {
            Some(group_id) => self
                .by_group
                .get(&(group_id, user_id))
                .map(|ids| {
                    ids.iter()
                        .rev()
                        .skip(offset)
                        .take(limit)
                        .map(|&message_id| MentionRef {
                            group_id,
                            message_id,
                        })
                        .collect()
                })
                .unwrap_or_default(),
            None => self
                .by_user
                .get(&user_id)
                .map(|refs| refs.iter().rev().skip(offset).take(limit).copied().collect())
                .unwrap_or_default(),
        }
    }

    /// Decrements the user's unread-mention counter by at most one.
    /// Acknowledging an already-acknowledged mention changes nothing.
    pub fn acknowledge(&self, user_id: Uuid, message_id: u64) {
        if self.acknowledged.insert((user_id, message_id)) {
            self.unread.decr_clamped(user_id);
        }
    }

    pub fn unread_count(&self, user_id: Uuid) -> i64 {
        self.unread.get(user_id)
    }
}
