use dashmap::DashMap;
use uuid::Uuid;

/// Clamp-at-zero per-user counters. Increments are unbounded, decrements
/// never take a counter below zero.
pub struct Counters {
    values: DashMap<Uuid, i64>,
}

impl Default for Counters {
    fn default() -> Self {
        Self::new()
    }
}

impl Counters {
    pub fn new() -> Self {
        Self {
            values: DashMap::new(),
        }
    }

    pub fn incr(&self, key: Uuid) -> i64 {
        let mut value = self.values.entry(key).or_insert(0);
        *value += 1;
        *value
    }

    pub fn decr_clamped(&self, key: Uuid) -> i64 {
        let mut value = self.values.entry(key).or_insert(0);
        *value = (*value - 1).max(0);
        *value
    }

    pub fn get(&self, key: Uuid) -> i64 {
        self.values.get(&key).map(|v| *v).unwrap_or(0)
    }
}
