use chrono::{DateTime, Duration, Utc};

use crate::models::GroupRole;

/// How long a regular member may recall their own group message.
pub const RECALL_WINDOW_SECS: i64 = 120;

/// Outcome of a recall request that did not fail a permission guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecallOutcome {
    Recalled,
    /// The message was already recalled; treated as success with no side
    /// effects, never as an error.
    AlreadyRecalled,
}

/// Group recall permission, kept as one predicate so the state machine stays
/// auditable: owners and admins recall anything at any time, a regular
/// member only their own message inside the window.
pub fn can_recall(actor_role: GroupRole, is_self: bool, within_window: bool) -> bool {
    actor_role >= GroupRole::Admin || (is_self && within_window)
}

pub fn within_recall_window(sent_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    now - sent_at <= Duration::seconds(RECALL_WINDOW_SECS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn member_needs_self_and_window() {
        assert!(can_recall(GroupRole::Member, true, true));
        assert!(!can_recall(GroupRole::Member, true, false));
        assert!(!can_recall(GroupRole::Member, false, true));
        assert!(!can_recall(GroupRole::Member, false, false));
    }

    #[test]
    fn admin_and_owner_ignore_window_and_authorship() {
        for role in [GroupRole::Admin, GroupRole::Owner] {
            assert!(can_recall(role, false, false));
            assert!(can_recall(role, true, false));
        }
    }

    #[test]
    fn window_boundary() {
        let sent = Utc::now();
        assert!(within_recall_window(
            sent,
            sent + Duration::seconds(RECALL_WINDOW_SECS)
        ));
        assert!(!within_recall_window(
            sent,
            sent + Duration::seconds(RECALL_WINDOW_SECS + 1)
        ));
    }
}
