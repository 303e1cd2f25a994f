use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// --- Conversation kind / ordering scope ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationKind {
    Private,
    Group,
}

/// The ordering domain for message ids: an unordered user pair for private
/// chat, the group id for group chat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    Private(Uuid, Uuid),
    Group(Uuid),
}

impl Scope {
    /// Normalizes the pair so {a, b} and {b, a} map to the same scope.
    pub fn private(a: Uuid, b: Uuid) -> Self {
        if a <= b {
            Scope::Private(a, b)
        } else {
            Scope::Private(b, a)
        }
    }

    pub fn group(group_id: Uuid) -> Self {
        Scope::Group(group_id)
    }

    pub fn kind(&self) -> ConversationKind {
        match self {
            Scope::Private(..) => ConversationKind::Private,
            Scope::Group(..) => ConversationKind::Group,
        }
    }
}

// --- Message ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Voice,
    Video,
    File,
    Location,
    System,
}

/// A stored message. Immutable after append except for the two monotone
/// flags (`recalled`, `deleted`), which are never cleared once set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: u64,
    pub kind: ConversationKind,
    pub sender_id: Uuid,
    /// Peer user id for private chat, group id for group chat.
    pub target_id: Uuid,
    pub content_kind: ContentKind,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
    pub sent_at: DateTime<Utc>,
    pub recalled: bool,
    pub deleted: bool,
}

impl Message {
    pub fn scope(&self) -> Scope {
        match self.kind {
            ConversationKind::Private => Scope::private(self.sender_id, self.target_id),
            ConversationKind::Group => Scope::group(self.target_id),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewMessage {
    pub kind: ConversationKind,
    pub sender_id: Uuid,
    pub target_id: Uuid,
    pub content_kind: ContentKind,
    pub content: String,
    pub extra: Option<serde_json::Value>,
}

// --- ConversationEntry ---

/// Per-(owner, kind, target) projection of a conversation. Each participant
/// owns its own row: a private chat has two, a group chat one per member.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationEntry {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub kind: ConversationKind,
    pub target_id: Uuid,
    pub unread_count: u32,
    pub last_message_id: Option<u64>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub pinned: bool,
    pub muted: bool,
    #[serde(skip_serializing)]
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
}

// --- Receipt ---

#[derive(Debug, Clone, Serialize)]
pub struct Receipt {
    pub message_id: u64,
    pub user_id: Uuid,
    pub read: bool,
    pub read_at: Option<DateTime<Utc>>,
}

// --- Group roles ---

/// Ordered group roles; the ordering is what the recall permission
/// predicate compares against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupRole {
    Member,
    Admin,
    Owner,
}

// --- User directory identity ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserIdentity {
    pub user_id: Uuid,
    pub phone: String,
    pub display_name: String,
}
