//! Message, session, branch, and summary domain types.
//!
//! These are the value objects that flow through the entire system:
//! a user message is appended to a session (or one of its branches), the
//! resolver flattens it into prompt-level `ChatMessage`s, a strategy turns
//! those into a bounded prompt, and the provider's reply is appended back.

use crate::facts::FactMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a chat session (conversation).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a branch within a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BranchId(pub String);

impl BranchId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl Default for BranchId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for BranchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The role of a message sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions (prompt, rules)
    System,
    /// The end user
    User,
    /// The LLM assistant
    Assistant,
}

impl Role {
    /// Parse from the lowercase wire/storage form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "system" => Some(Role::System),
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A prompt-level role/content pair.
///
/// This is what context strategies consume and produce, and what goes over
/// the wire to the completion endpoint. Deliberately free of identifiers
/// and timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A persisted message record.
///
/// Root-branch messages have `branch_id = None`. Ordering is by
/// `created_at` only — there are no explicit sequence numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredMessage {
    /// Unique message ID
    pub id: String,

    /// Owning session
    pub session_id: SessionId,

    /// Branch this message belongs to; `None` means the root branch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch_id: Option<BranchId>,

    /// Who sent this message
    pub role: Role,

    /// The text content
    pub content: String,

    /// Creation timestamp — the sole ordering authority
    pub created_at: DateTime<Utc>,
}

impl StoredMessage {
    /// Project down to the prompt-level pair.
    pub fn to_chat(&self) -> ChatMessage {
        ChatMessage {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// A chat session: identifier, bookkeeping, and its durable fact memory.
///
/// Created on the first user turn if absent. The fact map is overwritten
/// wholesale on each update (last writer wins). Sessions are never
/// destroyed by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    /// Optional short title (auto-generated from the first user message)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    /// Durable facts extracted from the conversation
    #[serde(default, skip_serializing_if = "FactMap::is_empty")]
    pub facts: FactMap,

    pub created_at: DateTime<Utc>,
}

/// A conversation branch.
///
/// `base_count` marks how many of the session's root-branch messages are
/// inherited as this branch's prefix. It is captured at fork time and
/// immutable afterwards; root messages are never deleted after a fork, so
/// the prefix stays valid (copy-on-fork-point).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub id: BranchId,
    pub session_id: SessionId,

    /// Human label shown in branch pickers
    pub label: String,

    /// Number of root-branch messages shared with the parent
    pub base_count: usize,

    pub created_at: DateTime<Utc>,
}

/// A cached chunk summary (write-once).
///
/// Chunk index is zero-based and dense: chunk `i` summarizes exactly the
/// effective-history messages in positions `[i*C, (i+1)*C)` for the fixed
/// chunk size C.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    pub session_id: SessionId,
    pub chunk_index: usize,
    pub content: String,
    pub created_at: DateTime<Utc>,
}
