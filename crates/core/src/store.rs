//! ChatStore trait — the persistence collaborator.
//!
//! An append-only ordered log of role/content messages per session,
//! optionally tagged with a branch, plus session bookkeeping (title,
//! fact memory), branch records, and the write-once summary cache.
//!
//! Implementations: SQLite (production), in-memory (tests / ephemeral).

use async_trait::async_trait;
use crate::error::StoreError;
use crate::facts::FactMap;
use crate::message::{Branch, BranchId, Role, Session, SessionId, StoredMessage, Summary};

/// Which slice of a session's message log to read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageScope {
    /// Root-branch messages only (`branch_id IS NULL`)
    Root,
    /// Messages tagged with one specific branch
    Branch(BranchId),
    /// Everything, root and branch-tagged alike
    All,
}

/// The persistence collaborator consumed by the context-assembly core.
///
/// All listing operations order by creation time, oldest first (sessions
/// are the exception: newest first, for pickers). The summary cache is
/// write-once: `create_summary` must deduplicate on
/// (session, chunk_index) — when two turns race to fill the same chunk,
/// the first persisted row wins and both callers observe it.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// The backend name (e.g., "sqlite", "in_memory").
    fn name(&self) -> &str;

    // --- Sessions ---

    async fn create_session(&self, title: Option<&str>) -> Result<Session, StoreError>;

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError>;

    /// All sessions, newest first.
    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError>;

    async fn set_session_title(&self, id: &SessionId, title: &str) -> Result<(), StoreError>;

    /// Overwrite the session's fact memory wholesale (last writer wins).
    async fn set_session_facts(&self, id: &SessionId, facts: &FactMap) -> Result<(), StoreError>;

    // --- Messages ---

    async fn append_message(
        &self,
        session: &SessionId,
        branch: Option<&BranchId>,
        role: Role,
        content: &str,
    ) -> Result<StoredMessage, StoreError>;

    /// Messages in scope, oldest first.
    async fn list_messages(
        &self,
        session: &SessionId,
        scope: MessageScope,
    ) -> Result<Vec<StoredMessage>, StoreError>;

    /// Current length of the root branch — the fork point for new branches.
    async fn count_root_messages(&self, session: &SessionId) -> Result<usize, StoreError>;

    // --- Branches ---

    async fn create_branch(
        &self,
        session: &SessionId,
        label: &str,
        base_count: usize,
    ) -> Result<Branch, StoreError>;

    async fn get_branch(
        &self,
        session: &SessionId,
        id: &BranchId,
    ) -> Result<Option<Branch>, StoreError>;

    async fn list_branches(&self, session: &SessionId) -> Result<Vec<Branch>, StoreError>;

    /// Returns `true` if a branch was removed. Deleting an unknown branch
    /// is not an error.
    async fn delete_branch(&self, session: &SessionId, id: &BranchId)
        -> Result<bool, StoreError>;

    // --- Summary cache ---

    async fn get_summary(
        &self,
        session: &SessionId,
        chunk_index: usize,
    ) -> Result<Option<Summary>, StoreError>;

    /// Persist a chunk summary. On a (session, chunk_index) conflict the
    /// existing row is returned unchanged.
    async fn create_summary(
        &self,
        session: &SessionId,
        chunk_index: usize,
        content: &str,
    ) -> Result<Summary, StoreError>;

    /// All cached summaries for a session, by chunk index ascending.
    async fn list_summaries(&self, session: &SessionId) -> Result<Vec<Summary>, StoreError>;
}
