//! In-memory store — useful for testing and ephemeral sessions.

use async_trait::async_trait;
use braid_core::error::StoreError;
use braid_core::facts::FactMap;
use braid_core::message::{Branch, BranchId, Role, Session, SessionId, StoredMessage, Summary};
use braid_core::store::{ChatStore, MessageScope};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Inner {
    sessions: HashMap<SessionId, Session>,
    branches: Vec<Branch>,
    messages: Vec<StoredMessage>,
    summaries: Vec<Summary>,
}

/// An in-memory store keeping everything in Vecs and maps.
/// Message order falls out of append order, which matches creation time.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ChatStore for InMemoryStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn create_session(&self, title: Option<&str>) -> Result<Session, StoreError> {
        let session = Session {
            id: SessionId::new(),
            title: title.map(String::from),
            facts: FactMap::new(),
            created_at: Utc::now(),
        };
        self.inner
            .write()
            .await
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        Ok(self.inner.read().await.sessions.get(id).cloned())
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let inner = self.inner.read().await;
        let mut sessions: Vec<Session> = inner.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    async fn set_session_title(&self, id: &SessionId, title: &str) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))?;
        session.title = Some(title.to_string());
        Ok(())
    }

    async fn set_session_facts(&self, id: &SessionId, facts: &FactMap) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let session = inner
            .sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::SessionNotFound(id.to_string()))?;
        session.facts = facts.clone();
        Ok(())
    }

    async fn append_message(
        &self,
        session: &SessionId,
        branch: Option<&BranchId>,
        role: Role,
        content: &str,
    ) -> Result<StoredMessage, StoreError> {
        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            session_id: session.clone(),
            branch_id: branch.cloned(),
            role,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        self.inner.write().await.messages.push(message.clone());
        Ok(message)
    }

    async fn list_messages(
        &self,
        session: &SessionId,
        scope: MessageScope,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.session_id == *session)
            .filter(|m| match &scope {
                MessageScope::Root => m.branch_id.is_none(),
                MessageScope::Branch(id) => m.branch_id.as_ref() == Some(id),
                MessageScope::All => true,
            })
            .cloned()
            .collect())
    }

    async fn count_root_messages(&self, session: &SessionId) -> Result<usize, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .messages
            .iter()
            .filter(|m| m.session_id == *session && m.branch_id.is_none())
            .count())
    }

    async fn create_branch(
        &self,
        session: &SessionId,
        label: &str,
        base_count: usize,
    ) -> Result<Branch, StoreError> {
        let branch = Branch {
            id: BranchId::new(),
            session_id: session.clone(),
            label: label.to_string(),
            base_count,
            created_at: Utc::now(),
        };
        self.inner.write().await.branches.push(branch.clone());
        Ok(branch)
    }

    async fn get_branch(
        &self,
        session: &SessionId,
        id: &BranchId,
    ) -> Result<Option<Branch>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .branches
            .iter()
            .find(|b| b.id == *id && b.session_id == *session)
            .cloned())
    }

    async fn list_branches(&self, session: &SessionId) -> Result<Vec<Branch>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .branches
            .iter()
            .filter(|b| b.session_id == *session)
            .cloned()
            .collect())
    }

    async fn delete_branch(
        &self,
        session: &SessionId,
        id: &BranchId,
    ) -> Result<bool, StoreError> {
        let mut inner = self.inner.write().await;
        let before = inner.branches.len();
        inner
            .branches
            .retain(|b| !(b.id == *id && b.session_id == *session));
        Ok(inner.branches.len() < before)
    }

    async fn get_summary(
        &self,
        session: &SessionId,
        chunk_index: usize,
    ) -> Result<Option<Summary>, StoreError> {
        let inner = self.inner.read().await;
        Ok(inner
            .summaries
            .iter()
            .find(|s| s.session_id == *session && s.chunk_index == chunk_index)
            .cloned())
    }

    async fn create_summary(
        &self,
        session: &SessionId,
        chunk_index: usize,
        content: &str,
    ) -> Result<Summary, StoreError> {
        let mut inner = self.inner.write().await;
        // Write-once: on a (session, chunk) conflict the existing row wins
        if let Some(existing) = inner
            .summaries
            .iter()
            .find(|s| s.session_id == *session && s.chunk_index == chunk_index)
        {
            return Ok(existing.clone());
        }
        let summary = Summary {
            session_id: session.clone(),
            chunk_index,
            content: content.to_string(),
            created_at: Utc::now(),
        };
        inner.summaries.push(summary.clone());
        Ok(summary)
    }

    async fn list_summaries(&self, session: &SessionId) -> Result<Vec<Summary>, StoreError> {
        let inner = self.inner.read().await;
        let mut out: Vec<Summary> = inner
            .summaries
            .iter()
            .filter(|s| s.session_id == *session)
            .cloned()
            .collect();
        out.sort_by_key(|s| s.chunk_index);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn session_round_trip() {
        let store = InMemoryStore::new();
        let created = store.create_session(Some("New chat")).await.unwrap();
        let fetched = store.get_session(&created.id).await.unwrap().unwrap();
        assert_eq!(fetched.title.as_deref(), Some("New chat"));
        assert!(fetched.facts.is_empty());
    }

    #[tokio::test]
    async fn facts_overwrite_wholesale() {
        let store = InMemoryStore::new();
        let session = store.create_session(None).await.unwrap();

        let mut v1 = FactMap::new();
        v1.insert("goal", "ship v1");
        v1.insert("owner", "alice");
        store.set_session_facts(&session.id, &v1).await.unwrap();

        let mut v2 = FactMap::new();
        v2.insert("goal", "ship v2");
        store.set_session_facts(&session.id, &v2).await.unwrap();

        // Last write wins; no per-key versioning
        let fetched = store.get_session(&session.id).await.unwrap().unwrap();
        assert_eq!(fetched.facts, v2);
    }

    #[tokio::test]
    async fn message_scopes() {
        let store = InMemoryStore::new();
        let session = store.create_session(None).await.unwrap();
        store
            .append_message(&session.id, None, Role::User, "root")
            .await
            .unwrap();
        let branch = store.create_branch(&session.id, "b", 1).await.unwrap();
        store
            .append_message(&session.id, Some(&branch.id), Role::User, "branched")
            .await
            .unwrap();

        let root = store
            .list_messages(&session.id, MessageScope::Root)
            .await
            .unwrap();
        assert_eq!(root.len(), 1);
        let tagged = store
            .list_messages(&session.id, MessageScope::Branch(branch.id.clone()))
            .await
            .unwrap();
        assert_eq!(tagged.len(), 1);
        assert_eq!(tagged[0].content, "branched");
        let all = store
            .list_messages(&session.id, MessageScope::All)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(store.count_root_messages(&session.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn summary_cache_is_write_once() {
        let store = InMemoryStore::new();
        let session = store.create_session(None).await.unwrap();

        let first = store
            .create_summary(&session.id, 0, "original")
            .await
            .unwrap();
        let second = store
            .create_summary(&session.id, 0, "duplicate from a racing turn")
            .await
            .unwrap();
        assert_eq!(first.content, "original");
        assert_eq!(second.content, "original");
        assert_eq!(store.list_summaries(&session.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn delete_branch_is_idempotent() {
        let store = InMemoryStore::new();
        let session = store.create_session(None).await.unwrap();
        let branch = store.create_branch(&session.id, "b", 0).await.unwrap();

        assert!(store.delete_branch(&session.id, &branch.id).await.unwrap());
        assert!(!store.delete_branch(&session.id, &branch.id).await.unwrap());
    }
}
