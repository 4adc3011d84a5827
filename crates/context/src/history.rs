//! Branch resolver — reconstructs the effective message sequence for a
//! session + optional branch.
//!
//! Branching is copy-on-fork-point: a branch shares an immutable prefix of
//! `base_count` root messages with its parent and diverges strictly after
//! the fork point. No merging back is supported.

use braid_core::error::StoreError;
use braid_core::message::{BranchId, ChatMessage, SessionId};
use braid_core::store::{ChatStore, MessageScope};
use tracing::debug;

/// Resolve the effective ordered history a context strategy should see.
///
/// - No branch: all root-branch messages, oldest first.
/// - Known branch: the first `base_count` root messages, then every
///   message tagged with the branch, each oldest first.
/// - Unknown branch for this session: an empty history. Callers treat
///   "no such branch" as "no history yet", not as an error.
///
/// Read-only; no side effects.
pub async fn resolve_history(
    store: &dyn ChatStore,
    session: &SessionId,
    branch: Option<&BranchId>,
) -> Result<Vec<ChatMessage>, StoreError> {
    let Some(branch_id) = branch else {
        let root = store.list_messages(session, MessageScope::Root).await?;
        return Ok(root.iter().map(|m| m.to_chat()).collect());
    };

    let Some(branch) = store.get_branch(session, branch_id).await? else {
        debug!(session = %session, branch = %branch_id, "Unknown branch — resolving to empty history");
        return Ok(Vec::new());
    };

    let root = store.list_messages(session, MessageScope::Root).await?;
    let tail = store
        .list_messages(session, MessageScope::Branch(branch.id.clone()))
        .await?;

    let mut effective: Vec<ChatMessage> = root
        .iter()
        .take(branch.base_count)
        .map(|m| m.to_chat())
        .collect();
    effective.extend(tail.iter().map(|m| m.to_chat()));
    Ok(effective)
}

#[cfg(test)]
mod tests {
    use super::*;
    use braid_core::message::Role;
    use braid_store::InMemoryStore;

    async fn seeded_store() -> (InMemoryStore, SessionId) {
        let store = InMemoryStore::new();
        let session = store.create_session(Some("test")).await.unwrap();
        (store, session.id)
    }

    #[tokio::test]
    async fn root_history_in_creation_order() {
        let (store, sid) = seeded_store().await;
        for i in 0..4 {
            store
                .append_message(&sid, None, Role::User, &format!("msg {i}"))
                .await
                .unwrap();
        }

        let history = resolve_history(&store, &sid, None).await.unwrap();
        assert_eq!(history.len(), 4);
        assert_eq!(history[0].content, "msg 0");
        assert_eq!(history[3].content, "msg 3");
    }

    #[tokio::test]
    async fn unknown_branch_resolves_empty() {
        let (store, sid) = seeded_store().await;
        store
            .append_message(&sid, None, Role::User, "root msg")
            .await
            .unwrap();

        let ghost = BranchId::from("no-such-branch");
        let history = resolve_history(&store, &sid, Some(&ghost)).await.unwrap();
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn branch_is_prefix_plus_tail() {
        let (store, sid) = seeded_store().await;
        for i in 0..6 {
            store
                .append_message(&sid, None, Role::User, &format!("root {i}"))
                .await
                .unwrap();
        }

        // Fork after the first 3 root messages
        let branch = store.create_branch(&sid, "alt take", 3).await.unwrap();
        store
            .append_message(&sid, Some(&branch.id), Role::User, "branch a")
            .await
            .unwrap();
        store
            .append_message(&sid, Some(&branch.id), Role::Assistant, "branch b")
            .await
            .unwrap();

        let history = resolve_history(&store, &sid, Some(&branch.id)).await.unwrap();
        assert_eq!(history.len(), 5);

        // First k entries equal the root branch's first k messages
        let root = resolve_history(&store, &sid, None).await.unwrap();
        assert_eq!(&history[..3], &root[..3]);

        // Remainder is exactly the branch-tagged messages in order
        assert_eq!(history[3].content, "branch a");
        assert_eq!(history[4].content, "branch b");

        // Root messages 3..6 never leak into the branch view
        assert!(history.iter().all(|m| m.content != "root 4"));
    }

    #[tokio::test]
    async fn branch_with_zero_base_sees_only_its_tail() {
        let (store, sid) = seeded_store().await;
        store
            .append_message(&sid, None, Role::User, "root only")
            .await
            .unwrap();

        let branch = store.create_branch(&sid, "fresh", 0).await.unwrap();
        store
            .append_message(&sid, Some(&branch.id), Role::User, "own first")
            .await
            .unwrap();

        let history = resolve_history(&store, &sid, Some(&branch.id)).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "own first");
    }

    #[tokio::test]
    async fn branch_of_another_session_is_invisible() {
        let (store, sid) = seeded_store().await;
        let other = store.create_session(None).await.unwrap();
        let foreign = store.create_branch(&other.id, "theirs", 0).await.unwrap();

        store
            .append_message(&sid, None, Role::User, "mine")
            .await
            .unwrap();

        let history = resolve_history(&store, &sid, Some(&foreign.id)).await.unwrap();
        assert!(history.is_empty());
    }
}
