//! SQLite store backed by sqlx.
//!
//! One database file, four tables:
//! - `sessions`  — id, title, fact memory (JSON text), created_at
//! - `branches`  — fork records with their immutable `base_count`
//! - `messages`  — the append-only log; `branch_id IS NULL` marks the root
//! - `summaries` — write-once chunk cache, PRIMARY KEY (session_id, chunk_index)
//!
//! Timestamps are RFC 3339 text; ordering queries sort on them directly.

use async_trait::async_trait;
use braid_core::error::StoreError;
use braid_core::facts::FactMap;
use braid_core::message::{Branch, BranchId, Role, Session, SessionId, StoredMessage, Summary};
use braid_core::store::{ChatStore, MessageScope};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// A production SQLite store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and create if missing) the database at `path`.
    ///
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database
    /// (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // An in-memory database exists per connection, so the pool must not
        // grow past one or queries would see empty databases.
        let max_connections = if path.contains(":memory:") { 1 } else { 4 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        let store = Self { pool };
        store.run_migrations().await?;
        info!("SQLite store initialized at {path}");
        Ok(store)
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id         TEXT PRIMARY KEY,
                title      TEXT,
                facts      TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("sessions table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS branches (
                id         TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                label      TEXT NOT NULL,
                base_count INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("branches table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id         TEXT PRIMARY KEY,
                session_id TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                branch_id  TEXT,
                role       TEXT NOT NULL,
                content    TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_messages_session_created
             ON messages(session_id, created_at)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        // The composite primary key is what makes racing summary writes safe.
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS summaries (
                session_id  TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
                chunk_index INTEGER NOT NULL,
                content     TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                PRIMARY KEY (session_id, chunk_index)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("summaries table: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, StoreError> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))
    }

    fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let title: Option<String> = row
            .try_get("title")
            .map_err(|e| StoreError::QueryFailed(format!("title column: {e}")))?;
        let facts_json: String = row
            .try_get("facts")
            .map_err(|e| StoreError::QueryFailed(format!("facts column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(Session {
            id: SessionId(id),
            title,
            facts: serde_json::from_str(&facts_json).unwrap_or_default(),
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }

    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<StoredMessage, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let session_id: String = row
            .try_get("session_id")
            .map_err(|e| StoreError::QueryFailed(format!("session_id column: {e}")))?;
        let branch_id: Option<String> = row
            .try_get("branch_id")
            .map_err(|e| StoreError::QueryFailed(format!("branch_id column: {e}")))?;
        let role_raw: String = row
            .try_get("role")
            .map_err(|e| StoreError::QueryFailed(format!("role column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        let role = Role::parse(&role_raw)
            .ok_or_else(|| StoreError::QueryFailed(format!("unknown role '{role_raw}'")))?;

        Ok(StoredMessage {
            id,
            session_id: SessionId(session_id),
            branch_id: branch_id.map(BranchId),
            role,
            content,
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }

    fn row_to_branch(row: &sqlx::sqlite::SqliteRow) -> Result<Branch, StoreError> {
        let id: String = row
            .try_get("id")
            .map_err(|e| StoreError::QueryFailed(format!("id column: {e}")))?;
        let session_id: String = row
            .try_get("session_id")
            .map_err(|e| StoreError::QueryFailed(format!("session_id column: {e}")))?;
        let label: String = row
            .try_get("label")
            .map_err(|e| StoreError::QueryFailed(format!("label column: {e}")))?;
        let base_count: i64 = row
            .try_get("base_count")
            .map_err(|e| StoreError::QueryFailed(format!("base_count column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(Branch {
            id: BranchId(id),
            session_id: SessionId(session_id),
            label,
            base_count: base_count.max(0) as usize,
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }

    fn row_to_summary(row: &sqlx::sqlite::SqliteRow) -> Result<Summary, StoreError> {
        let session_id: String = row
            .try_get("session_id")
            .map_err(|e| StoreError::QueryFailed(format!("session_id column: {e}")))?;
        let chunk_index: i64 = row
            .try_get("chunk_index")
            .map_err(|e| StoreError::QueryFailed(format!("chunk_index column: {e}")))?;
        let content: String = row
            .try_get("content")
            .map_err(|e| StoreError::QueryFailed(format!("content column: {e}")))?;
        let created_at: String = row
            .try_get("created_at")
            .map_err(|e| StoreError::QueryFailed(format!("created_at column: {e}")))?;

        Ok(Summary {
            session_id: SessionId(session_id),
            chunk_index: chunk_index.max(0) as usize,
            content,
            created_at: Self::parse_timestamp(&created_at)?,
        })
    }
}

#[async_trait]
impl ChatStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_session(&self, title: Option<&str>) -> Result<Session, StoreError> {
        let session = Session {
            id: SessionId::new(),
            title: title.map(String::from),
            facts: FactMap::new(),
            created_at: Utc::now(),
        };

        sqlx::query(
            "INSERT INTO sessions (id, title, facts, created_at) VALUES (?1, ?2, '{}', ?3)",
        )
        .bind(&session.id.0)
        .bind(&session.title)
        .bind(session.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT session: {e}")))?;

        debug!(session = %session.id, "Created session");
        Ok(session)
    }

    async fn get_session(&self, id: &SessionId) -> Result<Option<Session>, StoreError> {
        let row = sqlx::query("SELECT * FROM sessions WHERE id = ?1")
            .bind(&id.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SELECT session: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_session(r)?)),
            None => Ok(None),
        }
    }

    async fn list_sessions(&self) -> Result<Vec<Session>, StoreError> {
        let rows = sqlx::query("SELECT * FROM sessions ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SELECT sessions: {e}")))?;

        rows.iter().map(Self::row_to_session).collect()
    }

    async fn set_session_title(&self, id: &SessionId, title: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE sessions SET title = ?1 WHERE id = ?2")
            .bind(title)
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE title: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SessionNotFound(id.to_string()));
        }
        Ok(())
    }

    async fn set_session_facts(&self, id: &SessionId, facts: &FactMap) -> Result<(), StoreError> {
        let facts_json = serde_json::to_string(facts)
            .map_err(|e| StoreError::Storage(format!("Facts serialization: {e}")))?;

        let result = sqlx::query("UPDATE sessions SET facts = ?1 WHERE id = ?2")
            .bind(&facts_json)
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE facts: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::SessionNotFound(id.to_string()));
        }
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

        sqlx::query(
            "INSERT INTO messages (id, session_id, branch_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )
        .bind(&message.id)
        .bind(&message.session_id.0)
        .bind(message.branch_id.as_ref().map(|b| b.0.as_str()))
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT message: {e}")))?;

        Ok(message)
    }

    async fn list_messages(
        &self,
        session: &SessionId,
        scope: MessageScope,
    ) -> Result<Vec<StoredMessage>, StoreError> {
        let rows = match scope {
            MessageScope::Root => {
                sqlx::query(
                    "SELECT * FROM messages
                     WHERE session_id = ?1 AND branch_id IS NULL
                     ORDER BY created_at ASC",
                )
                .bind(&session.0)
                .fetch_all(&self.pool)
                .await
            }
            MessageScope::Branch(branch_id) => {
                sqlx::query(
                    "SELECT * FROM messages
                     WHERE session_id = ?1 AND branch_id = ?2
                     ORDER BY created_at ASC",
                )
                .bind(&session.0)
                .bind(&branch_id.0)
                .fetch_all(&self.pool)
                .await
            }
            MessageScope::All => {
                sqlx::query(
                    "SELECT * FROM messages WHERE session_id = ?1 ORDER BY created_at ASC",
                )
                .bind(&session.0)
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| StoreError::QueryFailed(format!("SELECT messages: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn count_root_messages(&self, session: &SessionId) -> Result<usize, StoreError> {
        let row = sqlx::query(
            "SELECT COUNT(*) as cnt FROM messages
             WHERE session_id = ?1 AND branch_id IS NULL",
        )
        .bind(&session.0)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("COUNT messages: {e}")))?;

        let cnt: i64 = row
            .try_get("cnt")
            .map_err(|e| StoreError::QueryFailed(format!("cnt column: {e}")))?;
        Ok(cnt.max(0) as usize)
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

        sqlx::query(
            "INSERT INTO branches (id, session_id, label, base_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(&branch.id.0)
        .bind(&branch.session_id.0)
        .bind(&branch.label)
        .bind(branch.base_count as i64)
        .bind(branch.created_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT branch: {e}")))?;

        debug!(session = %session, branch = %branch.id, base_count, "Created branch");
        Ok(branch)
    }

    async fn get_branch(
        &self,
        session: &SessionId,
        id: &BranchId,
    ) -> Result<Option<Branch>, StoreError> {
        let row = sqlx::query("SELECT * FROM branches WHERE id = ?1 AND session_id = ?2")
            .bind(&id.0)
            .bind(&session.0)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("SELECT branch: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_branch(r)?)),
            None => Ok(None),
        }
    }

    async fn list_branches(&self, session: &SessionId) -> Result<Vec<Branch>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM branches WHERE session_id = ?1 ORDER BY created_at ASC",
        )
        .bind(&session.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT branches: {e}")))?;

        rows.iter().map(Self::row_to_branch).collect()
    }

    async fn delete_branch(
        &self,
        session: &SessionId,
        id: &BranchId,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM branches WHERE id = ?1 AND session_id = ?2")
            .bind(&id.0)
            .bind(&session.0)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE branch: {e}")))?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_summary(
        &self,
        session: &SessionId,
        chunk_index: usize,
    ) -> Result<Option<Summary>, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM summaries WHERE session_id = ?1 AND chunk_index = ?2",
        )
        .bind(&session.0)
        .bind(chunk_index as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT summary: {e}")))?;

        match row {
            Some(ref r) => Ok(Some(Self::row_to_summary(r)?)),
            None => Ok(None),
        }
    }

    async fn create_summary(
        &self,
        session: &SessionId,
        chunk_index: usize,
        content: &str,
    ) -> Result<Summary, StoreError> {
        // Write-once: two turns racing on the same chunk both execute this
        // insert; the conflict clause keeps the first row and the read-back
        // below returns it to both callers.
        sqlx::query(
            "INSERT INTO summaries (session_id, chunk_index, content, created_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(session_id, chunk_index) DO NOTHING",
        )
        .bind(&session.0)
        .bind(chunk_index as i64)
        .bind(content)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT summary: {e}")))?;

        self.get_summary(session, chunk_index)
            .await?
            .ok_or_else(|| StoreError::Storage("summary vanished after insert".into()))
    }

    async fn list_summaries(&self, session: &SessionId) -> Result<Vec<Summary>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM summaries WHERE session_id = ?1 ORDER BY chunk_index ASC",
        )
        .bind(&session.0)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("SELECT summaries: {e}")))?;

        rows.iter().map(Self::row_to_summary).collect()
    }
}
