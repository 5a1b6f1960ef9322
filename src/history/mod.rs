use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::core::errors::ApiError;

const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    fn label(role: &str) -> &'static str {
        match role {
            "assistant" => "Assistant",
            _ => "User",
        }
    }
}

/// Conversation memory keyed by session id, capped at `max_history` exchanges.
#[derive(Debug, Clone)]
pub struct SessionManager {
    db_path: PathBuf,
    pool: SqlitePool,
    max_history: usize,
}

impl SessionManager {
    pub async fn new(db_path: PathBuf, max_history: usize) -> Result<Self, ApiError> {
        let connect_options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(8)
            .acquire_timeout(Duration::from_secs(5))
            .connect_with(connect_options)
            .await
            .map_err(ApiError::internal)?;

        let manager = Self {
            db_path,
            pool,
            max_history,
        };
        manager.init_db().await?;
        Ok(manager)
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    fn retained_messages(&self) -> i64 {
        (self.max_history * 2) as i64
    }

    async fn init_db(&self) -> Result<(), ApiError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;

        if version != SCHEMA_VERSION {
            self.rebuild_schema().await?;
        }
        Ok(())
    }

    async fn rebuild_schema(&self) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;

        for statement in [
            "DROP TABLE IF EXISTS messages",
            "DROP TABLE IF EXISTS sessions",
            "\
            CREATE TABLE sessions (
                id TEXT PRIMARY KEY,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                updated_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )",
            "\
            CREATE TABLE messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id TEXT NOT NULL,
                role TEXT NOT NULL CHECK(role IN ('user', 'assistant')),
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now')),
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            )",
            "CREATE INDEX idx_messages_session_id_id ON messages(session_id, id)",
        ] {
            sqlx::query(statement)
                .execute(&mut *tx)
                .await
                .map_err(ApiError::internal)?;
        }

        let pragma = format!("PRAGMA user_version = {}", SCHEMA_VERSION);
        sqlx::query(&pragma)
            .execute(&mut *tx)
            .await
            .map_err(ApiError::internal)?;

        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    pub async fn create_session(&self) -> Result<String, ApiError> {
        let session_id = format!("session_{}", uuid::Uuid::new_v4().simple());
        sqlx::query("INSERT INTO sessions (id) VALUES (?1)")
            .bind(&session_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        tracing::debug!("Created session {}", session_id);
        Ok(session_id)
    }

    pub async fn session_exists(&self, session_id: &str) -> Result<bool, ApiError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sessions WHERE id = ?1")
            .bind(session_id)
            .fetch_one(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(count > 0)
    }

    pub async fn add_message(
        &self,
        session_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        ensure_session(&mut tx, session_id).await?;
        insert_message(&mut tx, session_id, role, content).await?;
        self.prune(&mut tx, session_id).await?;
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    /// Records a user question and the assistant's answer in one transaction.
    pub async fn add_exchange(
        &self,
        session_id: &str,
        user_message: &str,
        assistant_message: &str,
    ) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await.map_err(ApiError::internal)?;
        ensure_session(&mut tx, session_id).await?;
        insert_message(&mut tx, session_id, MessageRole::User, user_message).await?;
        insert_message(&mut tx, session_id, MessageRole::Assistant, assistant_message).await?;
        self.prune(&mut tx, session_id).await?;
        tx.commit().await.map_err(ApiError::internal)?;
        Ok(())
    }

    /// Renders retained messages as `User: ...` / `Assistant: ...` lines.
    pub async fn get_conversation_history(
        &self,
        session_id: &str,
    ) -> Result<Option<String>, ApiError> {
        let rows = sqlx::query(
            "\
            SELECT role, content FROM (
                SELECT id, role, content FROM messages
                WHERE session_id = ?1
                ORDER BY id DESC
                LIMIT ?2
            ) ORDER BY id ASC",
        )
        .bind(session_id)
        .bind(self.retained_messages())
        .fetch_all(&self.pool)
        .await
        .map_err(ApiError::internal)?;

        if rows.is_empty() {
            return Ok(None);
        }

        let mut lines = Vec::with_capacity(rows.len());
        for row in rows {
            let role: String = row.try_get("role").map_err(ApiError::internal)?;
            let content: String = row.try_get("content").map_err(ApiError::internal)?;
            lines.push(format!("{}: {}", MessageRole::label(&role), content));
        }
        Ok(Some(lines.join("\n")))
    }

    /// Deletes the session and its messages. Returns whether it existed.
    pub async fn clear_session(&self, session_id: &str) -> Result<bool, ApiError> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(ApiError::internal)?;
        Ok(result.rows_affected() > 0)
    }

    async fn prune(
        &self,
        tx: &mut Transaction<'_, Sqlite>,
        session_id: &str,
    ) -> Result<(), ApiError> {
        sqlx::query(
            "\
            DELETE FROM messages
            WHERE session_id = ?1
              AND id NOT IN (
                SELECT id FROM messages WHERE session_id = ?1 ORDER BY id DESC LIMIT ?2
              )",
        )
        .bind(session_id)
        .bind(self.retained_messages())
        .execute(&mut **tx)
        .await
        .map_err(ApiError::internal)?;
        Ok(())
    }
}

async fn ensure_session(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &str,
) -> Result<(), ApiError> {
    sqlx::query("INSERT OR IGNORE INTO sessions (id) VALUES (?1)")
        .bind(session_id)
        .execute(&mut **tx)
        .await
        .map_err(ApiError::internal)?;
    sqlx::query(
        "UPDATE sessions SET updated_at = STRFTIME('%Y-%m-%dT%H:%M:%fZ', 'now') WHERE id = ?1",
    )
    .bind(session_id)
    .execute(&mut **tx)
    .await
    .map_err(ApiError::internal)?;
    Ok(())
}

async fn insert_message(
    tx: &mut Transaction<'_, Sqlite>,
    session_id: &str,
    role: MessageRole,
    content: &str,
) -> Result<(), ApiError> {
    sqlx::query("INSERT INTO messages (session_id, role, content) VALUES (?1, ?2, ?3)")
        .bind(session_id)
        .bind(role.as_str())
        .bind(content)
        .execute(&mut **tx)
        .await
        .map_err(ApiError::internal)?;
    Ok(())
}
