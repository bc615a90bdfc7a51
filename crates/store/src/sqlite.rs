//! SQLite session store.
//!
//! Uses a single SQLite database file with three tables:
//! - `groups`: conversation containers
//! - `group_agents`: membership, cascading on group delete
//! - `messages`: append-only history with an autoincrement sequence id
//!
//! Metadata is stored as JSON text; timestamps as RFC 3339 strings.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use huddle_core::document::DocumentRef;
use huddle_core::error::StoreError;
use huddle_core::message::{DOCUMENT_UPLOAD, Group, Message, Metadata, NewMessage, Role};
use huddle_core::store::SessionStore;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A durable SQLite-backed session store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new SQLite store from a connection string or file path.
    ///
    /// The database and all tables/indexes are created automatically.
    /// Pass `"sqlite::memory:"` for an in-process ephemeral database (useful for tests).
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(path)
            .map_err(|e| StoreError::Storage(format!("Invalid SQLite path: {e}")))?;
        Self::connect(options, path.contains(":memory:")).await
    }

    /// Open (creating if needed) a database file, including its parent directory.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| {
                    StoreError::Storage(format!("Failed to create {}: {e}", parent.display()))
                })?;
        }
        let store = Self::connect(SqliteConnectOptions::new().filename(path), false).await?;
        info!("SQLite session store initialized at {}", path.display());
        Ok(store)
    }

    async fn connect(options: SqliteConnectOptions, in_memory: bool) -> Result<Self, StoreError> {
        let options = options
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .pragma("foreign_keys", "ON");

        // Every connection to `:memory:` is a separate database
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .map_err(|e| StoreError::Storage(format!("Failed to open SQLite: {e}")))?;

        Self::from_pool(pool).await
    }

    /// Create from an existing pool (useful for testing).
    pub async fn from_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Run schema migrations: tables and indexes.
    async fn run_migrations(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS groups (
                id          TEXT PRIMARY KEY,
                name        TEXT NOT NULL,
                created_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("groups table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS group_agents (
                group_id    TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                agent_key   TEXT NOT NULL,
                added_at    TEXT NOT NULL,
                PRIMARY KEY (group_id, agent_key)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("group_agents table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                group_id    TEXT NOT NULL REFERENCES groups(id) ON DELETE CASCADE,
                sender      TEXT NOT NULL,
                role        TEXT NOT NULL,
                content     TEXT NOT NULL,
                metadata    TEXT NOT NULL DEFAULT '{}',
                created_at  TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::MigrationFailed(format!("messages table: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_messages_group ON messages(group_id, id)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("messages index: {e}")))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_groups_updated_at ON groups(updated_at DESC)")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::MigrationFailed(format!("groups index: {e}")))?;

        debug!("SQLite migrations complete");
        Ok(())
    }

    fn parse_time(raw: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(raw)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now())
    }

    /// Parse a `Message` from a SQLite row.
    fn row_to_message(row: &sqlx::sqlite::SqliteRow) -> Result<Message, StoreError> {
        let column =
            |name: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{name} column: {e}"));

        let id: i64 = row.try_get("id").map_err(|e| column("id", e))?;
        let group_id: String = row.try_get("group_id").map_err(|e| column("group_id", e))?;
        let sender: String = row.try_get("sender").map_err(|e| column("sender", e))?;
        let role_str: String = row.try_get("role").map_err(|e| column("role", e))?;
        let content: String = row.try_get("content").map_err(|e| column("content", e))?;
        let metadata_json: String = row.try_get("metadata").map_err(|e| column("metadata", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;

        let role = Role::from_str(&role_str).map_err(StoreError::QueryFailed)?;
        let metadata: Metadata = serde_json::from_str(&metadata_json).unwrap_or_else(|e| {
            warn!(message_id = id, "Unreadable message metadata: {e}");
            Metadata::new()
        });

        Ok(Message {
            id,
            group_id,
            sender,
            role,
            content,
            metadata,
            created_at: Self::parse_time(&created_at),
        })
    }

    fn row_to_group(
        row: &sqlx::sqlite::SqliteRow,
        members: Vec<String>,
    ) -> Result<Group, StoreError> {
        let column =
            |name: &str, e: sqlx::Error| StoreError::QueryFailed(format!("{name} column: {e}"));

        let id: String = row.try_get("id").map_err(|e| column("id", e))?;
        let name: String = row.try_get("name").map_err(|e| column("name", e))?;
        let created_at: String = row.try_get("created_at").map_err(|e| column("created_at", e))?;
        let updated_at: String = row.try_get("updated_at").map_err(|e| column("updated_at", e))?;

        Ok(Group {
            id,
            name,
            created_at: Self::parse_time(&created_at),
            updated_at: Self::parse_time(&updated_at),
            members,
        })
    }

    async fn touch_group(&self, group_id: &str) -> Result<(), StoreError> {
        sqlx::query("UPDATE groups SET updated_at = ?1 WHERE id = ?2")
            .bind(timestamp(Utc::now()))
            .bind(group_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE groups failed: {e}")))?;
        Ok(())
    }

    async fn require_group(&self, group_id: &str) -> Result<(), StoreError> {
        let exists = sqlx::query("SELECT 1 FROM groups WHERE id = ?1")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Group lookup: {e}")))?;
        match exists {
            Some(_) => Ok(()),
            None => Err(StoreError::GroupNotFound(group_id.to_string())),
        }
    }
}

/// Fixed precision so stored timestamps sort lexically.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

#[async_trait]
impl SessionStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn create_group(&self, name: &str) -> Result<Group, StoreError> {
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let stamp = timestamp(now);

        sqlx::query("INSERT INTO groups (id, name, created_at, updated_at) VALUES (?1, ?2, ?3, ?3)")
            .bind(&id)
            .bind(name)
            .bind(&stamp)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("INSERT groups failed: {e}")))?;

        debug!(group_id = %id, "Created group");
        Ok(Group {
            id,
            name: name.to_string(),
            created_at: Self::parse_time(&stamp),
            updated_at: Self::parse_time(&stamp),
            members: Vec::new(),
        })
    }

    async fn get_group(&self, group_id: &str) -> Result<Option<Group>, StoreError> {
        let row = sqlx::query("SELECT * FROM groups WHERE id = ?1")
            .bind(group_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("Get group: {e}")))?;

        match row {
            Some(row) => {
                let members = self.list_group_agents(group_id).await?;
                Ok(Some(Self::row_to_group(&row, members)?))
            }
            None => Ok(None),
        }
    }

    async fn list_groups(&self) -> Result<Vec<Group>, StoreError> {
        let rows = sqlx::query("SELECT * FROM groups ORDER BY updated_at DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::QueryFailed(format!("List groups: {e}")))?;

        let member_rows =
            sqlx::query("SELECT group_id, agent_key FROM group_agents ORDER BY agent_key")
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::QueryFailed(format!("List memberships: {e}")))?;

        let mut members: HashMap<String, Vec<String>> = HashMap::new();
        for row in &member_rows {
            let group_id: String = row
                .try_get("group_id")
                .map_err(|e| StoreError::QueryFailed(format!("group_id column: {e}")))?;
            let agent_key: String = row
                .try_get("agent_key")
                .map_err(|e| StoreError::QueryFailed(format!("agent_key column: {e}")))?;
            members.entry(group_id).or_default().push(agent_key);
        }

        rows.iter()
            .map(|row| {
                let id: String = row.try_get("id").unwrap_or_default();
                Self::row_to_group(row, members.remove(&id).unwrap_or_default())
            })
            .collect()
    }

    async fn rename_group(&self, group_id: &str, name: &str) -> Result<(), StoreError> {
        let result = sqlx::query("UPDATE groups SET name = ?1, updated_at = ?2 WHERE id = ?3")
            .bind(name)
            .bind(timestamp(Utc::now()))
            .bind(group_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE groups failed: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::GroupNotFound(group_id.to_string()));
        }
        Ok(())
    }

    async fn delete_group(&self, group_id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM groups WHERE id = ?1")
            .bind(group_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE groups failed: {e}")))?;

        let deleted = result.rows_affected() > 0;
        if deleted {
            info!(group_id, "Deleted group");
        }
        Ok(deleted)
    }

    async fn add_agent_to_group(&self, group_id: &str, agent_key: &str) -> Result<(), StoreError> {
        self.require_group(group_id).await?;

        let result = sqlx::query(
            "INSERT OR IGNORE INTO group_agents (group_id, agent_key, added_at) \
             VALUES (?1, ?2, ?3)",
        )
        .bind(group_id)
        .bind(agent_key)
        .bind(timestamp(Utc::now()))
        .execute(&self.pool)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT group_agents failed: {e}")))?;

        if result.rows_affected() > 0 {
            self.touch_group(group_id).await?;
        }
        Ok(())
    }

    async fn remove_agent_from_group(
        &self,
        group_id: &str,
        agent_key: &str,
    ) -> Result<(), StoreError> {
        self.require_group(group_id).await?;

        let result = sqlx::query("DELETE FROM group_agents WHERE group_id = ?1 AND agent_key = ?2")
            .bind(group_id)
            .bind(agent_key)
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Storage(format!("DELETE group_agents failed: {e}")))?;

        if result.rows_affected() > 0 {
            self.touch_group(group_id).await?;
        }
        Ok(())
    }

    async fn list_group_agents(&self, group_id: &str) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query(
            "SELECT agent_key FROM group_agents WHERE group_id = ?1 ORDER BY agent_key",
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("List group agents: {e}")))?;

        rows.iter()
            .map(|row| {
                row.try_get("agent_key")
                    .map_err(|e| StoreError::QueryFailed(format!("agent_key column: {e}")))
            })
            .collect()
    }

    async fn append_message(&self, message: NewMessage) -> Result<Message, StoreError> {
        self.require_group(&message.group_id).await?;

        let now = Utc::now();
        let stamp = timestamp(now);
        let metadata_json = serde_json::to_string(&message.metadata)
            .map_err(|e| StoreError::Storage(format!("Metadata serialization: {e}")))?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StoreError::Storage(format!("Begin transaction: {e}")))?;

        let result = sqlx::query(
            r#"
            INSERT INTO messages (group_id, sender, role, content, metadata, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&message.group_id)
        .bind(&message.sender)
        .bind(message.role.as_str())
        .bind(&message.content)
        .bind(&metadata_json)
        .bind(&stamp)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::Storage(format!("INSERT messages failed: {e}")))?;

        sqlx::query("UPDATE groups SET updated_at = ?1 WHERE id = ?2")
            .bind(&stamp)
            .bind(&message.group_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Storage(format!("UPDATE groups failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| StoreError::Storage(format!("Commit failed: {e}")))?;

        let id = result.last_insert_rowid();
        debug!(
            group_id = %message.group_id,
            message_id = id,
            role = %message.role,
            "Appended message"
        );
        Ok(message.into_message(id, Self::parse_time(&stamp)))
    }

    async fn get_history(&self, group_id: &str, limit: usize) -> Result<Vec<Message>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT * FROM messages WHERE group_id = ?1 ORDER BY id DESC LIMIT ?2
            ) ORDER BY id ASC
            "#,
        )
        .bind(group_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("Get history: {e}")))?;

        rows.iter().map(Self::row_to_message).collect()
    }

    async fn list_documents(&self, group_id: &str) -> Result<Vec<DocumentRef>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM messages
            WHERE group_id = ?1 AND json_extract(metadata, '$.message_type') = ?2
            ORDER BY id DESC
            "#,
        )
        .bind(group_id)
        .bind(DOCUMENT_UPLOAD)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StoreError::QueryFailed(format!("List documents: {e}")))?;

        let mut documents = Vec::with_capacity(rows.len());
        for row in &rows {
            if let Some(doc) = DocumentRef::from_message(&Self::row_to_message(row)?) {
                documents.push(doc);
            }
        }
        Ok(documents)
    }
}
