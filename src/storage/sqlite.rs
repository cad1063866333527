use std::str::FromStr;

use chrono::{DateTime, Utc};
use sqlx::migrate::Migrator;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use tracing::info;

use super::{new_event_id, Event, EventDraft, EventMetadata, SessionRecord, Sender, Storage};
use crate::config::DatabaseConfig;
use crate::error::{StorageError, StorageResult};
use crate::stage::{SlotStore, Stage};

/// Static migrator that embeds migrations at compile time
static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed storage implementation
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage instance
    pub async fn new(config: &DatabaseConfig) -> StorageResult<Self> {
        // Ensure parent directory exists
        if let Some(parent) = config.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StorageError::Connection {
                message: format!("Failed to create database directory: {}", e),
            })?;
        }

        let database_url = format!("sqlite://{}?mode=rwc", config.path.display());

        let options = SqliteConnectOptions::from_str(&database_url)
            .map_err(|e| StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            })?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Create an in-memory storage instance (used by tests)
    pub async fn new_in_memory() -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            StorageError::Connection {
                message: format!("Invalid database URL: {}", e),
            }
        })?;

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Connection {
                message: format!("Failed to connect to database: {}", e),
            })?;

        let storage = Self { pool };
        storage.run_migrations().await?;

        Ok(storage)
    }

    /// Run database migrations using embedded sqlx migrations
    async fn run_migrations(&self) -> StorageResult<()> {
        info!("Running database migrations...");

        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| StorageError::Migration {
                message: format!("Failed to run migrations: {}", e),
            })?;

        info!("Database migrations completed successfully");
        Ok(())
    }

    /// Get the underlying pool for advanced queries
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait::async_trait]
impl Storage for SqliteStorage {
    async fn create_session(&self, session: &SessionRecord) -> StorageResult<()> {
        let slots = serde_json::to_string(&session.slots).unwrap_or_else(|_| "{}".to_string());

        sqlx::query(
            r#"
            INSERT INTO sessions (id, created_at, updated_at, stage, slots)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(session.created_at.to_rfc3339())
        .bind(session.updated_at.to_rfc3339())
        .bind(session.stage.as_str())
        .bind(&slots)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_session(&self, id: &str) -> StorageResult<Option<SessionRecord>> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, created_at, updated_at, stage, slots
            FROM sessions
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(SessionRecord::try_from).transpose()
    }

    async fn save_profile(&self, id: &str, slots: &SlotStore, stage: Stage) -> StorageResult<()> {
        let slots_json = serde_json::to_string(slots).unwrap_or_else(|_| "{}".to_string());

        let result = sqlx::query(
            r#"
            UPDATE sessions
            SET stage = ?, slots = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(stage.as_str())
        .bind(&slots_json)
        .bind(Utc::now().to_rfc3339())
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::SessionNotFound {
                session_id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn list_sessions(&self) -> StorageResult<Vec<String>> {
        let ids: Vec<String> =
            sqlx::query_scalar("SELECT id FROM sessions ORDER BY created_at ASC, id ASC")
                .fetch_all(&self.pool)
                .await?;

        Ok(ids)
    }

    async fn append_event(&self, session_id: &str, draft: EventDraft) -> StorageResult<Event> {
        let id = new_event_id();
        let timestamp = Utc::now();
        let metadata = serde_json::to_string(&draft.metadata).unwrap_or_else(|_| "{}".to_string());

        // The sequence number is computed inside the INSERT so the append is
        // a single atomic statement; UNIQUE(session_id, seq) rejects a racing
        // writer instead of interleaving.
        sqlx::query(
            r#"
            INSERT INTO events (id, session_id, seq, timestamp, stage, sender, content, metadata)
            VALUES (
                ?, ?,
                (SELECT COALESCE(MAX(seq), 0) + 1 FROM events WHERE session_id = ?),
                ?, ?, ?, ?, ?
            )
            "#,
        )
        .bind(&id)
        .bind(session_id)
        .bind(session_id)
        .bind(timestamp.to_rfc3339())
        .bind(draft.stage.as_str())
        .bind(draft.sender.to_string())
        .bind(&draft.content)
        .bind(&metadata)
        .execute(&self.pool)
        .await?;

        let seq: i64 = sqlx::query_scalar("SELECT seq FROM events WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await?;

        Ok(Event {
            id,
            session_id: session_id.to_string(),
            seq,
            timestamp,
            stage: draft.stage,
            sender: draft.sender,
            content: draft.content,
            metadata: draft.metadata,
        })
    }

    async fn get_events(&self, session_id: &str) -> StorageResult<Vec<Event>> {
        let rows: Vec<EventRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, seq, timestamp, stage, sender, content, metadata
            FROM events
            WHERE session_id = ?
            ORDER BY seq ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Event::try_from).collect()
    }

    async fn get_event(&self, session_id: &str, event_id: &str) -> StorageResult<Option<Event>> {
        let row: Option<EventRow> = sqlx::query_as(
            r#"
            SELECT id, session_id, seq, timestamp, stage, sender, content, metadata
            FROM events
            WHERE session_id = ? AND id = ?
            "#,
        )
        .bind(session_id)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Event::try_from).transpose()
    }

    async fn patch_event_metadata(
        &self,
        session_id: &str,
        event_id: &str,
        patch: &serde_json::Value,
    ) -> StorageResult<bool> {
        let mut tx = self.pool.begin().await?;

        let existing: Option<String> =
            sqlx::query_scalar("SELECT metadata FROM events WHERE session_id = ? AND id = ?")
                .bind(session_id)
                .bind(event_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some(existing) = existing else {
            return Ok(false);
        };

        let mut current: serde_json::Value =
            serde_json::from_str(&existing).unwrap_or_else(|_| serde_json::json!({}));

        if let (Some(current_map), Some(patch_map)) = (current.as_object_mut(), patch.as_object())
        {
            for (key, value) in patch_map {
                current_map.insert(key.clone(), value.clone());
            }
        }

        let merged = serde_json::to_string(&current).unwrap_or(existing);

        sqlx::query("UPDATE events SET metadata = ? WHERE session_id = ? AND id = ?")
            .bind(&merged)
            .bind(session_id)
            .bind(event_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(true)
    }
}

// Internal row types for SQLx mapping

#[derive(sqlx::FromRow)]
struct SessionRow {
    id: String,
    created_at: String,
    updated_at: String,
    stage: String,
    slots: String,
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    session_id: String,
    seq: i64,
    timestamp: String,
    stage: String,
    sender: String,
    content: String,
    metadata: String,
}

fn parse_timestamp(raw: &str, column: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::Query {
            message: format!("Invalid {} timestamp {:?}: {}", column, raw, e),
        })
}

impl TryFrom<SessionRow> for SessionRecord {
    type Error = StorageError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let stage = Stage::from_str(&row.stage).map_err(|e| StorageError::Query { message: e })?;
        let slots: SlotStore =
            serde_json::from_str(&row.slots).map_err(|e| StorageError::Query {
                message: format!("Invalid slot store for session {}: {}", row.id, e),
            })?;

        Ok(SessionRecord {
            created_at: parse_timestamp(&row.created_at, "created_at")?,
            updated_at: parse_timestamp(&row.updated_at, "updated_at")?,
            id: row.id,
            stage,
            slots,
        })
    }
}

impl TryFrom<EventRow> for Event {
    type Error = StorageError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        let stage = Stage::from_str(&row.stage).map_err(|e| StorageError::Query { message: e })?;
        let sender =
            Sender::from_str(&row.sender).map_err(|e| StorageError::Query { message: e })?;
        let metadata: EventMetadata =
            serde_json::from_str(&row.metadata).map_err(|e| StorageError::Query {
                message: format!("Invalid metadata for event {}: {}", row.id, e),
            })?;

        Ok(Event {
            timestamp: parse_timestamp(&row.timestamp, "timestamp")?,
            id: row.id,
            session_id: row.session_id,
            seq: row.seq,
            stage,
            sender,
            content: row.content,
            metadata,
        })
    }
}
