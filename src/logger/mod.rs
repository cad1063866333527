//! Append-only conversation logging.
//!
//! A [`ConversationLogger`] is constructed explicitly and passed by
//! reference to whatever needs it; there is no ambient singleton. One
//! durable log exists per session identifier, and logs for different
//! sessions never interleave.

use tracing::{debug, info};

use crate::error::{StorageError, StorageResult};
use crate::stage::{SlotStore, Stage};
use crate::storage::{
    Event, EventDraft, SessionRecord, SessionSnapshot, SqliteStorage, Storage,
};

/// Records conversation events and profile state for sessions.
#[derive(Clone)]
pub struct ConversationLogger {
    storage: SqliteStorage,
}

impl ConversationLogger {
    /// Create a new logger over the given storage backend
    pub fn new(storage: SqliteStorage) -> Self {
        Self { storage }
    }

    /// Get a reference to the storage backend.
    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }

    /// Fetch a session, creating its row on first contact.
    pub async fn get_or_create(&self, session_id: &str) -> StorageResult<SessionRecord> {
        if let Some(session) = self.storage.get_session(session_id).await? {
            return Ok(session);
        }

        let session = SessionRecord::new(session_id);
        self.storage.create_session(&session).await?;
        info!(session_id = %session_id, "Session created");
        Ok(session)
    }

    /// Append one event to a session's log.
    pub async fn record(&self, session_id: &str, draft: EventDraft) -> StorageResult<Event> {
        let event = self.storage.append_event(session_id, draft).await?;
        debug!(
            session_id = %session_id,
            event_id = %event.id,
            seq = event.seq,
            sender = %event.sender,
            "Event recorded"
        );
        Ok(event)
    }

    /// The session's current slot store, stage, and full event sequence.
    pub async fn snapshot(&self, session_id: &str) -> StorageResult<SessionSnapshot> {
        let session = self.storage.get_session(session_id).await?.ok_or_else(|| {
            StorageError::SessionNotFound {
                session_id: session_id.to_string(),
            }
        })?;

        let events = self.storage.get_events(session_id).await?;

        Ok(SessionSnapshot { session, events })
    }

    /// Amend an already-logged event's metadata.
    ///
    /// Best-effort: a patch against an unknown event is a no-op, and
    /// amendments stay allowed after a session reaches its terminal stage
    /// since they can never reorder or duplicate the log.
    pub async fn update_metadata(
        &self,
        session_id: &str,
        event_id: &str,
        patch: &serde_json::Value,
    ) -> StorageResult<()> {
        let patched = self
            .storage
            .patch_event_metadata(session_id, event_id, patch)
            .await?;

        if patched {
            debug!(session_id = %session_id, event_id = %event_id, "Event metadata amended");
        } else {
            debug!(
                session_id = %session_id,
                event_id = %event_id,
                "Metadata patch targeted unknown event; ignoring"
            );
        }

        Ok(())
    }

    /// Persist the profile state the stage machine mutated this turn.
    pub async fn save_state(
        &self,
        session_id: &str,
        slots: &SlotStore,
        stage: Stage,
    ) -> StorageResult<()> {
        self.storage.save_profile(session_id, slots, stage).await
    }

    /// All known session identifiers.
    pub async fn list_sessions(&self) -> StorageResult<Vec<String>> {
        self.storage.list_sessions().await
    }
}
