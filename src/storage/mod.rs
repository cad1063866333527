//! Storage layer for conversation persistence.
//!
//! This module provides SQLite-based storage for sessions and their
//! append-only event logs. One session row exists per session identifier;
//! events carry a per-session dense sequence number assigned at append
//! time, so ordering is append order and gaps are detectable on replay.

mod sqlite;

pub use sqlite::SqliteStorage;

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::StorageResult;
use crate::stage::{SlotStore, Stage};

/// Who produced an event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    /// The human being profiled.
    #[default]
    User,
    /// The assistant's outbound message.
    Bot,
    /// Internal mutations: slot writes, stage changes, metadata patches.
    System,
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Sender::User => write!(f, "user"),
            Sender::Bot => write!(f, "bot"),
            Sender::System => write!(f, "system"),
        }
    }
}

impl FromStr for Sender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Sender::User),
            "bot" => Ok(Sender::Bot),
            "system" => Ok(Sender::System),
            _ => Err(format!("Unknown sender: {}", s)),
        }
    }
}

/// Structured metadata attached to an event.
///
/// The named fields cover what every turn produces; `extra` keeps whatever
/// a later turn patches in without a schema change.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Intent the recognizer assigned to the utterance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<String>,
    /// Action the flow chose in response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Confidence score for the extraction or intent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    /// Extraction strategy that produced the value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    /// Entities the recognizer tagged in the utterance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entities: Option<serde_json::Value>,
    /// Open extension map for late amendments.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl EventMetadata {
    /// Empty metadata.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the intent name
    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }

    /// Set the chosen action
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = Some(action.into());
        self
    }

    /// Set the confidence score
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence.clamp(0.0, 1.0));
        self
    }

    /// Set the extraction strategy
    pub fn with_strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = Some(strategy.into());
        self
    }

    /// Set the recognized entity list
    pub fn with_entities(mut self, entities: serde_json::Value) -> Self {
        self.entities = Some(entities);
        self
    }

    /// Add one extension field
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

/// One immutable, timestamped record in a session's log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Unique event identifier, the reference for metadata patches.
    pub id: String,
    /// Parent session identifier.
    pub session_id: String,
    /// Per-session dense sequence number; append order.
    pub seq: i64,
    /// When the event was appended.
    pub timestamp: DateTime<Utc>,
    /// Stage the session was in at append time.
    pub stage: Stage,
    /// Who produced the event.
    pub sender: Sender,
    /// Message text or a rendered description of the mutation.
    pub content: String,
    /// Structured metadata.
    pub metadata: EventMetadata,
}

/// An event not yet appended: everything but the storage-assigned parts.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub stage: Stage,
    pub sender: Sender,
    pub content: String,
    pub metadata: EventMetadata,
}

impl EventDraft {
    /// Create a new draft with empty metadata
    pub fn new(stage: Stage, sender: Sender, content: impl Into<String>) -> Self {
        Self {
            stage,
            sender,
            content: content.into(),
            metadata: EventMetadata::new(),
        }
    }

    /// Attach metadata
    pub fn with_metadata(mut self, metadata: EventMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A session row: identity plus the persisted profile state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Opaque external session identifier.
    pub id: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last written.
    pub updated_at: DateTime<Utc>,
    /// Current collection stage.
    pub stage: Stage,
    /// Current slot store.
    pub slots: SlotStore,
}

impl SessionRecord {
    /// Create a fresh record for a new session identifier
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            updated_at: now,
            stage: Stage::Greeting,
            slots: SlotStore::new(),
        }
    }
}

/// Everything known about one session: state plus the full event sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session: SessionRecord,
    pub events: Vec<Event>,
}

/// Storage trait for conversation persistence.
#[async_trait]
pub trait Storage: Send + Sync {
    // Session operations

    /// Create a session row for a new identifier.
    async fn create_session(&self, session: &SessionRecord) -> StorageResult<()>;
    /// Get a session by identifier.
    async fn get_session(&self, id: &str) -> StorageResult<Option<SessionRecord>>;
    /// Persist the profile state (slots + stage) for a session.
    async fn save_profile(&self, id: &str, slots: &SlotStore, stage: Stage) -> StorageResult<()>;
    /// All known session identifiers, oldest first.
    async fn list_sessions(&self) -> StorageResult<Vec<String>>;

    // Event operations

    /// Append one event; the sequence number is assigned inside the insert
    /// so a crash between appends never leaves a partial record visible.
    async fn append_event(&self, session_id: &str, draft: EventDraft) -> StorageResult<Event>;
    /// All events for a session in append order.
    async fn get_events(&self, session_id: &str) -> StorageResult<Vec<Event>>;
    /// One event by reference.
    async fn get_event(&self, session_id: &str, event_id: &str) -> StorageResult<Option<Event>>;
    /// Shallow-merge a JSON object into an event's metadata in place.
    /// Returns false when the event does not exist.
    async fn patch_event_metadata(
        &self,
        session_id: &str,
        event_id: &str,
        patch: &serde_json::Value,
    ) -> StorageResult<bool>;
}

/// Generate a new event identifier
pub(crate) fn new_event_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sender_round_trip() {
        for sender in [Sender::User, Sender::Bot, Sender::System] {
            let parsed: Sender = sender.to_string().parse().unwrap();
            assert_eq!(parsed, sender);
        }
        assert!(Sender::from_str("alien").is_err());
    }

    #[test]
    fn test_metadata_builders() {
        let metadata = EventMetadata::new()
            .with_intent("provide_age")
            .with_confidence(0.8)
            .with_strategy("pattern");

        assert_eq!(metadata.intent.as_deref(), Some("provide_age"));
        assert_eq!(metadata.confidence, Some(0.8));
        assert_eq!(metadata.strategy.as_deref(), Some("pattern"));
        assert!(metadata.action.is_none());
    }

    #[test]
    fn test_metadata_confidence_clamped() {
        let metadata = EventMetadata::new().with_confidence(1.5);
        assert_eq!(metadata.confidence, Some(1.0));
    }

    #[test]
    fn test_metadata_serde_skips_absent_fields() {
        let metadata = EventMetadata::new().with_intent("greet");
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["intent"], "greet");
        assert!(json.get("action").is_none());
    }

    #[test]
    fn test_metadata_extra_flattens() {
        let metadata =
            EventMetadata::new().with_extra("reviewed", serde_json::Value::Bool(true));
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["reviewed"], true);

        let back: EventMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(back.extra["reviewed"], true);
    }

    #[test]
    fn test_session_record_starts_at_greeting() {
        let record = SessionRecord::new("sess-1");
        assert_eq!(record.stage, Stage::Greeting);
        assert!(record.slots.is_empty());
    }
}
