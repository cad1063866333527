use thiserror::Error;

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Text-understanding service error: {0}")]
    Nlu(#[from] NluError),

    #[error("Export error: {0}")]
    Export(#[from] ExportError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Event not found: {event_id}")]
    EventNotFound { event_id: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// Text-understanding service errors
#[derive(Debug, Error)]
pub enum NluError {
    #[error("Service unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Exporter errors
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Session not found: {session_id}")]
    NotFound { session_id: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Write failed: {message}")]
    Io { message: String },
}

/// A text fragment that could not be converted to a typed value.
///
/// Local and recoverable: callers fall through to the next extraction
/// strategy or re-prompt.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Cannot normalize {kind}: {fragment:?}")]
pub struct NormalizationError {
    /// What was being parsed (e.g. "integer", "height").
    pub kind: &'static str,
    /// The fragment that failed to parse.
    pub fragment: String,
}

impl NormalizationError {
    /// Create a new normalization error for the given kind and fragment.
    pub fn new(kind: &'static str, fragment: impl Into<String>) -> Self {
        Self {
            kind,
            fragment: fragment.into(),
        }
    }
}

/// A value that parsed but falls outside its slot's valid domain.
///
/// The slot store is left untouched; callers re-prompt.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("Invalid value for slot {slot}: {reason}")]
pub struct ValidationError {
    /// The slot the value was destined for.
    pub slot: String,
    /// Why the value was rejected.
    pub reason: String,
}

impl ValidationError {
    /// Create a new validation error for the given slot.
    pub fn new(slot: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            slot: slot.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for text-understanding service operations
pub type NluResult<T> = Result<T, NluError>;

/// Result type alias for export operations
pub type ExportResult<T> = Result<T, ExportError>;
