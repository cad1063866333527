//! Read-only export views over the conversation log.
//!
//! Renders a session's full event sequence into one of three formats. Every
//! render is built fully in memory before a single byte reaches the output
//! target, so a failed export never leaves a partial file behind.

use clap::ValueEnum;
use std::str::FromStr;

use crate::error::{ExportError, ExportResult, StorageError};
use crate::logger::ConversationLogger;
use crate::storage::{Event, Sender, SessionSnapshot};

/// Output format for a session export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    /// Full-fidelity JSON with nested metadata.
    Structured,
    /// Human-readable transcript.
    FlatText,
    /// One CSV row per event, metadata flattened to columns.
    Tabular,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Structured => write!(f, "structured"),
            ExportFormat::FlatText => write!(f, "flat-text"),
            ExportFormat::Tabular => write!(f, "tabular"),
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "structured" => Ok(ExportFormat::Structured),
            "flat-text" => Ok(ExportFormat::FlatText),
            "tabular" => Ok(ExportFormat::Tabular),
            _ => Err(format!("Unknown export format: {}", s)),
        }
    }
}

/// Renders sessions from the conversation log into export formats.
#[derive(Clone)]
pub struct ConversationExporter {
    logger: ConversationLogger,
}

impl ConversationExporter {
    /// Create a new exporter over the given logger
    pub fn new(logger: ConversationLogger) -> Self {
        Self { logger }
    }

    /// All known session identifiers, oldest first.
    pub async fn list(&self) -> ExportResult<Vec<String>> {
        Ok(self.logger.list_sessions().await?)
    }

    /// Render one session in the requested format.
    pub async fn export(&self, session_id: &str, format: ExportFormat) -> ExportResult<String> {
        let snapshot = match self.logger.snapshot(session_id).await {
            Ok(s) => s,
            Err(StorageError::SessionNotFound { session_id }) => {
                return Err(ExportError::NotFound { session_id });
            }
            Err(e) => return Err(e.into()),
        };

        match format {
            ExportFormat::Structured => render_structured(&snapshot),
            ExportFormat::FlatText => Ok(render_flat_text(&snapshot)),
            ExportFormat::Tabular => Ok(render_tabular(&snapshot)),
        }
    }
}

fn render_structured(snapshot: &SessionSnapshot) -> ExportResult<String> {
    serde_json::to_string_pretty(snapshot).map_err(|e| ExportError::Io {
        message: format!("Failed to render structured export: {}", e),
    })
}

fn render_flat_text(snapshot: &SessionSnapshot) -> String {
    let mut lines = Vec::with_capacity(snapshot.events.len() + 4);

    lines.push(format!("Conversation ID: {}", snapshot.session.id));
    lines.push(format!(
        "Created: {}",
        snapshot.session.created_at.to_rfc3339()
    ));
    lines.push(format!("Stage: {}", snapshot.session.stage));
    lines.push(String::new());

    for event in &snapshot.events {
        lines.push(render_transcript_line(event));
    }

    lines.join("\n")
}

fn render_transcript_line(event: &Event) -> String {
    let time = event.timestamp.format("%Y-%m-%d %H:%M:%S");
    let sender = format!("{:<6}", event.sender.to_string().to_uppercase());

    let annotation = match event.sender {
        Sender::User => event
            .metadata
            .intent
            .as_deref()
            .map(|i| format!(" [Intent: {}]", i)),
        Sender::Bot | Sender::System => event
            .metadata
            .action
            .as_deref()
            .map(|a| format!(" [Action: {}]", a)),
    };

    format!(
        "[{}] [{}] {}: {}{}",
        time,
        event.stage,
        sender,
        event.content,
        annotation.unwrap_or_default()
    )
}

const TABULAR_HEADER: &str =
    "timestamp,seq,stage,sender,content,intent,action,confidence,strategy,entities";

fn render_tabular(snapshot: &SessionSnapshot) -> String {
    let mut lines = Vec::with_capacity(snapshot.events.len() + 1);
    lines.push(TABULAR_HEADER.to_string());

    for event in &snapshot.events {
        let entities = event
            .metadata
            .entities
            .as_ref()
            .map(|e| e.to_string())
            .unwrap_or_default();

        let row = [
            event.timestamp.to_rfc3339(),
            event.seq.to_string(),
            event.stage.to_string(),
            event.sender.to_string(),
            event.content.clone(),
            event.metadata.intent.clone().unwrap_or_default(),
            event.metadata.action.clone().unwrap_or_default(),
            event
                .metadata
                .confidence
                .map(|c| c.to_string())
                .unwrap_or_default(),
            event.metadata.strategy.clone().unwrap_or_default(),
            entities,
        ];

        lines.push(
            row.iter()
                .map(|field| csv_escape(field))
                .collect::<Vec<_>>()
                .join(","),
        );
    }

    lines.join("\n")
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
