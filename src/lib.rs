//! # Profile Intake
//!
//! A staged profile-collection engine: extracts structured profile fields
//! (name, age, gender, preferences, interests, deal-breakers) from
//! free-text conversation turns, tracks progress through an ordered
//! collection flow, and durably logs every exchange for audit and export.
//!
//! ## Features
//!
//! - **Hybrid Slot Extraction**: recognizer entities, local pattern rules,
//!   and an external text-understanding service tried in fixed order with
//!   confidence arbitration
//! - **Staged Collection Flow**: ordered stages with validation gates; a
//!   session's stage never moves backwards
//! - **Append-Only Conversation Log**: per-session durable event sequences
//!   with amendable metadata
//! - **Export Views**: structured JSON, flat-text transcripts, and tabular
//!   CSV over any session's log
//!
//! ## Architecture
//!
//! ```text
//! Dialogue Policy → IntakeEngine → SlotExtractor → NLU service (HTTP)
//!                        ↓               ↓
//!                   StageMachine    local patterns
//!                        ↓
//!                 ConversationLogger → SQLite
//!                        ↓
//!                 ConversationExporter
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use profile_intake::{Config, IntakeEngine, TurnInput};
//! use profile_intake::nlu::NluClient;
//! use profile_intake::storage::SqliteStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let storage = SqliteStorage::new(&config.database).await?;
//!     let nlu = NluClient::new(&config.nlu, config.request.clone())?;
//!     let engine = IntakeEngine::new(&config, storage, nlu);
//!
//!     let result = engine
//!         .handle_turn("session-1", TurnInput::new("I am 25 years old"))
//!         .await?;
//!     println!("stage is now {}", result.stage);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Configuration management loaded from the environment.
pub mod config;
/// Per-turn orchestration and per-session serialization.
pub mod engine;
/// Error types and result aliases for the application.
pub mod error;
/// Export views over the conversation log.
pub mod export;
/// Hybrid slot extraction strategy chain.
pub mod extract;
/// Append-only conversation logging.
pub mod logger;
/// Client for the external text-understanding service.
pub mod nlu;
/// Pure text-to-typed-value conversions.
pub mod normalize;
/// Slot domain types and the per-slot dispatch table.
pub mod slots;
/// Staged collection flow and profile state.
pub mod stage;
/// SQLite storage layer for persistence.
pub mod storage;

pub use config::Config;
pub use engine::{IntakeEngine, TurnInput, TurnResult};
pub use error::{AppError, AppResult};
