//! Per-turn orchestration.
//!
//! The [`IntakeEngine`] is what the upstream dialogue policy calls once per
//! inbound message: it runs extraction, applies the value through the stage
//! machine, and records every message and mutation in the session's log.
//! Turns for the same session are serialized; distinct sessions run fully
//! concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::json;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AppResult, ValidationError};
use crate::extract::{ExtractionOutcome, RecognizedEntity, SlotExtractor};
use crate::logger::ConversationLogger;
use crate::nlu::NluClient;
use crate::slots::SlotName;
use crate::stage::{ProfileState, Stage, StageMachine};
use crate::storage::{Event, EventDraft, EventMetadata, Sender, SqliteStorage};

/// One inbound message plus what the upstream collaborator knows about it.
#[derive(Debug, Clone)]
pub struct TurnInput {
    /// Raw user utterance.
    pub utterance: String,
    /// Entities the upstream recognizer tagged.
    pub entities: Vec<RecognizedEntity>,
    /// Slot the dialogue policy is currently soliciting; derived from the
    /// stage machine when absent.
    pub expected_slot: Option<SlotName>,
    /// Intent name the recognizer assigned, recorded as metadata.
    pub intent: Option<String>,
}

impl TurnInput {
    /// Create a new turn input from an utterance
    pub fn new(utterance: impl Into<String>) -> Self {
        Self {
            utterance: utterance.into(),
            entities: Vec::new(),
            expected_slot: None,
            intent: None,
        }
    }

    /// Attach recognized entities
    pub fn with_entities(mut self, entities: Vec<RecognizedEntity>) -> Self {
        self.entities = entities;
        self
    }

    /// Set the expected slot explicitly
    pub fn with_expected_slot(mut self, slot: SlotName) -> Self {
        self.expected_slot = Some(slot);
        self
    }

    /// Set the recognized intent
    pub fn with_intent(mut self, intent: impl Into<String>) -> Self {
        self.intent = Some(intent.into());
        self
    }
}

/// What one turn produced, returned to the dialogue policy.
#[derive(Debug, Clone)]
pub struct TurnResult {
    /// Session the turn ran against.
    pub session_id: String,
    /// Slot the turn tried to fill; `None` once the session is terminal.
    pub slot: Option<SlotName>,
    /// Extraction outcome, when a slot was attempted.
    pub outcome: Option<ExtractionOutcome>,
    /// Rejection detail when the value parsed but failed validation.
    pub validation_error: Option<ValidationError>,
    /// Stage after the turn.
    pub stage: Stage,
    /// Whether this turn advanced the stage.
    pub advanced: bool,
    /// Whether the caller should re-prompt for the same slot.
    pub needs_reprompt: bool,
}

/// Orchestrates extraction, stage progression, and logging per turn.
#[derive(Clone)]
pub struct IntakeEngine {
    extractor: SlotExtractor,
    machine: StageMachine,
    logger: ConversationLogger,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl IntakeEngine {
    /// Create a new engine from configuration and shared components
    pub fn new(config: &Config, storage: SqliteStorage, nlu: NluClient) -> Self {
        Self {
            extractor: SlotExtractor::new(nlu, &config.extraction),
            machine: StageMachine::new(),
            logger: ConversationLogger::new(storage),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Get a reference to the conversation logger.
    pub fn logger(&self) -> &ConversationLogger {
        &self.logger
    }

    /// Handle one inbound message as a single serialized unit of work.
    pub async fn handle_turn(&self, session_id: &str, input: TurnInput) -> AppResult<TurnResult> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let session = self.logger.get_or_create(session_id).await?;
        let mut state = ProfileState::from_parts(session.slots, session.stage);

        let slot = input
            .expected_slot
            .or_else(|| self.machine.expected_slot(&state));

        let Some(slot) = slot else {
            // Terminal session: log the message, nothing left to collect.
            self.record_user_event(session_id, &state, &input, None).await;
            return Ok(TurnResult {
                session_id: session_id.to_string(),
                slot: None,
                outcome: None,
                validation_error: None,
                stage: state.stage,
                advanced: false,
                needs_reprompt: false,
            });
        };

        let outcome = self
            .extractor
            .extract(slot, &input.utterance, &input.entities)
            .await;

        self.record_user_event(session_id, &state, &input, Some(&outcome))
            .await;

        let mut advanced = false;
        let mut needs_reprompt = false;
        let mut validation_error = None;

        match &outcome {
            ExtractionOutcome::Extracted(result) => {
                let stage_before = state.stage;
                match self.machine.apply(&mut state, slot, result.value.clone()) {
                    Ok(apply) => {
                        advanced = apply.advanced;
                        self.record_slot_event(session_id, stage_before, result.value.to_string(), slot)
                            .await;
                        if apply.advanced {
                            self.record_stage_event(session_id, &state).await;
                        }
                        if let Err(e) = self
                            .logger
                            .save_state(session_id, &state.slots, state.stage)
                            .await
                        {
                            warn!(
                                session_id = %session_id,
                                error = %e,
                                "Failed to persist profile state"
                            );
                        }
                    }
                    Err(e) => {
                        info!(
                            session_id = %session_id,
                            slot = %slot,
                            reason = %e.reason,
                            "Extracted value rejected by validation"
                        );
                        self.record_validation_event(session_id, &state, slot, &e).await;
                        validation_error = Some(e);
                        needs_reprompt = true;
                    }
                }
            }
            ExtractionOutcome::Failed(failure) => {
                info!(
                    session_id = %session_id,
                    slot = %slot,
                    reason = %failure.reason,
                    "Extraction failed; caller should re-prompt"
                );
                needs_reprompt = true;
            }
        }

        Ok(TurnResult {
            session_id: session_id.to_string(),
            slot: Some(slot),
            outcome: Some(outcome),
            validation_error,
            stage: state.stage,
            advanced,
            needs_reprompt,
        })
    }

    /// Log the outbound message the dialogue policy chose.
    pub async fn record_bot_reply(
        &self,
        session_id: &str,
        text: &str,
        action: &str,
    ) -> AppResult<Event> {
        let lock = self.session_lock(session_id).await;
        let _guard = lock.lock().await;

        let session = self.logger.get_or_create(session_id).await?;

        let draft = EventDraft::new(session.stage, Sender::Bot, text)
            .with_metadata(EventMetadata::new().with_action(action));

        Ok(self.logger.record(session_id, draft).await?)
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Record the inbound message with extraction metadata folded in.
    ///
    /// A failed append is logged and swallowed: a logging outage must not
    /// block the conversation, and the dense event sequence makes the gap
    /// visible on replay.
    async fn record_user_event(
        &self,
        session_id: &str,
        state: &ProfileState,
        input: &TurnInput,
        outcome: Option<&ExtractionOutcome>,
    ) {
        let mut metadata = EventMetadata::new();

        if let Some(intent) = &input.intent {
            metadata = metadata.with_intent(intent.clone());
        }
        if !input.entities.is_empty() {
            if let Ok(entities) = serde_json::to_value(&input.entities) {
                metadata = metadata.with_entities(entities);
            }
        }
        match outcome {
            Some(ExtractionOutcome::Extracted(result)) => {
                metadata = metadata
                    .with_confidence(result.confidence)
                    .with_strategy(result.strategy.to_string());
            }
            Some(ExtractionOutcome::Failed(failure)) => {
                metadata =
                    metadata.with_extra("extraction_failure", json!(failure.reason.to_string()));
            }
            None => {}
        }

        let draft = EventDraft::new(state.stage, Sender::User, &input.utterance)
            .with_metadata(metadata);
        self.record_best_effort(session_id, draft).await;
    }

    async fn record_slot_event(
        &self,
        session_id: &str,
        stage: Stage,
        rendered: String,
        slot: SlotName,
    ) {
        let draft = EventDraft::new(
            stage,
            Sender::System,
            format!("Slot {} set to: {}", slot, rendered),
        )
        .with_metadata(
            EventMetadata::new()
                .with_action("slot_set")
                .with_extra("slot", json!(slot.as_str())),
        );
        self.record_best_effort(session_id, draft).await;
    }

    async fn record_stage_event(&self, session_id: &str, state: &ProfileState) {
        let draft = EventDraft::new(
            state.stage,
            Sender::System,
            format!("Stage advanced to: {}", state.stage),
        )
        .with_metadata(EventMetadata::new().with_action("stage_advanced"));
        self.record_best_effort(session_id, draft).await;
    }

    async fn record_validation_event(
        &self,
        session_id: &str,
        state: &ProfileState,
        slot: SlotName,
        error: &ValidationError,
    ) {
        let draft = EventDraft::new(
            state.stage,
            Sender::System,
            format!("Rejected value for {}: {}", slot, error.reason),
        )
        .with_metadata(
            EventMetadata::new()
                .with_action("validation_rejected")
                .with_extra("slot", json!(slot.as_str())),
        );
        self.record_best_effort(session_id, draft).await;
    }

    async fn record_best_effort(&self, session_id: &str, draft: EventDraft) {
        if let Err(e) = self.logger.record(session_id, draft).await {
            warn!(
                session_id = %session_id,
                error = %e,
                "Event append failed; continuing turn"
            );
        }
    }
}
