//! Hybrid slot extraction.
//!
//! Strategies run in a fixed order (skip detection, recognizer entity,
//! local pattern, external service) and the first result at or above the
//! confidence threshold wins. No strategy signals "try next" by raising;
//! the orchestrator inspects returned values only, and the chain as a whole
//! never fails with an error - callers always get an outcome they can
//! branch on.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ExtractionConfig;
use crate::nlu::{ExtractRequest, NluClient};
use crate::slots::{self, SlotName, SlotValue};

/// Which extraction technique produced a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// The utterance was an explicit request to skip the field.
    Skip,
    /// The upstream recognizer had already tagged a matching entity.
    Entity,
    /// A slot-specific pattern rule matched locally.
    Pattern,
    /// The external text-understanding service answered.
    Service,
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Strategy::Skip => write!(f, "skip"),
            Strategy::Entity => write!(f, "entity"),
            Strategy::Pattern => write!(f, "pattern"),
            Strategy::Service => write!(f, "service"),
        }
    }
}

/// An entity the upstream recognizer tagged in the utterance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecognizedEntity {
    /// Entity name, matched against the slot's expected entity.
    pub name: String,
    /// Raw surface value.
    pub value: String,
    /// Recognizer-reported confidence (0.0-1.0).
    pub confidence: f64,
}

impl RecognizedEntity {
    /// Create a new recognized entity
    pub fn new(name: impl Into<String>, value: impl Into<String>, confidence: f64) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

/// A successfully extracted, typed slot value.
///
/// Never persisted directly; the engine folds it into event metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionResult {
    /// The slot the value fills.
    pub slot: SlotName,
    /// The typed value.
    pub value: SlotValue,
    /// Which strategy produced it.
    pub strategy: Strategy,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// The source text the value came from.
    pub source: String,
}

/// Why the whole chain came up empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// No strategy produced a value at or above the threshold.
    NoMatch,
    /// The service (or normalization of its value) reported the utterance
    /// holds no answer for this slot.
    Unparseable,
    /// The service could not be reached within the bounded retries.
    ServiceUnavailable { message: String },
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::NoMatch => write!(f, "no strategy matched"),
            FailureReason::Unparseable => write!(f, "utterance unparseable for this slot"),
            FailureReason::ServiceUnavailable { message } => {
                write!(f, "service unavailable: {}", message)
            }
        }
    }
}

/// A failed extraction attempt. Recoverable: the caller re-prompts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionFailure {
    /// The slot that was being filled.
    pub slot: SlotName,
    /// Why extraction failed.
    pub reason: FailureReason,
}

/// The outcome of one extraction attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Extracted(ExtractionResult),
    Failed(ExtractionFailure),
}

impl ExtractionOutcome {
    /// Whether a value was extracted.
    pub fn is_extracted(&self) -> bool {
        matches!(self, ExtractionOutcome::Extracted(_))
    }

    /// The successful result, if any.
    pub fn as_result(&self) -> Option<&ExtractionResult> {
        match self {
            ExtractionOutcome::Extracted(r) => Some(r),
            ExtractionOutcome::Failed(_) => None,
        }
    }
}

/// Extracts typed slot values from free-text utterances.
#[derive(Clone)]
pub struct SlotExtractor {
    nlu: NluClient,
    min_confidence: f64,
}

impl SlotExtractor {
    /// Create a new extractor
    pub fn new(nlu: NluClient, config: &ExtractionConfig) -> Self {
        Self {
            nlu,
            min_confidence: config.min_confidence,
        }
    }

    /// Run the strategy chain for one slot against one utterance.
    pub async fn extract(
        &self,
        slot: SlotName,
        utterance: &str,
        entities: &[RecognizedEntity],
    ) -> ExtractionOutcome {
        if slots::is_skip_request(utterance) {
            debug!(slot = %slot, "Skip request detected");
            return ExtractionOutcome::Extracted(ExtractionResult {
                slot,
                value: SlotValue::Skipped,
                strategy: Strategy::Skip,
                confidence: 1.0,
                source: utterance.trim().to_string(),
            });
        }

        if let Some(result) = self.try_entity(slot, entities) {
            return ExtractionOutcome::Extracted(result);
        }

        if let Some(result) = self.try_pattern(slot, utterance) {
            return ExtractionOutcome::Extracted(result);
        }

        self.try_service(slot, utterance).await
    }

    fn try_entity(&self, slot: SlotName, entities: &[RecognizedEntity]) -> Option<ExtractionResult> {
        let entity = entities.iter().find(|e| e.name == slot.entity_name())?;

        if entity.confidence < self.min_confidence {
            debug!(
                slot = %slot,
                confidence = entity.confidence,
                "Entity below confidence threshold"
            );
            return None;
        }

        match slot.normalize(&entity.value) {
            Ok(value) => {
                debug!(slot = %slot, confidence = entity.confidence, "Entity strategy matched");
                Some(ExtractionResult {
                    slot,
                    value,
                    strategy: Strategy::Entity,
                    confidence: entity.confidence,
                    source: entity.value.clone(),
                })
            }
            Err(e) => {
                debug!(slot = %slot, error = %e, "Entity value failed normalization");
                None
            }
        }
    }

    fn try_pattern(&self, slot: SlotName, utterance: &str) -> Option<ExtractionResult> {
        let matched = slot.pattern_extract(utterance)?;

        if matched.confidence < self.min_confidence {
            debug!(
                slot = %slot,
                confidence = matched.confidence,
                "Pattern below confidence threshold"
            );
            return None;
        }

        debug!(slot = %slot, confidence = matched.confidence, "Pattern strategy matched");
        Some(ExtractionResult {
            slot,
            value: matched.value,
            strategy: Strategy::Pattern,
            confidence: matched.confidence,
            source: matched.source,
        })
    }

    async fn try_service(&self, slot: SlotName, utterance: &str) -> ExtractionOutcome {
        let request = ExtractRequest::new(
            utterance,
            slot.as_str(),
            slot.description(),
            self.nlu.model(),
        );

        let response = match self.nlu.extract(request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(slot = %slot, error = %e, "Text-understanding service unavailable");
                return ExtractionOutcome::Failed(ExtractionFailure {
                    slot,
                    reason: FailureReason::ServiceUnavailable {
                        message: e.to_string(),
                    },
                });
            }
        };

        if !response.has_value() {
            debug!(slot = %slot, "Service reported unparseable");
            return ExtractionOutcome::Failed(ExtractionFailure {
                slot,
                reason: FailureReason::Unparseable,
            });
        }

        let raw = response.value.unwrap_or_default();
        let confidence = response.confidence.unwrap_or(0.5);

        if confidence < self.min_confidence {
            debug!(slot = %slot, confidence, "Service result below confidence threshold");
            return ExtractionOutcome::Failed(ExtractionFailure {
                slot,
                reason: FailureReason::NoMatch,
            });
        }

        match slot.normalize(&raw) {
            Ok(value) => ExtractionOutcome::Extracted(ExtractionResult {
                slot,
                value,
                strategy: Strategy::Service,
                confidence,
                source: raw,
            }),
            Err(e) => {
                debug!(slot = %slot, error = %e, "Service value failed normalization");
                ExtractionOutcome::Failed(ExtractionFailure {
                    slot,
                    reason: FailureReason::Unparseable,
                })
            }
        }
    }
}
