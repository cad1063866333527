//! Staged collection flow.
//!
//! The [`StageMachine`] is the sole authority on what stage a session is in.
//! Stages form a fixed order; a session's stage index never decreases, and
//! advancing requires every mandatory slot of the current stage to hold a
//! valid value.

use std::collections::HashMap;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ValidationError;
use crate::slots::{SlotName, SlotValue};

/// A named phase in the fixed collection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Opening exchange before any profile data is collected.
    Greeting,
    /// Core personal fields: name, age, gender, preferences, height.
    #[serde(rename = "personal_data_collection")]
    PersonalData,
    /// Free-text interests.
    Interests,
    /// Partner preferences and deal-breakers.
    Preferences,
    /// Profile complete; no further gates are checked.
    Done,
}

impl Stage {
    /// All stages in collection order.
    pub fn all() -> &'static [Stage] {
        &[
            Stage::Greeting,
            Stage::PersonalData,
            Stage::Interests,
            Stage::Preferences,
            Stage::Done,
        ]
    }

    /// 0-based position in the collection order.
    pub fn index(&self) -> usize {
        match self {
            Stage::Greeting => 0,
            Stage::PersonalData => 1,
            Stage::Interests => 2,
            Stage::Preferences => 3,
            Stage::Done => 4,
        }
    }

    /// The stage after this one; `Done` stays `Done`.
    pub fn next(&self) -> Stage {
        match self {
            Stage::Greeting => Stage::PersonalData,
            Stage::PersonalData => Stage::Interests,
            Stage::Interests => Stage::Preferences,
            Stage::Preferences => Stage::Done,
            Stage::Done => Stage::Done,
        }
    }

    /// Whether this is the terminal stage.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Done)
    }

    /// Slots that must hold valid values before this stage can advance.
    pub fn mandatory_slots(&self) -> &'static [SlotName] {
        match self {
            Stage::Greeting => &[],
            Stage::PersonalData => &[
                SlotName::Name,
                SlotName::Age,
                SlotName::Gender,
                SlotName::GenderPreference,
                SlotName::AgePreference,
                SlotName::Height,
            ],
            Stage::Interests => &[SlotName::Interests],
            Stage::Preferences => &[SlotName::Preferences, SlotName::DealBreakers],
            Stage::Done => &[],
        }
    }

    /// Canonical label, also used in event records.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Greeting => "greeting",
            Stage::PersonalData => "personal_data_collection",
            Stage::Interests => "interests",
            Stage::Preferences => "preferences",
            Stage::Done => "done",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "greeting" => Ok(Stage::Greeting),
            "personal_data_collection" => Ok(Stage::PersonalData),
            "interests" => Ok(Stage::Interests),
            "preferences" => Ok(Stage::Preferences),
            "done" => Ok(Stage::Done),
            _ => Err(format!("Unknown stage: {}", s)),
        }
    }
}

/// Mapping from slot name to its single current value (last write wins).
pub type SlotStore = HashMap<SlotName, SlotValue>;

/// The live profile state for one session: filled slots plus current stage.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileState {
    pub slots: SlotStore,
    pub stage: Stage,
}

impl Default for Stage {
    fn default() -> Self {
        Stage::Greeting
    }
}

impl ProfileState {
    /// Fresh state for a new session.
    pub fn new() -> Self {
        Self {
            slots: SlotStore::new(),
            stage: Stage::Greeting,
        }
    }

    /// Rebuild state from persisted parts.
    pub fn from_parts(slots: SlotStore, stage: Stage) -> Self {
        Self { slots, stage }
    }

    /// Whether a slot currently holds a value.
    pub fn is_filled(&self, slot: SlotName) -> bool {
        self.slots.contains_key(&slot)
    }
}

/// Result of applying one slot value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Stage after the apply.
    pub stage: Stage,
    /// Whether the apply triggered a stage advance.
    pub advanced: bool,
}

/// Validates and applies slot values, advancing stages one step at a time.
#[derive(Debug, Clone, Copy, Default)]
pub struct StageMachine;

impl StageMachine {
    /// Create a new stage machine
    pub fn new() -> Self {
        Self
    }

    /// Write `value` into the store, then advance at most one stage if the
    /// current stage's mandatory set is now satisfied.
    ///
    /// A value failing its slot's validity predicate is rejected: the store
    /// is untouched and the stage does not move. Once terminal, values are
    /// still recorded but gates are no longer checked.
    pub fn apply(
        &self,
        state: &mut ProfileState,
        slot: SlotName,
        value: SlotValue,
    ) -> Result<ApplyOutcome, ValidationError> {
        slot.validate(&value)?;

        state.slots.insert(slot, value);

        if state.stage.is_terminal() {
            return Ok(ApplyOutcome {
                stage: state.stage,
                advanced: false,
            });
        }

        let satisfied = state
            .stage
            .mandatory_slots()
            .iter()
            .all(|s| state.is_filled(*s));

        if satisfied {
            let from = state.stage;
            state.stage = state.stage.next();
            debug!(from = %from, to = %state.stage, "Stage advanced");
            return Ok(ApplyOutcome {
                stage: state.stage,
                advanced: true,
            });
        }

        Ok(ApplyOutcome {
            stage: state.stage,
            advanced: false,
        })
    }

    /// The slot the flow wants next: the first unfilled mandatory slot of
    /// the current stage (looking one stage ahead while still greeting).
    /// `None` once the session is terminal.
    pub fn expected_slot(&self, state: &ProfileState) -> Option<SlotName> {
        if state.stage.is_terminal() {
            return None;
        }

        let stage = if state.stage.mandatory_slots().is_empty() {
            state.stage.next()
        } else {
            state.stage
        };

        stage
            .mandatory_slots()
            .iter()
            .copied()
            .find(|s| !state.is_filled(*s))
    }
}
