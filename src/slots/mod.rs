//! Slot domain: names, typed values, and the per-slot dispatch table.
//!
//! Each slot is one arm in a set of `match` tables (description, expected
//! entity, pattern extractor, normalizer, validity predicate). Adding a slot
//! means adding a table arm, not a type.

use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{NormalizationError, ValidationError};
use crate::normalize::{self, AgeRange};

/// The fixed set of profile slots collected over a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    Name,
    Age,
    Gender,
    GenderPreference,
    AgePreference,
    Height,
    Interests,
    Preferences,
    DealBreakers,
}

impl SlotName {
    /// All slots in collection order.
    pub fn all() -> &'static [SlotName] {
        &[
            SlotName::Name,
            SlotName::Age,
            SlotName::Gender,
            SlotName::GenderPreference,
            SlotName::AgePreference,
            SlotName::Height,
            SlotName::Interests,
            SlotName::Preferences,
            SlotName::DealBreakers,
        ]
    }

    /// Entity name the upstream recognizer uses for this slot.
    pub fn entity_name(&self) -> &'static str {
        self.as_str()
    }

    /// One-line slot description sent to the text-understanding service.
    pub fn description(&self) -> &'static str {
        match self {
            SlotName::Name => "the user's first name",
            SlotName::Age => "the user's age in years, as a number",
            SlotName::Gender => "the user's gender: male, female, or non-binary",
            SlotName::GenderPreference => {
                "the gender the user wants to date: male, female, non-binary, or any"
            }
            SlotName::AgePreference => {
                "the age range the user wants in a partner, like 25-35"
            }
            SlotName::Height => "the user's height, like 5'10\" or 178cm",
            SlotName::Interests => "things the user enjoys doing, as a list",
            SlotName::Preferences => "qualities the user wants in a partner, as a list",
            SlotName::DealBreakers => "things the user will not accept in a partner, as a list",
        }
    }

    /// Canonical string form, also used as the storage key.
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotName::Name => "name",
            SlotName::Age => "age",
            SlotName::Gender => "gender",
            SlotName::GenderPreference => "gender_preference",
            SlotName::AgePreference => "age_preference",
            SlotName::Height => "height",
            SlotName::Interests => "interests",
            SlotName::Preferences => "preferences",
            SlotName::DealBreakers => "deal_breakers",
        }
    }
}

impl std::fmt::Display for SlotName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SlotName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" => Ok(SlotName::Name),
            "age" => Ok(SlotName::Age),
            "gender" => Ok(SlotName::Gender),
            "gender_preference" => Ok(SlotName::GenderPreference),
            "age_preference" => Ok(SlotName::AgePreference),
            "height" => Ok(SlotName::Height),
            "interests" => Ok(SlotName::Interests),
            "preferences" => Ok(SlotName::Preferences),
            "deal_breakers" => Ok(SlotName::DealBreakers),
            _ => Err(format!("Unknown slot: {}", s)),
        }
    }
}

/// Self-described gender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
}

impl std::fmt::Display for Gender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Gender::Male => write!(f, "male"),
            Gender::Female => write!(f, "female"),
            Gender::NonBinary => write!(f, "non-binary"),
        }
    }
}

impl FromStr for Gender {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" | "man" | "m" => Ok(Gender::Male),
            "female" | "woman" | "f" => Ok(Gender::Female),
            "non-binary" | "nonbinary" | "nb" | "enby" => Ok(Gender::NonBinary),
            _ => Err(format!("Unknown gender: {}", s)),
        }
    }
}

/// Gender(s) the user wants to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GenderPreference {
    Male,
    Female,
    NonBinary,
    Any,
}

impl std::fmt::Display for GenderPreference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GenderPreference::Male => write!(f, "male"),
            GenderPreference::Female => write!(f, "female"),
            GenderPreference::NonBinary => write!(f, "non-binary"),
            GenderPreference::Any => write!(f, "any"),
        }
    }
}

impl FromStr for GenderPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" | "men" | "males" | "man" => Ok(GenderPreference::Male),
            "female" | "women" | "females" | "woman" => Ok(GenderPreference::Female),
            "non-binary" | "nonbinary" | "nb" | "enby" => Ok(GenderPreference::NonBinary),
            "any" | "all" | "both" | "everyone" | "anyone" | "either" => Ok(GenderPreference::Any),
            _ => Err(format!("Unknown gender preference: {}", s)),
        }
    }
}

/// A typed slot value. Each slot accepts exactly one variant shape;
/// `Skipped` records the user declining a field and is valid everywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SlotValue {
    Text(String),
    Integer(i64),
    Gender(Gender),
    GenderPreference(GenderPreference),
    HeightCm(u32),
    AgeRange(AgeRange),
    List(Vec<String>),
    Skipped,
}

impl std::fmt::Display for SlotValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SlotValue::Text(s) => write!(f, "{}", s),
            SlotValue::Integer(n) => write!(f, "{}", n),
            SlotValue::Gender(g) => write!(f, "{}", g),
            SlotValue::GenderPreference(g) => write!(f, "{}", g),
            SlotValue::HeightCm(cm) => write!(f, "{}", normalize::format_height_cm(*cm)),
            SlotValue::AgeRange(r) => write!(f, "{}-{}", r.min, r.max),
            SlotValue::List(items) => write!(f, "{}", items.join(", ")),
            SlotValue::Skipped => write!(f, "skipped"),
        }
    }
}

/// A value extracted by a pattern, with its fixed confidence and the source
/// fragment it matched.
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub value: SlotValue,
    pub confidence: f64,
    pub source: String,
}

impl PatternMatch {
    fn new(value: SlotValue, confidence: f64, source: impl Into<String>) -> Self {
        Self {
            value,
            confidence,
            source: source.into(),
        }
    }
}

/// Phrases that mean "I don't want to answer this one".
pub fn is_skip_request(utterance: &str) -> bool {
    const SKIP_PHRASES: &[&str] = &[
        "don't want to",
        "dont want to",
        "skip",
        "pass",
        "next question",
        "don't tell",
        "dont tell",
        "not telling",
        "rather not say",
        "prefer not to",
    ];

    let lower = utterance.to_lowercase();
    SKIP_PHRASES.iter().any(|p| lower.contains(p))
}

impl SlotName {
    /// Normalize a raw string (from an entity or the external service) into
    /// this slot's typed value.
    pub fn normalize(&self, raw: &str) -> Result<SlotValue, NormalizationError> {
        match self {
            SlotName::Name => {
                let trimmed = raw.trim().trim_matches('"');
                if trimmed.is_empty() {
                    return Err(NormalizationError::new("name", raw));
                }
                Ok(SlotValue::Text(capitalize(trimmed)))
            }
            SlotName::Age => normalize::parse_integer(raw).map(SlotValue::Integer),
            SlotName::Gender => Gender::from_str(raw)
                .map(SlotValue::Gender)
                .map_err(|_| NormalizationError::new("gender", raw)),
            SlotName::GenderPreference => GenderPreference::from_str(raw)
                .map(SlotValue::GenderPreference)
                .map_err(|_| NormalizationError::new("gender preference", raw)),
            SlotName::AgePreference => normalize::parse_age_range(raw).map(SlotValue::AgeRange),
            SlotName::Height => normalize::parse_height_cm(raw).map(SlotValue::HeightCm),
            SlotName::Interests | SlotName::Preferences | SlotName::DealBreakers => {
                let items = split_list(raw);
                if items.is_empty() {
                    return Err(NormalizationError::new("list", raw));
                }
                Ok(SlotValue::List(items))
            }
        }
    }

    /// Try this slot's local pattern rules against the utterance.
    ///
    /// The list slots have no local pattern; they come from the recognizer
    /// or the external service only.
    pub fn pattern_extract(&self, utterance: &str) -> Option<PatternMatch> {
        match self {
            SlotName::Name => extract_name(utterance),
            SlotName::Age => extract_age(utterance),
            SlotName::Gender => extract_gender(utterance),
            SlotName::GenderPreference => extract_gender_preference(utterance),
            SlotName::AgePreference => extract_age_preference(utterance),
            SlotName::Height => extract_height(utterance),
            SlotName::Interests | SlotName::Preferences | SlotName::DealBreakers => None,
        }
    }

    /// Check a typed value against this slot's validity predicate.
    ///
    /// `Skipped` passes for every slot; a variant of the wrong shape is
    /// rejected so stage gates only ever see well-typed stores.
    pub fn validate(&self, value: &SlotValue) -> Result<(), ValidationError> {
        if matches!(value, SlotValue::Skipped) {
            return Ok(());
        }

        match (self, value) {
            (SlotName::Name, SlotValue::Text(s)) => {
                let len = s.trim().chars().count();
                if len == 0 || len > 100 {
                    Err(ValidationError::new(
                        self.as_str(),
                        "must be 1 to 100 characters",
                    ))
                } else {
                    Ok(())
                }
            }
            (SlotName::Age, SlotValue::Integer(n)) => {
                if (13..=120).contains(n) {
                    Ok(())
                } else {
                    Err(ValidationError::new(
                        self.as_str(),
                        "must be between 13 and 120",
                    ))
                }
            }
            (SlotName::Gender, SlotValue::Gender(_)) => Ok(()),
            (SlotName::GenderPreference, SlotValue::GenderPreference(_)) => Ok(()),
            (SlotName::AgePreference, SlotValue::AgeRange(r)) => {
                if r.min >= 13 && r.max <= 120 && r.min <= r.max {
                    Ok(())
                } else {
                    Err(ValidationError::new(
                        self.as_str(),
                        "range must fall within 13 to 120",
                    ))
                }
            }
            (SlotName::Height, SlotValue::HeightCm(cm)) => {
                if (100..=250).contains(cm) {
                    Ok(())
                } else {
                    Err(ValidationError::new(
                        self.as_str(),
                        "must be between 100cm and 250cm",
                    ))
                }
            }
            (
                SlotName::Interests | SlotName::Preferences | SlotName::DealBreakers,
                SlotValue::List(items),
            ) => {
                if items.is_empty() {
                    Err(ValidationError::new(self.as_str(), "list must not be empty"))
                } else {
                    Ok(())
                }
            }
            _ => Err(ValidationError::new(
                self.as_str(),
                "unexpected value type for this slot",
            )),
        }
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Split a free-text enumeration into trimmed items.
fn split_list(raw: &str) -> Vec<String> {
    raw.split(|c| c == ',' || c == ';')
        .flat_map(|part| part.split(" and "))
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn extract_name(utterance: &str) -> Option<PatternMatch> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?i)\b(?:my name is|name's|call me|i am|i'm|im)\s+([a-z][a-z'-]+)")
            .expect("valid regex")
    });

    let caps = re.captures(utterance)?;
    let candidate = caps.get(1)?.as_str();

    // "I'm fine" / "I'm not telling" read as statements, not names.
    const NOT_NAMES: &[&str] = &[
        "not", "fine", "good", "okay", "ok", "here", "so", "very", "just", "really", "a", "an",
        "the",
    ];
    if NOT_NAMES.contains(&candidate.to_lowercase().as_str()) {
        return None;
    }

    Some(PatternMatch::new(
        SlotValue::Text(capitalize(candidate)),
        0.7,
        caps.get(0).map(|m| m.as_str()).unwrap_or(candidate),
    ))
}

fn extract_age(utterance: &str) -> Option<PatternMatch> {
    let (n, fragment) = normalize::find_integer(utterance)?;
    // Exact digit matches carry more weight than spelled-out numbers.
    let confidence = if fragment.chars().all(|c| c.is_ascii_digit()) {
        0.8
    } else {
        0.7
    };
    Some(PatternMatch::new(SlotValue::Integer(n), confidence, fragment))
}

fn extract_gender(utterance: &str) -> Option<PatternMatch> {
    static FEMALE: OnceLock<Regex> = OnceLock::new();
    static MALE: OnceLock<Regex> = OnceLock::new();
    static NONBINARY: OnceLock<Regex> = OnceLock::new();

    let lower = utterance.to_lowercase();

    let nonbinary = NONBINARY.get_or_init(|| {
        Regex::new(r"\b(non-binary|nonbinary|nb|enby)\b").expect("valid regex")
    });
    if let Some(m) = nonbinary.find(&lower) {
        return Some(PatternMatch::new(
            SlotValue::Gender(Gender::NonBinary),
            0.75,
            m.as_str(),
        ));
    }

    let female = FEMALE.get_or_init(|| {
        Regex::new(r"\b(female|woman|girl|lady|gal)\b").expect("valid regex")
    });
    if let Some(m) = female.find(&lower) {
        return Some(PatternMatch::new(
            SlotValue::Gender(Gender::Female),
            0.75,
            m.as_str(),
        ));
    }

    let male = MALE.get_or_init(|| {
        Regex::new(r"\b(male|man|boy|guy|dude|gentleman)\b").expect("valid regex")
    });
    if let Some(m) = male.find(&lower) {
        return Some(PatternMatch::new(
            SlotValue::Gender(Gender::Male),
            0.75,
            m.as_str(),
        ));
    }

    None
}

fn extract_gender_preference(utterance: &str) -> Option<PatternMatch> {
    static ANY: OnceLock<Regex> = OnceLock::new();
    static FEMALE: OnceLock<Regex> = OnceLock::new();
    static MALE: OnceLock<Regex> = OnceLock::new();
    static NONBINARY: OnceLock<Regex> = OnceLock::new();

    let lower = utterance.to_lowercase();

    let any = ANY.get_or_init(|| {
        Regex::new(r"\b(any|all|both|everyone|anyone|anybody|either)\b").expect("valid regex")
    });
    if let Some(m) = any.find(&lower) {
        return Some(PatternMatch::new(
            SlotValue::GenderPreference(GenderPreference::Any),
            0.75,
            m.as_str(),
        ));
    }

    let nonbinary = NONBINARY.get_or_init(|| {
        Regex::new(r"\b(non-binary|nonbinary|nb|enby)\b").expect("valid regex")
    });
    if let Some(m) = nonbinary.find(&lower) {
        return Some(PatternMatch::new(
            SlotValue::GenderPreference(GenderPreference::NonBinary),
            0.75,
            m.as_str(),
        ));
    }

    let female = FEMALE.get_or_init(|| {
        Regex::new(r"\b(females?|women|woman|girls?)\b").expect("valid regex")
    });
    if let Some(m) = female.find(&lower) {
        return Some(PatternMatch::new(
            SlotValue::GenderPreference(GenderPreference::Female),
            0.75,
            m.as_str(),
        ));
    }

    let male = MALE.get_or_init(|| {
        Regex::new(r"\b(males?|men|man|boys?|guys?|dudes?)\b").expect("valid regex")
    });
    if let Some(m) = male.find(&lower) {
        return Some(PatternMatch::new(
            SlotValue::GenderPreference(GenderPreference::Male),
            0.75,
            m.as_str(),
        ));
    }

    None
}

fn extract_age_preference(utterance: &str) -> Option<PatternMatch> {
    static SPAN_OR_DECADE: OnceLock<Regex> = OnceLock::new();
    let span_or_decade = SPAN_OR_DECADE.get_or_init(|| {
        Regex::new(r"(\d{1,3}\s*(?:-|–|to|and)\s*\d{1,3})|(\b\d{1,2}0'?s\b)")
            .expect("valid regex")
    });

    let lower = utterance.to_lowercase();

    if let Some(m) = span_or_decade.find(&lower) {
        if let Ok(range) = normalize::parse_age_range(m.as_str()) {
            return Some(PatternMatch::new(
                SlotValue::AgeRange(range),
                0.8,
                m.as_str(),
            ));
        }
    }

    // A lone number like "25" is ambiguous (could be a height in inches),
    // so it only just clears the acceptance threshold.
    if let Some((n, fragment)) = normalize::find_integer(&lower) {
        if (13..=100).contains(&n) {
            return Some(PatternMatch::new(
                SlotValue::AgeRange(AgeRange {
                    min: n as u32,
                    max: n as u32,
                }),
                0.6,
                fragment,
            ));
        }
    }

    None
}

fn extract_height(utterance: &str) -> Option<PatternMatch> {
    static UNIT_MARKER: OnceLock<Regex> = OnceLock::new();
    let unit_marker = UNIT_MARKER.get_or_init(|| {
        Regex::new(r#"\d\s*(?:cm|centimetres?|centimeters?|m\b|metres?|meters?|'|"|ft\b|feet\b|foot\b|in\b|inch)"#)
            .expect("valid regex")
    });

    let cm = normalize::parse_height_cm(utterance).ok()?;
    let confidence = if unit_marker.is_match(&utterance.to_lowercase()) {
        0.8
    } else {
        0.65
    };

    Some(PatternMatch::new(
        SlotValue::HeightCm(cm),
        confidence,
        utterance.trim(),
    ))
}
