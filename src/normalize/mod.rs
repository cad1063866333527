//! Pure text-to-typed-value conversions.
//!
//! Every function is stateless and either returns a normalized value or a
//! [`NormalizationError`] naming the fragment that failed to parse. Callers
//! decide the fallback.

use std::sync::OnceLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::NormalizationError;

/// Yes/no/maybe answer to a closed question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
    Yes,
    No,
    Maybe,
}

impl std::fmt::Display for TriState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriState::Yes => write!(f, "yes"),
            TriState::No => write!(f, "no"),
            TriState::Maybe => write!(f, "maybe"),
        }
    }
}

/// Inclusive age range, e.g. from "25-35" or "30s".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgeRange {
    pub min: u32,
    pub max: u32,
}

fn word_values() -> &'static [(&'static str, i64)] {
    &[
        ("zero", 0),
        ("one", 1),
        ("two", 2),
        ("three", 3),
        ("four", 4),
        ("five", 5),
        ("six", 6),
        ("seven", 7),
        ("eight", 8),
        ("nine", 9),
        ("ten", 10),
        ("eleven", 11),
        ("twelve", 12),
        ("thirteen", 13),
        ("fourteen", 14),
        ("fifteen", 15),
        ("sixteen", 16),
        ("seventeen", 17),
        ("eighteen", 18),
        ("nineteen", 19),
        ("twenty", 20),
        ("thirty", 30),
        ("forty", 40),
        ("fifty", 50),
        ("sixty", 60),
        ("seventy", 70),
        ("eighty", 80),
        ("ninety", 90),
    ]
}

fn lookup_word(word: &str) -> Option<i64> {
    word_values()
        .iter()
        .find(|(w, _)| *w == word)
        .map(|(_, v)| *v)
}

/// Parse a text fragment into an integer.
///
/// Accepts digit sequences ("25") and spelled-out numbers up to 999
/// ("twenty-five", "twenty five", "one hundred and eight").
pub fn parse_integer(text: &str) -> Result<i64, NormalizationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(NormalizationError::new("integer", text));
    }

    if let Ok(n) = trimmed.parse::<i64>() {
        return Ok(n);
    }

    let lower = trimmed.to_lowercase();
    let words: Vec<&str> = lower
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|w| !w.is_empty() && *w != "and")
        .collect();

    parse_spelled_words(&words).ok_or_else(|| NormalizationError::new("integer", text))
}

fn parse_spelled_words(words: &[&str]) -> Option<i64> {
    if words.is_empty() {
        return None;
    }

    let mut value = 0i64;

    for word in words {
        if *word == "hundred" {
            if value == 0 {
                value = 1;
            }
            value *= 100;
        } else if let Some(v) = lookup_word(word) {
            value += v;
        } else {
            return None;
        }
    }

    if value <= 999 {
        Some(value)
    } else {
        None
    }
}

/// Find the first integer in free text, digit or spelled-out.
///
/// Returns the value and the matching source fragment, or `None` when the
/// text contains neither form.
pub fn find_integer(text: &str) -> Option<(i64, String)> {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    let digits = DIGITS.get_or_init(|| Regex::new(r"\b(\d{1,3})\b").expect("valid regex"));

    if let Some(m) = digits.find(text) {
        if let Ok(n) = m.as_str().parse::<i64>() {
            return Some((n, m.as_str().to_string()));
        }
    }

    // Scan for a run of spelled-number words ("twenty five", "twenty-five").
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_alphabetic() && c != '-')
        .filter(|t| !t.is_empty())
        .collect();

    for start in 0..tokens.len() {
        let mut parts: Vec<&str> = Vec::new();
        for token in &tokens[start..] {
            let subwords: Vec<&str> = token.split('-').filter(|w| !w.is_empty()).collect();
            let all_known = subwords
                .iter()
                .all(|w| lookup_word(w).is_some() || *w == "hundred");
            if !all_known {
                break;
            }
            parts.extend(subwords);
        }
        if !parts.is_empty() {
            if let Some(n) = parse_spelled_words(&parts) {
                return Some((n, parts.join(" ")));
            }
        }
    }

    None
}

/// Compute age in whole years from a date of birth.
pub fn age_from_dob(dob: NaiveDate, today: NaiveDate) -> Result<u32, NormalizationError> {
    if dob > today {
        return Err(NormalizationError::new("date of birth", dob.to_string()));
    }

    let mut age = today.year() - dob.year();
    if (today.month(), today.day()) < (dob.month(), dob.day()) {
        age -= 1;
    }

    u32::try_from(age).map_err(|_| NormalizationError::new("date of birth", dob.to_string()))
}

/// Normalize free-text height to whole centimetres.
///
/// Accepts explicit units ("178cm", "1.78m", `5'10"`, "5 ft 10") and bare
/// numbers disambiguated by range: 120-230 reads as centimetres, 48-84 as
/// total inches, 4-7 as whole feet. Normalizing the canonical rendering
/// ("178cm") returns the same value unchanged.
pub fn parse_height_cm(text: &str) -> Result<u32, NormalizationError> {
    static CM: OnceLock<Regex> = OnceLock::new();
    static METERS: OnceLock<Regex> = OnceLock::new();
    static FEET_INCHES: OnceLock<Regex> = OnceLock::new();
    static BARE: OnceLock<Regex> = OnceLock::new();

    let lower = text.trim().to_lowercase();

    let cm = CM.get_or_init(|| {
        Regex::new(r"(\d{2,3}(?:\.\d+)?)\s*(?:cm|centimetres?|centimeters?)\b")
            .expect("valid regex")
    });
    if let Some(caps) = cm.captures(&lower) {
        if let Ok(v) = caps[1].parse::<f64>() {
            return Ok(v.round() as u32);
        }
    }

    let meters = METERS
        .get_or_init(|| Regex::new(r"([0-2](?:\.\d+))\s*(?:m|metres?|meters?)\b").expect("valid regex"));
    if let Some(caps) = meters.captures(&lower) {
        if let Ok(v) = caps[1].parse::<f64>() {
            return Ok((v * 100.0).round() as u32);
        }
    }

    let feet_inches = FEET_INCHES.get_or_init(|| {
        Regex::new(r#"(\d)\s*(?:'|ft\b|feet\b|foot\b)[\s-]*(\d{1,2})?\s*(?:"|''|in\b|inch(?:es)?\b)?"#)
            .expect("valid regex")
    });
    if let Some(caps) = feet_inches.captures(&lower) {
        let feet: f64 = caps[1].parse().map_err(|_| NormalizationError::new("height", text))?;
        let inches: f64 = caps
            .get(2)
            .map(|m| m.as_str().parse().unwrap_or(0.0))
            .unwrap_or(0.0);
        if (3.0..=8.0).contains(&feet) && inches < 12.0 {
            return Ok(((feet * 12.0 + inches) * 2.54).round() as u32);
        }
    }

    let bare = BARE.get_or_init(|| Regex::new(r"\b(\d{1,3})\b").expect("valid regex"));
    if let Some(caps) = bare.captures(&lower) {
        if let Ok(n) = caps[1].parse::<u32>() {
            return match n {
                120..=230 => Ok(n),
                48..=84 => Ok((n as f64 * 2.54).round() as u32),
                4..=7 => Ok((n as f64 * 12.0 * 2.54).round() as u32),
                _ => Err(NormalizationError::new("height", text)),
            };
        }
    }

    Err(NormalizationError::new("height", text))
}

/// Render a height in the canonical form accepted back by
/// [`parse_height_cm`].
pub fn format_height_cm(cm: u32) -> String {
    format!("{}cm", cm)
}

/// Parse a yes/no/maybe answer.
pub fn parse_tri_state(text: &str) -> Result<TriState, NormalizationError> {
    let lower = text.trim().to_lowercase();
    let word = lower
        .split(|c: char| !c.is_alphabetic())
        .find(|w| !w.is_empty())
        .unwrap_or("");

    match word {
        "yes" | "yeah" | "yep" | "yup" | "sure" | "definitely" | "absolutely" | "ok" | "okay" => {
            Ok(TriState::Yes)
        }
        "no" | "nope" | "nah" | "never" => Ok(TriState::No),
        "maybe" | "perhaps" | "possibly" | "sometimes" | "depends" => Ok(TriState::Maybe),
        _ => Err(NormalizationError::new("tri-state", text)),
    }
}

/// Parse a free-text age range into an inclusive (min, max) pair.
///
/// Accepts spans ("25-35", "25 to 35"), decades ("30s" reads as 30-39),
/// and a single number ("25" reads as 25-25).
pub fn parse_age_range(text: &str) -> Result<AgeRange, NormalizationError> {
    static SPAN: OnceLock<Regex> = OnceLock::new();
    static DECADE: OnceLock<Regex> = OnceLock::new();
    static SINGLE: OnceLock<Regex> = OnceLock::new();

    let lower = text.trim().to_lowercase();

    let span = SPAN.get_or_init(|| {
        Regex::new(r"(\d{1,3})\s*(?:-|–|to|and)\s*(\d{1,3})").expect("valid regex")
    });
    if let Some(caps) = span.captures(&lower) {
        let min: u32 = caps[1].parse().map_err(|_| NormalizationError::new("age range", text))?;
        let max: u32 = caps[2].parse().map_err(|_| NormalizationError::new("age range", text))?;
        if min <= max {
            return Ok(AgeRange { min, max });
        }
        return Err(NormalizationError::new("age range", text));
    }

    let decade = DECADE.get_or_init(|| Regex::new(r"\b(\d{1,2}0)'?s\b").expect("valid regex"));
    if let Some(caps) = decade.captures(&lower) {
        if let Ok(base) = caps[1].parse::<u32>() {
            return Ok(AgeRange {
                min: base,
                max: base + 9,
            });
        }
    }

    let single = SINGLE.get_or_init(|| Regex::new(r"\b(\d{1,3})\b").expect("valid regex"));
    if let Some(caps) = single.captures(&lower) {
        if let Ok(n) = caps[1].parse::<u32>() {
            return Ok(AgeRange { min: n, max: n });
        }
    }

    Err(NormalizationError::new("age range", text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_integer_digits() {
        assert_eq!(parse_integer("25").unwrap(), 25);
        assert_eq!(parse_integer(" 108 ").unwrap(), 108);
    }

    #[test]
    fn test_parse_integer_spelled() {
        assert_eq!(parse_integer("twenty five").unwrap(), 25);
        assert_eq!(parse_integer("twenty-five").unwrap(), 25);
        assert_eq!(parse_integer("eighteen").unwrap(), 18);
        assert_eq!(parse_integer("one hundred and eight").unwrap(), 108);
    }

    #[test]
    fn test_parse_integer_rejects_garbage() {
        assert!(parse_integer("pretty old").is_err());
        assert!(parse_integer("").is_err());
    }

    #[test]
    fn test_find_integer_in_sentence() {
        let (n, fragment) = find_integer("I am 25 years old").unwrap();
        assert_eq!(n, 25);
        assert_eq!(fragment, "25");

        let (n, fragment) = find_integer("I am twenty five years old").unwrap();
        assert_eq!(n, 25);
        assert_eq!(fragment, "twenty five");
    }

    #[test]
    fn test_find_integer_none() {
        assert!(find_integer("pretty old, not sure").is_none());
    }

    #[test]
    fn test_age_from_dob() {
        let dob = NaiveDate::from_ymd_opt(1998, 6, 15).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 6, 14).unwrap();
        assert_eq!(age_from_dob(dob, today).unwrap(), 27);

        let today = NaiveDate::from_ymd_opt(2026, 6, 15).unwrap();
        assert_eq!(age_from_dob(dob, today).unwrap(), 28);
    }

    #[test]
    fn test_age_from_dob_future_fails() {
        let dob = NaiveDate::from_ymd_opt(2030, 1, 1).unwrap();
        let today = NaiveDate::from_ymd_opt(2026, 1, 1).unwrap();
        assert!(age_from_dob(dob, today).is_err());
    }

    #[test]
    fn test_parse_height_explicit_units() {
        assert_eq!(parse_height_cm("178cm").unwrap(), 178);
        assert_eq!(parse_height_cm("178 centimeters").unwrap(), 178);
        assert_eq!(parse_height_cm("1.78m").unwrap(), 178);
        assert_eq!(parse_height_cm("5'10\"").unwrap(), 178);
        assert_eq!(parse_height_cm("5 ft 10").unwrap(), 178);
        assert_eq!(parse_height_cm("6 feet").unwrap(), 183);
    }

    #[test]
    fn test_parse_height_bare_numbers() {
        // 120-230 reads as cm
        assert_eq!(parse_height_cm("170").unwrap(), 170);
        // 48-84 reads as total inches
        assert_eq!(parse_height_cm("70").unwrap(), 178);
        // 4-7 reads as feet
        assert_eq!(parse_height_cm("6").unwrap(), 183);
    }

    #[test]
    fn test_parse_height_idempotent() {
        let first = parse_height_cm("5'10\"").unwrap();
        let rendered = format_height_cm(first);
        assert_eq!(parse_height_cm(&rendered).unwrap(), first);
    }

    #[test]
    fn test_parse_height_rejects_garbage() {
        assert!(parse_height_cm("tall-ish").is_err());
        assert!(parse_height_cm("999").is_err());
    }

    #[test]
    fn test_parse_tri_state() {
        assert_eq!(parse_tri_state("yes").unwrap(), TriState::Yes);
        assert_eq!(parse_tri_state("Yeah, sure!").unwrap(), TriState::Yes);
        assert_eq!(parse_tri_state("nope").unwrap(), TriState::No);
        assert_eq!(parse_tri_state("maybe?").unwrap(), TriState::Maybe);
        assert!(parse_tri_state("banana").is_err());
    }

    #[test]
    fn test_parse_age_range_span() {
        assert_eq!(
            parse_age_range("25-35").unwrap(),
            AgeRange { min: 25, max: 35 }
        );
        assert_eq!(
            parse_age_range("25 to 35").unwrap(),
            AgeRange { min: 25, max: 35 }
        );
        assert_eq!(
            parse_age_range("between 25 and 35").unwrap(),
            AgeRange { min: 25, max: 35 }
        );
    }

    #[test]
    fn test_parse_age_range_decade() {
        assert_eq!(
            parse_age_range("30s").unwrap(),
            AgeRange { min: 30, max: 39 }
        );
    }

    #[test]
    fn test_parse_age_range_single() {
        assert_eq!(
            parse_age_range("25").unwrap(),
            AgeRange { min: 25, max: 25 }
        );
    }

    #[test]
    fn test_parse_age_range_inverted_fails() {
        assert!(parse_age_range("35-25").is_err());
        assert!(parse_age_range("whatever").is_err());
    }
}
