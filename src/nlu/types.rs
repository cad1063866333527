use serde::{Deserialize, Serialize};

/// Request to the text-understanding service
#[derive(Debug, Clone, Serialize)]
pub struct ExtractRequest {
    /// The raw user utterance.
    pub utterance: String,
    /// Slot name being filled.
    pub slot: String,
    /// One-line description of what to extract.
    #[serde(rename = "slotDescription")]
    pub slot_description: String,
    /// Model the service should run.
    pub model: String,
}

/// Response from the text-understanding service
#[derive(Debug, Clone, Deserialize)]
pub struct ExtractResponse {
    /// The extracted value, absent when nothing was found.
    pub value: Option<String>,
    /// Service-reported confidence, absent when the service does not score.
    pub confidence: Option<f64>,
    /// Explicit marker that the utterance holds no answer for this slot.
    #[serde(default)]
    pub unparseable: bool,
}

impl ExtractRequest {
    /// Create a new extraction request
    pub fn new(
        utterance: impl Into<String>,
        slot: impl Into<String>,
        slot_description: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            utterance: utterance.into(),
            slot: slot.into(),
            slot_description: slot_description.into(),
            model: model.into(),
        }
    }
}

impl ExtractResponse {
    /// Whether the service produced a usable value.
    pub fn has_value(&self) -> bool {
        !self.unparseable && self.value.as_deref().is_some_and(|v| !v.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_camel_case_description() {
        let request = ExtractRequest::new("I am 25", "age", "the user's age", "phi4");
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["slotDescription"], "the user's age");
        assert_eq!(json["utterance"], "I am 25");
    }

    #[test]
    fn test_response_has_value() {
        let response: ExtractResponse =
            serde_json::from_str(r#"{"value": "25", "confidence": 0.9}"#).unwrap();
        assert!(response.has_value());

        let response: ExtractResponse =
            serde_json::from_str(r#"{"value": null, "unparseable": true}"#).unwrap();
        assert!(!response.has_value());

        let response: ExtractResponse = serde_json::from_str(r#"{"value": "  "}"#).unwrap();
        assert!(!response.has_value());
    }
}
