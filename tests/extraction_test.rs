//! Integration tests for the full extraction strategy chain
//!
//! Exercises the service fallback with a mocked text-understanding
//! endpoint; the local strategies are covered by unit tests.

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

use profile_intake::config::{ExtractionConfig, NluConfig, RequestConfig};
use profile_intake::extract::{
    ExtractionOutcome, FailureReason, SlotExtractor, Strategy,
};
use profile_intake::nlu::NluClient;
use profile_intake::slots::{SlotName, SlotValue};

fn create_test_extractor(base_url: &str) -> SlotExtractor {
    let nlu = NluClient::new(
        &NluConfig {
            base_url: base_url.to_string(),
            model: "phi4".to_string(),
        },
        RequestConfig {
            timeout_ms: 500,
            max_retries: 0,
            retry_delay_ms: 50,
        },
    )
    .expect("Failed to create client");

    SlotExtractor::new(nlu, &ExtractionConfig::default())
}

#[tokio::test]
async fn test_pattern_match_never_calls_service() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": "99"})))
        .expect(0)
        .mount(&mock_server)
        .await;

    let extractor = create_test_extractor(&mock_server.uri());
    let outcome = extractor
        .extract(SlotName::Age, "I am 25 years old", &[])
        .await;

    let result = outcome.as_result().expect("should extract");
    assert_eq!(result.value, SlotValue::Integer(25));
    assert_eq!(result.strategy, Strategy::Pattern);
    assert_eq!(result.confidence, 0.8);
}

#[tokio::test]
async fn test_service_fallback_when_no_local_match() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .and(body_partial_json(json!({
            "utterance": "I stopped counting a while ago, maybe mid-twenties",
            "slot": "age"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "25",
            "confidence": 0.7
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let extractor = create_test_extractor(&mock_server.uri());
    let outcome = extractor
        .extract(
            SlotName::Age,
            "I stopped counting a while ago, maybe mid-twenties",
            &[],
        )
        .await;

    let result = outcome.as_result().expect("should extract via service");
    assert_eq!(result.strategy, Strategy::Service);
    assert_eq!(result.value, SlotValue::Integer(25));
    assert_eq!(result.confidence, 0.7);
}

#[tokio::test]
async fn test_service_unparseable_yields_failure() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": null,
            "unparseable": true
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let extractor = create_test_extractor(&mock_server.uri());
    let outcome = extractor
        .extract(SlotName::Age, "pretty old, not sure", &[])
        .await;

    match outcome {
        ExtractionOutcome::Failed(failure) => {
            assert_eq!(failure.slot, SlotName::Age);
            assert_eq!(failure.reason, FailureReason::Unparseable);
        }
        ExtractionOutcome::Extracted(r) => panic!("unexpected extraction: {:?}", r),
    }
}

#[tokio::test]
async fn test_service_value_failing_normalization_is_unparseable() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "quite mature",
            "confidence": 0.9
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let extractor = create_test_extractor(&mock_server.uri());
    let outcome = extractor
        .extract(SlotName::Age, "pretty old, not sure", &[])
        .await;

    match outcome {
        ExtractionOutcome::Failed(failure) => {
            assert_eq!(failure.reason, FailureReason::Unparseable);
        }
        ExtractionOutcome::Extracted(r) => panic!("unexpected extraction: {:?}", r),
    }
}

#[tokio::test]
async fn test_service_without_confidence_rejected_by_threshold() {
    let mock_server = MockServer::start().await;

    // An unscored reply defaults to 0.5 which sits below the 0.6 threshold.
    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "25"
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let extractor = create_test_extractor(&mock_server.uri());
    let outcome = extractor
        .extract(SlotName::Age, "pretty old, not sure", &[])
        .await;

    match outcome {
        ExtractionOutcome::Failed(failure) => {
            assert_eq!(failure.reason, FailureReason::NoMatch);
        }
        ExtractionOutcome::Extracted(r) => panic!("unexpected extraction: {:?}", r),
    }
}

#[tokio::test]
async fn test_list_slot_extracted_by_service() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .and(body_partial_json(json!({"slot": "interests"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "hiking, cooking and jazz",
            "confidence": 0.85
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let extractor = create_test_extractor(&mock_server.uri());
    let outcome = extractor
        .extract(
            SlotName::Interests,
            "I spend my weekends outdoors or in the kitchen, and I love live music",
            &[],
        )
        .await;

    let result = outcome.as_result().expect("should extract via service");
    assert_eq!(
        result.value,
        SlotValue::List(vec![
            "hiking".to_string(),
            "cooking".to_string(),
            "jazz".to_string()
        ])
    );
}

#[tokio::test]
async fn test_service_down_fails_extraction_locally() {
    let extractor = create_test_extractor("http://127.0.0.1:9");

    let outcome = extractor
        .extract(SlotName::Age, "pretty old, not sure", &[])
        .await;

    match outcome {
        ExtractionOutcome::Failed(failure) => {
            assert!(matches!(
                failure.reason,
                FailureReason::ServiceUnavailable { .. }
            ));
        }
        ExtractionOutcome::Extracted(r) => panic!("unexpected extraction: {:?}", r),
    }
}
