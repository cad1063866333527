//! Integration tests for the text-understanding service client
//!
//! Tests HTTP client behavior using wiremock for request/response mocking.

use std::time::Duration;

use serde_json::json;
use wiremock::{
    matchers::{body_partial_json, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

use profile_intake::config::{NluConfig, RequestConfig};
use profile_intake::nlu::{ExtractRequest, NluClient};

/// Create a test client pointing to the mock server
fn create_test_client(base_url: &str, max_retries: u32) -> NluClient {
    let config = NluConfig {
        base_url: base_url.to_string(),
        model: "phi4".to_string(),
    };

    let request_config = RequestConfig {
        timeout_ms: 500,
        max_retries,
        retry_delay_ms: 50,
    };

    NluClient::new(&config, request_config).expect("Failed to create client")
}

/// Create a simple extraction request for testing
fn create_test_request(utterance: &str) -> ExtractRequest {
    ExtractRequest::new(utterance, "age", "the user's age in years, as a number", "phi4")
}

#[tokio::test]
async fn test_successful_extraction() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .and(header("Content-Type", "application/json"))
        .and(body_partial_json(json!({
            "utterance": "I am twenty five",
            "slot": "age",
            "model": "phi4"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "25",
            "confidence": 0.9
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri(), 1);
    let result = client.extract(create_test_request("I am twenty five")).await;

    assert!(result.is_ok(), "Extraction should succeed: {:?}", result.err());
    let response = result.unwrap();
    assert!(response.has_value());
    assert_eq!(response.value.as_deref(), Some("25"));
    assert_eq!(response.confidence, Some(0.9));
}

#[tokio::test]
async fn test_unparseable_marker() {
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

    let client = create_test_client(&mock_server.uri(), 1);
    let result = client
        .extract(create_test_request("pretty old, not sure"))
        .await;

    let response = result.unwrap();
    assert!(!response.has_value());
    assert!(response.unparseable);
}

#[tokio::test]
async fn test_timeout_retried_exactly_once() {
    let mock_server = MockServer::start().await;

    // Every response takes longer than the client timeout; with one retry
    // the client should hit the server exactly twice before giving up.
    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"value": "25"}))
                .set_delay(Duration::from_millis(2000)),
        )
        .expect(2)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri(), 1);
    let result = client.extract(create_test_request("I am 25")).await;

    assert!(result.is_err(), "Should fail after bounded retries");
}

#[tokio::test]
async fn test_api_error_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal error"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri(), 1);
    let result = client.extract(create_test_request("I am 25")).await;

    assert!(result.is_err(), "Should fail on API error without retrying");
}

#[tokio::test]
async fn test_malformed_response_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let client = create_test_client(&mock_server.uri(), 1);
    let result = client.extract(create_test_request("I am 25")).await;

    assert!(result.is_err(), "Malformed body should be a definitive failure");
}

#[tokio::test]
async fn test_unreachable_host_fails() {
    // Nothing listens on this port.
    let client = create_test_client("http://127.0.0.1:9", 1);
    let result = client.extract(create_test_request("I am 25")).await;

    assert!(result.is_err(), "Unreachable host should fail");
}
