//! End-to-end tests: turn handling through extraction, stage progression,
//! logging, and export.

use serde_json::json;
use tempfile::tempdir;
use wiremock::{
    matchers::{body_partial_json, method, path},
    Mock, MockServer, ResponseTemplate,
};

use profile_intake::config::{
    Config, DatabaseConfig, ExtractionConfig, LogFormat, LoggingConfig, NluConfig, RequestConfig,
};
use profile_intake::engine::{IntakeEngine, TurnInput};
use profile_intake::export::{ConversationExporter, ExportFormat};
use profile_intake::nlu::NluClient;
use profile_intake::slots::{SlotName, SlotValue};
use profile_intake::stage::Stage;
use profile_intake::storage::{SessionSnapshot, SqliteStorage};

/// Create test configuration pointing at the mock service
fn create_test_config(mock_url: &str, db_path: std::path::PathBuf) -> Config {
    Config {
        nlu: NluConfig {
            base_url: mock_url.to_string(),
            model: "phi4".to_string(),
        },
        database: DatabaseConfig {
            path: db_path,
            max_connections: 1,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: LogFormat::Pretty,
        },
        request: RequestConfig {
            timeout_ms: 500,
            max_retries: 0,
            retry_delay_ms: 50,
        },
        extraction: ExtractionConfig::default(),
    }
}

async fn create_test_engine(mock_url: &str, db_path: std::path::PathBuf) -> IntakeEngine {
    let config = create_test_config(mock_url, db_path.clone());
    let storage = SqliteStorage::new(&config.database)
        .await
        .expect("Failed to create storage");
    let nlu =
        NluClient::new(&config.nlu, config.request.clone()).expect("Failed to create client");
    IntakeEngine::new(&config, storage, nlu)
}

/// Mount service answers for the free-text list slots.
async fn mount_list_slot_mocks(mock_server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .and(body_partial_json(json!({"slot": "interests"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "hiking, photography",
            "confidence": 0.85
        })))
        .mount(mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .and(body_partial_json(json!({"slot": "preferences"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "kindness, humor",
            "confidence": 0.8
        })))
        .mount(mock_server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .and(body_partial_json(json!({"slot": "deal_breakers"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": "smoking",
            "confidence": 0.8
        })))
        .mount(mock_server)
        .await;
}

#[tokio::test]
async fn test_full_conversation_reaches_done() {
    let mock_server = MockServer::start().await;
    mount_list_slot_mocks(&mock_server).await;

    let dir = tempdir().expect("Failed to create temp dir");
    let engine = create_test_engine(&mock_server.uri(), dir.path().join("test.db")).await;

    let turns = [
        "my name is alice",
        "I am 25 years old",
        "I'm a woman",
        "interested in anyone",
        "between 25 and 35",
        "5'10\"",
        "I love hiking and photography",
        "kindness and humor matter most",
        "smoking is a deal breaker",
    ];

    let mut last_stage = Stage::Greeting;
    for utterance in turns {
        let result = engine
            .handle_turn("sess-1", TurnInput::new(utterance))
            .await
            .unwrap();
        assert!(
            !result.needs_reprompt,
            "turn {:?} should fill its slot",
            utterance
        );
        assert!(
            result.stage.index() >= last_stage.index(),
            "stage must never move backwards"
        );
        last_stage = result.stage;
    }

    assert_eq!(last_stage, Stage::Done);

    let snapshot = engine.logger().snapshot("sess-1").await.unwrap();
    assert_eq!(snapshot.session.stage, Stage::Done);
    assert_eq!(
        snapshot.session.slots.get(&SlotName::Name),
        Some(&SlotValue::Text("Alice".to_string()))
    );
    assert_eq!(
        snapshot.session.slots.get(&SlotName::Age),
        Some(&SlotValue::Integer(25))
    );
    assert_eq!(
        snapshot.session.slots.get(&SlotName::Height),
        Some(&SlotValue::HeightCm(178))
    );
    assert_eq!(
        snapshot.session.slots.get(&SlotName::Interests),
        Some(&SlotValue::List(vec![
            "hiking".to_string(),
            "photography".to_string()
        ]))
    );
}

#[tokio::test]
async fn test_reprompt_then_recovery() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/extract"))
        .and(body_partial_json(json!({"slot": "age"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "value": null,
            "unparseable": true
        })))
        .mount(&mock_server)
        .await;

    let dir = tempdir().expect("Failed to create temp dir");
    let engine = create_test_engine(&mock_server.uri(), dir.path().join("test.db")).await;

    engine
        .handle_turn("sess-1", TurnInput::new("my name is alice"))
        .await
        .unwrap();

    // Nothing extractable locally and the service says unparseable.
    let result = engine
        .handle_turn("sess-1", TurnInput::new("pretty old, not sure"))
        .await
        .unwrap();
    assert!(result.needs_reprompt);
    assert_eq!(result.slot, Some(SlotName::Age));

    engine
        .record_bot_reply("sess-1", "Could you give me a number?", "reprompt_age")
        .await
        .unwrap();

    // The re-prompt succeeds locally without the service.
    let result = engine
        .handle_turn("sess-1", TurnInput::new("sorry, I'm 25"))
        .await
        .unwrap();
    assert!(!result.needs_reprompt);

    let snapshot = engine.logger().snapshot("sess-1").await.unwrap();
    assert_eq!(
        snapshot.session.slots.get(&SlotName::Age),
        Some(&SlotValue::Integer(25))
    );
}

#[tokio::test]
async fn test_late_metadata_amendment_via_logger() {
    let mock_server = MockServer::start().await;
    let dir = tempdir().expect("Failed to create temp dir");
    let engine = create_test_engine(&mock_server.uri(), dir.path().join("test.db")).await;

    engine
        .handle_turn("sess-1", TurnInput::new("my name is alice"))
        .await
        .unwrap();

    let snapshot = engine.logger().snapshot("sess-1").await.unwrap();
    let user_event = &snapshot.events[0];

    // A later turn reveals the intent of the earlier one.
    engine
        .logger()
        .update_metadata(
            "sess-1",
            &user_event.id,
            &json!({"intent": "introduce_self", "confidence": 0.92}),
        )
        .await
        .unwrap();

    let snapshot = engine.logger().snapshot("sess-1").await.unwrap();
    assert_eq!(snapshot.events.len(), 2 + 1); // unchanged event count
    assert_eq!(
        snapshot.events[0].metadata.intent.as_deref(),
        Some("introduce_self")
    );
    assert_eq!(snapshot.events[0].metadata.confidence, Some(0.92));
}

#[tokio::test]
async fn test_export_formats_agree_after_conversation() {
    let mock_server = MockServer::start().await;
    let dir = tempdir().expect("Failed to create temp dir");
    let engine = create_test_engine(&mock_server.uri(), dir.path().join("test.db")).await;

    engine
        .handle_turn("sess-1", TurnInput::new("my name is alice"))
        .await
        .unwrap();
    engine
        .record_bot_reply("sess-1", "Nice to meet you, Alice!", "acknowledge_name")
        .await
        .unwrap();
    engine
        .handle_turn("sess-1", TurnInput::new("I am 25 years old"))
        .await
        .unwrap();

    let exporter = ConversationExporter::new(engine.logger().clone());

    let structured = exporter
        .export("sess-1", ExportFormat::Structured)
        .await
        .unwrap();
    let snapshot: SessionSnapshot = serde_json::from_str(&structured).unwrap();

    let tabular = exporter.export("sess-1", ExportFormat::Tabular).await.unwrap();
    let rows: Vec<&str> = tabular.lines().skip(1).collect();
    assert_eq!(rows.len(), snapshot.events.len());

    // Timestamp, sender, and content survive in both projections.
    for (event, row) in snapshot.events.iter().zip(&rows) {
        assert!(row.starts_with(&event.timestamp.to_rfc3339()));
        assert!(row.contains(&event.sender.to_string()));
    }

    let flat = exporter.export("sess-1", ExportFormat::FlatText).await.unwrap();
    assert!(flat.contains("my name is alice"));
    assert!(flat.contains("[Action: acknowledge_name]"));
}

#[tokio::test]
async fn test_sessions_are_independent_across_restart() {
    let mock_server = MockServer::start().await;
    let dir = tempdir().expect("Failed to create temp dir");
    let db_path = dir.path().join("test.db");

    {
        let engine = create_test_engine(&mock_server.uri(), db_path.clone()).await;
        engine
            .handle_turn("sess-1", TurnInput::new("my name is alice"))
            .await
            .unwrap();
    }

    // A fresh engine over the same database sees the persisted session.
    let engine = create_test_engine(&mock_server.uri(), db_path).await;
    let result = engine
        .handle_turn("sess-1", TurnInput::new("I am 25 years old"))
        .await
        .unwrap();

    assert_eq!(result.slot, Some(SlotName::Age));

    let snapshot = engine.logger().snapshot("sess-1").await.unwrap();
    assert_eq!(
        snapshot.session.slots.get(&SlotName::Name),
        Some(&SlotValue::Text("Alice".to_string()))
    );
    assert_eq!(
        snapshot.session.slots.get(&SlotName::Age),
        Some(&SlotValue::Integer(25))
    );
}
