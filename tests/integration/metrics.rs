//! Prometheus metrics integration tests
//!
//! The global recorder can only be installed once per process, so every
//! test here shares it and uses endpoint labels no other test produces.
//! Only `other` is shared, so assertions on it are lower bounds.

use std::sync::OnceLock;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::json;

use llm_relay::{routes::metrics::metrics_router, Telemetry};

use crate::common::{test_server, RecordingHook, TestEnv};
use crate::mocks::MockOpenAI;

static TELEMETRY: OnceLock<Telemetry> = OnceLock::new();

fn telemetry() -> &'static Telemetry {
    TELEMETRY.get_or_init(|| {
        let config = TestEnv::new().set("ENABLE_TELEMETRY", "true").config();
        Telemetry::init(&config)
            .expect("recorder installs")
            .expect("telemetry enabled")
    })
}

fn sample_value(rendered: &str, name: &str, labels: &[&str]) -> Option<f64> {
    rendered
        .lines()
        .filter(|l| !l.starts_with('#'))
        .find(|l| l.starts_with(&format!("{}{{", name)) && labels.iter().all(|label| l.contains(label)))
        .and_then(|l| l.rsplit(' ').next())
        .and_then(|v| v.parse().ok())
}

#[tokio::test]
async fn test_request_counted_exactly_once() {
    let telemetry = telemetry();
    let openai = MockOpenAI::start().await;
    openai.mock_json("moderations", json!({"results": []})).await;
    let server = test_server(TestEnv::new().openai(&openai.uri()).config(), RecordingHook::new());

    server
        .post("/openai/moderations")
        .json(&json!({"input": "hello"}))
        .await
        .assert_status_ok();

    let rendered = telemetry.render();
    assert_eq!(
        sample_value(
            &rendered,
            "llm_relay_requests_total",
            &[
                "provider=\"openai\"",
                "endpoint=\"moderations\"",
                "status=\"200\""
            ],
        ),
        Some(1.0)
    );
    assert!(sample_value(
        &rendered,
        "llm_relay_errors_total",
        &["endpoint=\"moderations\""]
    )
    .is_none());
}

#[tokio::test]
async fn test_failed_request_counted_as_error() {
    let telemetry = telemetry();
    let server = test_server(TestEnv::new().config(), RecordingHook::new());

    server
        .post("/bedrock/model/m/invoke-with-response-stream")
        .json(&json!({}))
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let rendered = telemetry.render();
    assert_eq!(
        sample_value(
            &rendered,
            "llm_relay_errors_total",
            &[
                "provider=\"bedrock\"",
                "endpoint=\"model/:id/invoke-with-response-stream\"",
                "error_type=\"credential_missing\""
            ],
        ),
        Some(1.0)
    );
    assert_eq!(
        sample_value(
            &rendered,
            "llm_relay_requests_total",
            &["endpoint=\"model/:id/invoke-with-response-stream\"", "status=\"503\""],
        ),
        Some(1.0)
    );
}

#[tokio::test]
async fn test_arbitrary_paths_share_other_label() {
    let telemetry = telemetry();
    let openai = MockOpenAI::start().await;
    let server = test_server(TestEnv::new().openai(&openai.uri()).config(), RecordingHook::new());

    for path in ["/openai/a1b2c3", "/openai/d4e5f6", "/openai/chat/completions/extra"] {
        server.post(path).json(&json!({})).await;
    }

    let rendered = telemetry.render();
    assert!(!rendered.contains("a1b2c3"));
    assert!(!rendered.contains("d4e5f6"));
    let other = sample_value(
        &rendered,
        "llm_relay_requests_total",
        &["provider=\"openai\"", "endpoint=\"other\"", "status=\"404\""],
    );
    assert!(other.unwrap_or(0.0) >= 3.0);
}

#[tokio::test]
async fn test_stream_counted_when_finished() {
    let telemetry = telemetry();
    let openai = MockOpenAI::start().await;
    openai
        .mock_chat_completion_stream("gpt-4o-mini", &["x"])
        .await;
    let hook = RecordingHook::new();
    let server = test_server(TestEnv::new().openai(&openai.uri()).config(), hook.clone());

    // Other tests stream through this label too, so only a lower bound holds
    server
        .post("/openai/chat/completions")
        .json(&json!({"model": "gpt-4o-mini", "stream": true}))
        .await
        .assert_status_ok();
    hook.wait_for_records(1).await;

    let rendered = telemetry.render();
    let streamed = sample_value(
        &rendered,
        "llm_relay_streaming_requests_total",
        &["provider=\"openai\"", "endpoint=\"chat/completions\""],
    );
    assert!(streamed.unwrap_or(0.0) >= 1.0);
}

#[tokio::test]
async fn test_metrics_listener_serves_render() {
    let telemetry = telemetry();
    let server = TestServer::new(metrics_router(telemetry.handle())).unwrap();

    let response = server.get("/metrics").await;

    response.assert_status_ok();
    assert!(response
        .headers()
        .get("content-type")
        .unwrap()
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
}

#[test]
fn test_disabled_telemetry_installs_nothing() {
    let config = TestEnv::new().set("ENABLE_TELEMETRY", "false").config();
    assert!(Telemetry::init(&config).unwrap().is_none());
}
