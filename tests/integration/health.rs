//! Index and health endpoint integration tests
//!
//! - GET / - Service index with provider prefixes
//! - GET /health - Status with per-provider configuration
//! - GET /health/live - Liveness probe

use axum::http::StatusCode;
use serde_json::Value;

use crate::common::{test_server, RecordingHook, TestEnv};

#[tokio::test]
async fn test_index_lists_provider_prefixes() {
    let server = test_server(TestEnv::new().config(), RecordingHook::new());

    let response = server.get("/").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["service"], "llm-relay");
    assert_eq!(body["status"], "running");

    let prefixes: Vec<(&str, &str)> = body["providers"]
        .as_array()
        .unwrap()
        .iter()
        .map(|p| (p["prefix"].as_str().unwrap(), p["provider"].as_str().unwrap()))
        .collect();
    assert_eq!(
        prefixes,
        vec![
            ("/openai", "openai"),
            ("/azure", "azure"),
            ("/bedrock", "bedrock"),
            ("/vertex", "vertex"),
            ("/openai-proxy", "openai-proxy"),
        ]
    );
}

#[tokio::test]
async fn test_health_degraded_without_credentials() {
    let server = test_server(TestEnv::new().config(), RecordingHook::new());

    let response = server.get("/health").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["telemetry"], false);
    assert!(body["providers"]
        .as_array()
        .unwrap()
        .iter()
        .all(|p| p["configured"] == false));
}

#[tokio::test]
async fn test_health_reports_configured_providers() {
    let config = TestEnv::new()
        .openai("http://127.0.0.1:9")
        .vertex("http://127.0.0.1:9")
        .config();
    let server = test_server(config, RecordingHook::new());

    let response = server.get("/health").await;

    let body: Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));

    let configured = |name: &str| {
        body["providers"]
            .as_array()
            .unwrap()
            .iter()
            .find(|p| p["provider"] == name)
            .map(|p| p["configured"].as_bool().unwrap())
            .unwrap()
    };
    assert!(configured("openai"));
    assert!(configured("vertex"));
    assert!(configured("openai-proxy"));
    assert!(!configured("azure"));
    assert!(!configured("bedrock"));
}

#[tokio::test]
async fn test_liveness() {
    let server = test_server(TestEnv::new().config(), RecordingHook::new());

    let response = server.get("/health/live").await;

    response.assert_status_ok();
    response.assert_json(&serde_json::json!({"status": "healthy"}));
}

#[tokio::test]
async fn test_health_does_not_run_hooks() {
    let hook = RecordingHook::new();
    let server = test_server(TestEnv::new().config(), hook.clone());

    server.get("/health").await.assert_status(StatusCode::OK);

    assert!(hook.pre_requests().is_empty());
    assert!(hook.records().is_empty());
}
