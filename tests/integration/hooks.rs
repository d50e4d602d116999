//! Audit hook lifecycle integration tests
//!
//! Pre-request hooks run before dispatch; post-response hooks run exactly
//! once per request, after the body was released for streamed replies.

use std::sync::Arc;

use axum::http::StatusCode;
use axum_test::TestServer;
use serde_json::{json, Value};

use llm_relay::{hooks::AuditBody, routes, AppState, Outcome, ProviderKind};

use crate::common::{test_server, RecordingHook, TestEnv};
use crate::mocks::{MockBedrock, MockOpenAI};

fn chat_body(model: &str, stream: bool) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "Say hi"}],
        "stream": stream
    })
}

#[tokio::test]
async fn test_buffered_response_runs_post_hook_once() {
    let openai = MockOpenAI::start().await;
    openai.mock_chat_completion("gpt-4o-mini", "Hi").await;
    let hook = RecordingHook::new();
    let server = test_server(TestEnv::new().openai(&openai.uri()).config(), hook.clone());

    let response = server
        .post("/openai/chat/completions")
        .json(&chat_body("gpt-4o-mini", false))
        .await;
    response.assert_status_ok();

    // Buffered replies finish their hooks before the response is returned
    let records = hook.records();
    assert_eq!(records.len(), 1);
    assert_eq!(hook.pre_requests().len(), 1);

    let record = &records[0];
    let request_id = response.headers().get("x-relay-request-id").unwrap();
    assert_eq!(record.request_id, request_id.to_str().unwrap());
    assert_eq!(hook.pre_requests()[0], record.request_id);
    assert_eq!(record.provider, ProviderKind::OpenAI);
    assert_eq!(record.endpoint, "chat/completions");
    assert_eq!(record.model.as_deref(), Some("gpt-4o-mini"));
    assert_eq!(record.status, 200);
    assert_eq!(record.outcome, Outcome::Success);
    assert!(!record.stream);
    match &record.response_body {
        AuditBody::Json(body) => assert_eq!(body["choices"][0]["message"]["content"], "Hi"),
        other => panic!("unexpected response body {:?}", other),
    }
    match &record.request_body {
        AuditBody::Json(body) => assert_eq!(body["model"], "gpt-4o-mini"),
        other => panic!("unexpected request body {:?}", other),
    }
}

#[tokio::test]
async fn test_stream_post_hook_after_body_released() {
    let openai = MockOpenAI::start().await;
    openai
        .mock_chat_completion_stream("gpt-4o-mini", &["a", "b", "c"])
        .await;
    let hook = RecordingHook::new();
    let server = test_server(TestEnv::new().openai(&openai.uri()).config(), hook.clone());

    let response = server
        .post("/openai/chat/completions")
        .json(&chat_body("gpt-4o-mini", true))
        .await;
    response.assert_status_ok();
    let text = response.text();

    let records = hook.wait_for_records(1).await;
    assert_eq!(records.len(), 1);

    let record = &records[0];
    assert!(record.stream);
    assert_eq!(record.status, 200);
    assert_eq!(record.outcome, Outcome::Success);
    assert_eq!(record.response_bytes, text.len());
    assert!(record.chunks.unwrap() >= 1);
    match &record.response_body {
        AuditBody::Chunks(chunks) => assert_eq!(chunks.concat(), text),
        other => panic!("unexpected response body {:?}", other),
    }

    // Nothing fires twice
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(hook.records().len(), 1);
}

#[tokio::test]
async fn test_translated_stream_post_hook() {
    let bedrock = MockBedrock::start().await;
    bedrock.mock_converse_stream("anthropic.claude-v2", &["Hi"]).await;
    let hook = RecordingHook::new();
    let server = test_server(TestEnv::new().bedrock(&bedrock.uri()).config(), hook.clone());

    server
        .post("/openai-proxy/chat/completions")
        .json(&chat_body("bedrock/anthropic.claude-v2", true))
        .await
        .assert_status_ok();

    let records = hook.wait_for_records(1).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].provider, ProviderKind::OpenAIProxy);
    assert_eq!(records[0].outcome, Outcome::Success);
    assert!(records[0].stream);
}

#[tokio::test]
async fn test_rejecting_pre_hook_aborts_request() {
    let openai = MockOpenAI::start().await;
    openai.mock_chat_completion("gpt-4o-mini", "Hi").await;
    let hook = RecordingHook::rejecting();
    let server = test_server(TestEnv::new().openai(&openai.uri()).config(), hook.clone());

    let response = server
        .post("/openai/chat/completions")
        .json(&chat_body("gpt-4o-mini", false))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "HOOK_REJECTED");
    assert!(openai.received().await.is_empty());

    let records = hook.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, 403);
    assert_eq!(records[0].outcome, Outcome::Failed);
    assert!(records[0].error.is_some());
}

#[tokio::test]
async fn test_failed_dispatch_still_audited() {
    let hook = RecordingHook::new();
    let server = test_server(TestEnv::new().config(), hook.clone());

    server
        .post("/bedrock/model/m/converse")
        .json(&json!({"messages": []}))
        .await
        .assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let records = hook.records();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].provider, ProviderKind::Bedrock);
    assert_eq!(records[0].status, 503);
    assert!(records[0]
        .error
        .as_deref()
        .unwrap()
        .contains("AWS_ACCESS_KEY_ID"));
}

#[tokio::test]
async fn test_upstream_status_audited_as_error() {
    let openai = MockOpenAI::start().await;
    openai.mock_error("chat/completions", 400, "Bad model").await;
    let hook = RecordingHook::new();
    let server = test_server(TestEnv::new().openai(&openai.uri()).config(), hook.clone());

    server
        .post("/openai/chat/completions")
        .json(&chat_body("nope", false))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    let records = hook.records();
    assert_eq!(records[0].status, 400);
    assert_eq!(records[0].outcome, Outcome::UpstreamStatus);
}

#[tokio::test]
async fn test_audit_file_written_from_config() {
    let openai = MockOpenAI::start().await;
    openai.mock_chat_completion("gpt-4o-mini", "Hi").await;
    let dir = tempfile::tempdir().unwrap();
    let config = TestEnv::new()
        .openai(&openai.uri())
        .set("AUDIT_LOG_DIR", dir.path().to_string_lossy())
        .config();

    let state = AppState::new(config).unwrap();
    let server = TestServer::new(routes::create_router(Arc::new(state))).unwrap();

    server
        .post("/openai/chat/completions")
        .json(&chat_body("gpt-4o-mini", false))
        .await
        .assert_status_ok();

    let file = dir
        .path()
        .join(format!("audit_{}.log", chrono::Utc::now().format("%Y%m%d")));
    let lines: Vec<Value> = std::fs::read_to_string(file)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();

    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["type"], "request");
    assert_eq!(lines[1]["type"], "response");
    assert_eq!(lines[0]["request_id"], lines[1]["request_id"]);
    assert_eq!(lines[1]["response_body"]["data"]["choices"][0]["message"]["content"], "Hi");
}
