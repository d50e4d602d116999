//! Prefix routing integration tests
//!
//! Each provider prefix reaches its own upstream with the relay's
//! credentials; unknown prefixes and missing credentials fail locally.

use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

use crate::common::{constants, test_server, RecordingHook, TestEnv};
use crate::mocks::{MockAzure, MockBedrock, MockOpenAI, MockVertex};

fn chat_body(model: &str) -> Value {
    json!({
        "model": model,
        "messages": [{"role": "user", "content": "Say hi"}]
    })
}

#[tokio::test]
async fn test_openai_prefix_forwards_verbatim() {
    let openai = MockOpenAI::start().await;
    openai.mock_chat_completion("gpt-4o-mini", "Hi there").await;
    let server = test_server(TestEnv::new().openai(&openai.uri()).config(), RecordingHook::new());

    let response = server
        .post("/openai/chat/completions")
        .json(&chat_body("gpt-4o-mini"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["choices"][0]["message"]["content"], "Hi there");
    assert!(response.headers().get("x-relay-request-id").is_some());

    let received = openai.received().await;
    assert_eq!(received.len(), 1);
    let sent: Value = serde_json::from_slice(&received[0].body).unwrap();
    assert_eq!(sent, chat_body("gpt-4o-mini"));
}

#[tokio::test]
async fn test_client_credentials_replaced() {
    let openai = MockOpenAI::start().await;
    openai.mock_chat_completion("gpt-4o-mini", "ok").await;
    let server = test_server(TestEnv::new().openai(&openai.uri()).config(), RecordingHook::new());

    server
        .post("/openai/chat/completions")
        .add_header(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer client-secret"),
        )
        .add_header(
            HeaderName::from_static("x-custom"),
            HeaderValue::from_static("dropped"),
        )
        .json(&chat_body("gpt-4o-mini"))
        .await
        .assert_status_ok();

    let received = openai.received().await;
    let auth = received[0].headers.get(header::AUTHORIZATION).unwrap();
    assert_eq!(
        auth.to_str().unwrap(),
        format!("Bearer {}", constants::TEST_OPENAI_API_KEY)
    );
    assert!(received[0].headers.get("x-custom").is_none());
}

#[tokio::test]
async fn test_get_with_query_forwarded() {
    let openai = MockOpenAI::start().await;
    openai.mock_list_models().await;
    let server = test_server(TestEnv::new().openai(&openai.uri()).config(), RecordingHook::new());

    let response = server.get("/openai/models").add_query_param("limit", "5").await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["data"][0]["id"], "gpt-4o-mini");

    let received = openai.received().await;
    assert_eq!(received[0].url.query(), Some("limit=5"));
    assert!(received[0].body.is_empty());
}

#[tokio::test]
async fn test_upstream_error_status_passed_through() {
    let openai = MockOpenAI::start().await;
    openai
        .mock_error("chat/completions", 429, "Rate limit reached")
        .await;
    let server = test_server(TestEnv::new().openai(&openai.uri()).config(), RecordingHook::new());

    let response = server
        .post("/openai/chat/completions")
        .json(&chat_body("gpt-4o-mini"))
        .await;

    response.assert_status(StatusCode::TOO_MANY_REQUESTS);
    let body: Value = response.json();
    assert_eq!(body["error"]["message"], "Rate limit reached");
}

#[tokio::test]
async fn test_openai_stream_relayed_unchanged() {
    let openai = MockOpenAI::start().await;
    openai
        .mock_chat_completion_stream("gpt-4o-mini", &["Hel", "lo"])
        .await;
    let server = test_server(TestEnv::new().openai(&openai.uri()).config(), RecordingHook::new());

    let mut body = chat_body("gpt-4o-mini");
    body["stream"] = json!(true);
    let response = server.post("/openai/chat/completions").json(&body).await;

    response.assert_status_ok();
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream"
    );
    let text = response.text();
    let data: Vec<&str> = text
        .lines()
        .filter_map(|l| l.strip_prefix("data: "))
        .collect();
    assert_eq!(data.len(), 3);
    assert!(data[0].contains("\"Hel\""));
    assert!(data[1].contains("\"lo\""));
    assert_eq!(data[2], "[DONE]");
}

#[tokio::test]
async fn test_azure_prefix_adds_key_and_version() {
    let azure = MockAzure::start().await;
    azure.mock_chat_completion("prod-gpt4", "From Azure").await;
    let server = test_server(TestEnv::new().azure(&azure.uri()).config(), RecordingHook::new());

    let response = server
        .post("/azure/openai/deployments/prod-gpt4/chat/completions")
        .json(&chat_body("gpt-4"))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["choices"][0]["message"]["content"], "From Azure");
    assert!(azure.received().await[0].headers.get(header::AUTHORIZATION).is_none());
}

#[tokio::test]
async fn test_bedrock_prefix_signs_request() {
    let bedrock = MockBedrock::start().await;
    bedrock.mock_converse("anthropic.claude-v2", "From Bedrock").await;
    let server = test_server(TestEnv::new().bedrock(&bedrock.uri()).config(), RecordingHook::new());

    let response = server
        .post("/bedrock/model/anthropic.claude-v2/converse")
        .json(&json!({"messages": [{"role": "user", "content": [{"text": "Hi"}]}]}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["output"]["message"]["content"][0]["text"], "From Bedrock");

    let received = bedrock.received().await;
    let auth = received[0]
        .headers
        .get(header::AUTHORIZATION)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(auth.starts_with(&format!(
        "AWS4-HMAC-SHA256 Credential={}/",
        constants::TEST_AWS_ACCESS_KEY_ID
    )));
    assert!(auth.contains("/us-east-1/bedrock/aws4_request"));
}

#[tokio::test]
async fn test_vertex_prefix_uses_bearer_token() {
    let vertex = MockVertex::start().await;
    vertex
        .mock_generate_content("gemini-1.5-pro", "From Gemini")
        .await;
    let server = test_server(TestEnv::new().vertex(&vertex.uri()).config(), RecordingHook::new());

    let response = server
        .post("/vertex/publishers/google/models/gemini-1.5-pro:generateContent")
        .json(&json!({"contents": [{"role": "user", "parts": [{"text": "Hi"}]}]}))
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["candidates"][0]["content"]["parts"][0]["text"], "From Gemini");
}

#[tokio::test]
async fn test_unknown_prefix_is_404() {
    let hook = RecordingHook::new();
    let server = test_server(TestEnv::new().config(), hook.clone());

    for path in ["/anthropic/v1/messages", "/openaix/chat/completions", "/v1/chat/completions"] {
        let response = server.post(path).json(&chat_body("m")).await;
        response.assert_status(StatusCode::NOT_FOUND);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "NO_MATCHING_ROUTE");
    }

    assert!(hook.pre_requests().is_empty());
    assert!(hook.records().is_empty());
}

#[tokio::test]
async fn test_missing_credentials_fail_without_upstream_call() {
    let openai = MockOpenAI::start().await;
    let config = TestEnv::new()
        .set("OPENAI_API_URL", format!("{}/v1", openai.uri()))
        .config();
    let server = test_server(config, RecordingHook::new());

    let cases = [
        ("/openai/chat/completions", "OPENAI_API_KEY"),
        ("/azure/openai/deployments/d/chat/completions", "AZURE_OPENAI_ENDPOINT"),
        ("/bedrock/model/m/converse", "AWS_ACCESS_KEY_ID"),
        ("/vertex/publishers/google/models/g:generateContent", "VERTEX_ACCESS_TOKEN"),
    ];

    for (path, variable) in cases {
        let response = server.post(path).json(&chat_body("m")).await;
        response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = response.json();
        assert_eq!(body["error"]["code"], "CREDENTIAL_MISSING", "{}", path);
        assert_eq!(body["error"]["details"]["variable"], variable, "{}", path);
    }

    assert!(openai.received().await.is_empty());
}

#[tokio::test]
async fn test_malformed_json_rejected() {
    let openai = MockOpenAI::start().await;
    let server = test_server(TestEnv::new().openai(&openai.uri()).config(), RecordingHook::new());

    let response = server
        .post("/openai/chat/completions")
        .text("{not json")
        .content_type("application/json")
        .await;

    response.assert_status(StatusCode::BAD_REQUEST);
    assert!(openai.received().await.is_empty());
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    // Port 9 (discard) is not listening in the test environment
    let server = test_server(
        TestEnv::new().openai("http://127.0.0.1:9").config(),
        RecordingHook::new(),
    );

    let response = server
        .post("/openai/chat/completions")
        .json(&chat_body("gpt-4o-mini"))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "UPSTREAM_ERROR");
}
