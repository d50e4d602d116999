//! Mock OpenAI API

use serde_json::{json, Value};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

use super::sse_body;
use crate::common::constants::TEST_OPENAI_API_KEY;

pub struct MockOpenAI {
    server: MockServer,
}

impl MockOpenAI {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn uri(&self) -> String {
        self.server.uri()
    }

    pub async fn received(&self) -> Vec<Request> {
        self.server.received_requests().await.unwrap_or_default()
    }

    /// Successful `POST /v1/{endpoint}` answering `response`
    pub async fn mock_json(&self, endpoint: &str, response: Value) {
        Mock::given(method("POST"))
            .and(path(format!("/v1/{}", endpoint)))
            .and(header("authorization", format!("Bearer {}", TEST_OPENAI_API_KEY).as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(response))
            .mount(&self.server)
            .await;
    }

    /// `POST /v1/chat/completions` answering a chat completion
    pub async fn mock_chat_completion(&self, model: &str, content: &str) {
        self.mock_json("chat/completions", chat_completion(model, content))
            .await;
    }

    /// `POST /v1/chat/completions` streaming one content chunk per entry
    pub async fn mock_chat_completion_stream(&self, model: &str, pieces: &[&str]) {
        let events: Vec<Value> = pieces
            .iter()
            .map(|piece| {
                json!({
                    "id": "chatcmpl-mock",
                    "object": "chat.completion.chunk",
                    "created": 1700000000,
                    "model": model,
                    "choices": [{"index": 0, "delta": {"content": piece}, "finish_reason": null}]
                })
            })
            .collect();

        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse_body(&events, true), "text/event-stream"),
            )
            .mount(&self.server)
            .await;
    }

    /// Any method on `/v1/{endpoint}` answering `status` with an OpenAI error
    pub async fn mock_error(&self, endpoint: &str, status: u16, message: &str) {
        Mock::given(path(format!("/v1/{}", endpoint)))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({
                "error": {"message": message, "type": "invalid_request_error"}
            })))
            .mount(&self.server)
            .await;
    }

    /// `GET /v1/models`
    pub async fn mock_list_models(&self) {
        Mock::given(method("GET"))
            .and(path("/v1/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "object": "list",
                "data": [{"id": "gpt-4o-mini", "object": "model", "owned_by": "openai"}]
            })))
            .mount(&self.server)
            .await;
    }
}

pub fn chat_completion(model: &str, content: &str) -> Value {
    json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion",
        "created": 1700000000,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
    })
}
