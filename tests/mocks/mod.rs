//! Mock provider APIs
//!
//! One wiremock server per upstream provider:
//! - OpenAI (`/v1/...`, Bearer key)
//! - Azure OpenAI (deployments, `api-key` header, `api-version` query)
//! - Bedrock (Converse, SigV4 headers)
//! - Vertex AI (Gemini `generateContent` / `streamGenerateContent`)
//! - a slow SSE upstream for disconnect tests

pub mod openai;

pub use azure::*;
pub use bedrock::*;
pub use openai::*;
pub use slow::*;
pub use vertex::*;

use serde_json::Value;

/// Format events as an SSE body, optionally terminated by `[DONE]`
pub fn sse_body(events: &[Value], done: bool) -> String {
    let mut body = String::new();
    for event in events {
        body.push_str(&format!("data: {}\n\n", event));
    }
    if done {
        body.push_str("data: [DONE]\n\n");
    }
    body
}
