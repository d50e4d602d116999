//! Bedrock Converse translator
//!
//! Maps OpenAI chat requests onto the Bedrock Converse API, which is shared
//! by every Bedrock text model family. `converse-stream` events arrive as
//! event-stream frames and are translated one at a time.

use serde_json::{json, Map, Value};

use super::types::{
    ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse, Delta, ResponseMessage,
    Role, StreamEvent, StreamMetadata, Usage,
};
use super::{usage_from_counts, ChatTranslator, TranslationError};

/// Bedrock Converse API translator
///
/// Converse wants system prompts in a separate `system` array and a
/// conversation that alternates user/assistant, starting with user.
/// Consecutive same-role messages are merged into one turn.
#[derive(Debug, Clone, Default)]
pub struct BedrockConverseTranslator;

impl BedrockConverseTranslator {
    pub fn new() -> Self {
        Self
    }

    /// Translate one `converse-stream` event
    ///
    /// Text deltas and the stop reason become chunks; `metadata` carries
    /// usage. Block boundaries and `messageStart` produce nothing, the
    /// assistant role chunk is sent by the caller up front.
    pub fn translate_stream_event(
        &self,
        event_type: &str,
        payload: &Value,
        meta: &StreamMetadata,
    ) -> StreamEvent {
        match event_type {
            "contentBlockDelta" => {
                let chunk = payload
                    .pointer("/delta/text")
                    .and_then(Value::as_str)
                    .filter(|text| !text.is_empty())
                    .map(|text| {
                        meta.chunk(
                            Delta {
                                role: None,
                                content: Some(text.to_string()),
                            },
                            None,
                        )
                    });
                StreamEvent { chunk, usage: None }
            }
            "messageStop" => {
                let reason = payload
                    .get("stopReason")
                    .and_then(Value::as_str)
                    .map(|r| self.translate_stop_reason(r))
                    .unwrap_or_else(|| "stop".to_string());
                StreamEvent {
                    chunk: Some(meta.chunk(Delta::default(), Some(reason))),
                    usage: None,
                }
            }
            "metadata" => StreamEvent {
                chunk: None,
                usage: payload.get("usage").map(usage_from),
            },
            _ => StreamEvent::default(),
        }
    }
}

fn usage_from(usage: &Value) -> Usage {
    let count = |field: &str| usage.get(field).and_then(Value::as_u64);
    usage_from_counts(count("inputTokens"), count("outputTokens"), count("totalTokens"))
}

fn converse_role(role: Role) -> Option<&'static str> {
    match role {
        Role::System | Role::Developer => None,
        Role::Assistant => Some("assistant"),
        Role::User | Role::Tool | Role::Function => Some("user"),
    }
}

impl ChatTranslator for BedrockConverseTranslator {
    fn translate_request(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<Value, TranslationError> {
        let mut system = Vec::new();
        let mut turns: Vec<(&'static str, Vec<Value>)> = Vec::new();

        for message in &request.messages {
            let text = message.text();
            if text.is_empty() {
                continue;
            }

            match converse_role(message.role) {
                None => system.push(json!({ "text": text })),
                Some(role) => match turns.last_mut() {
                    Some((last_role, blocks)) if *last_role == role => {
                        blocks.push(json!({ "text": text }))
                    }
                    _ => turns.push((role, vec![json!({ "text": text })])),
                },
            }
        }

        if turns.is_empty() {
            return Err(TranslationError::NoConversationMessages);
        }
        if turns[0].0 != "user" {
            return Err(TranslationError::InvalidMessageFormat(
                "Bedrock conversations must start with a user message".to_string(),
            ));
        }

        let messages: Vec<Value> = turns
            .into_iter()
            .map(|(role, content)| json!({ "role": role, "content": content }))
            .collect();

        let mut inference = Map::new();
        if let Some(max_tokens) = request.token_limit() {
            inference.insert("maxTokens".into(), json!(max_tokens));
        }
        if let Some(temperature) = request.temperature {
            inference.insert("temperature".into(), json!(temperature));
        }
        if let Some(top_p) = request.top_p {
            inference.insert("topP".into(), json!(top_p));
        }
        let stop = request.stop_sequences();
        if !stop.is_empty() {
            inference.insert("stopSequences".into(), json!(stop));
        }

        let mut body = Map::new();
        body.insert("messages".into(), Value::Array(messages));
        if !system.is_empty() {
            body.insert("system".into(), Value::Array(system));
        }
        if !inference.is_empty() {
            body.insert("inferenceConfig".into(), Value::Object(inference));
        }

        Ok(Value::Object(body))
    }

    fn translate_response(
        &self,
        response: Value,
        model: &str,
    ) -> Result<ChatCompletionResponse, TranslationError> {
        let content = response
            .pointer("/output/message/content")
            .and_then(Value::as_array)
            .ok_or_else(|| TranslationError::MissingRequiredField("output.message.content".into()))?;

        let text: String = content
            .iter()
            .filter_map(|block| block.get("text").and_then(Value::as_str))
            .collect();

        let finish_reason = response
            .get("stopReason")
            .and_then(Value::as_str)
            .map(|r| self.translate_stop_reason(r));

        let usage = response.get("usage").map(usage_from);

        let meta = StreamMetadata::new(model);
        Ok(ChatCompletionResponse {
            id: meta.id,
            object: "chat.completion".to_string(),
            created: meta.created,
            model: meta.model,
            choices: vec![ChatCompletionChoice {
                index: 0,
                message: ResponseMessage {
                    role: Role::Assistant,
                    content: Some(text),
                },
                finish_reason,
            }],
            usage,
        })
    }

    fn translate_stop_reason(&self, reason: &str) -> String {
        match reason {
            "end_turn" | "stop_sequence" => "stop",
            "max_tokens" => "length",
            "content_filtered" | "guardrail_intervened" => "content_filter",
            "tool_use" => "tool_calls",
            other => other,
        }
        .to_string()
    }
}
