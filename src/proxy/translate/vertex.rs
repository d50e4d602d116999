//! Gemini (Vertex AI) translator

use serde_json::{json, Map, Value};

use super::types::{
    ChatCompletionChoice, ChatCompletionRequest, ChatCompletionResponse, Delta, ResponseMessage,
    Role, StreamEvent, StreamMetadata, Usage,
};
use super::{usage_from_counts, ChatTranslator, TranslationError};

/// Vertex AI `generateContent` translator
#[derive(Debug, Clone, Default)]
pub struct GeminiTranslator;

impl GeminiTranslator {
    pub fn new() -> Self {
        Self
    }

    /// Translate one streamed `GenerateContentResponse` into an OpenAI chunk
    pub fn translate_stream_event(&self, event: &Value, meta: &StreamMetadata) -> StreamEvent {
        let text = candidate_text(event);
        let finish_reason = event
            .pointer("/candidates/0/finishReason")
            .and_then(Value::as_str)
            .filter(|r| *r != "FINISH_REASON_UNSPECIFIED")
            .map(|r| self.translate_stop_reason(r));

        let chunk = if text.is_empty() && finish_reason.is_none() {
            None
        } else {
            let delta = Delta {
                role: None,
                content: (!text.is_empty()).then_some(text),
            };
            Some(meta.chunk(delta, finish_reason))
        };

        StreamEvent {
            chunk,
            usage: usage_from(event),
        }
    }
}

fn candidate_text(response: &Value) -> String {
    response
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default()
}

fn usage_from(response: &Value) -> Option<Usage> {
    let meta = response.get("usageMetadata")?;
    let count = |field: &str| meta.get(field).and_then(Value::as_u64);

    Some(usage_from_counts(
        count("promptTokenCount"),
        count("candidatesTokenCount"),
        count("totalTokenCount"),
    ))
}

fn gemini_role(role: Role) -> Option<&'static str> {
    match role {
        Role::System | Role::Developer => None,
        Role::Assistant => Some("model"),
        Role::User | Role::Tool | Role::Function => Some("user"),
    }
}

impl ChatTranslator for GeminiTranslator {
    fn translate_request(
        &self,
        request: &ChatCompletionRequest,
    ) -> Result<Value, TranslationError> {
        let mut system_parts = Vec::new();
        let mut contents: Vec<(&'static str, Vec<Value>)> = Vec::new();

        for message in &request.messages {
            let text = message.text();
            if text.is_empty() {
                continue;
            }

            match gemini_role(message.role) {
                None => system_parts.push(json!({ "text": text })),
                Some(role) => match contents.last_mut() {
                    Some((last_role, parts)) if *last_role == role => {
                        parts.push(json!({ "text": text }))
                    }
                    _ => contents.push((role, vec![json!({ "text": text })])),
                },
            }
        }

        if contents.is_empty() {
            return Err(TranslationError::NoConversationMessages);
        }

        let mut generation = Map::new();
        if let Some(max_tokens) = request.token_limit() {
            generation.insert("maxOutputTokens".into(), json!(max_tokens));
        }
        if let Some(temperature) = request.temperature {
            generation.insert("temperature".into(), json!(temperature));
        }
        if let Some(top_p) = request.top_p {
            generation.insert("topP".into(), json!(top_p));
        }
        let stop = request.stop_sequences();
        if !stop.is_empty() {
            generation.insert("stopSequences".into(), json!(stop));
        }

        let mut body = Map::new();
        body.insert(
            "contents".into(),
            Value::Array(
                contents
                    .into_iter()
                    .map(|(role, parts)| json!({ "role": role, "parts": parts }))
                    .collect(),
            ),
        );
        if !system_parts.is_empty() {
            body.insert("systemInstruction".into(), json!({ "parts": system_parts }));
        }
        if !generation.is_empty() {
            body.insert("generationConfig".into(), Value::Object(generation));
        }

        Ok(Value::Object(body))
    }

    fn translate_response(
        &self,
        response: Value,
        model: &str,
    ) -> Result<ChatCompletionResponse, TranslationError> {
        if response.pointer("/candidates/0").is_none() {
            return Err(TranslationError::MissingRequiredField("candidates".into()));
        }

        let finish_reason = response
            .pointer("/candidates/0/finishReason")
            .and_then(Value::as_str)
            .map(|r| self.translate_stop_reason(r));

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
                    content: Some(candidate_text(&response)),
                },
                finish_reason,
            }],
            usage: usage_from(&response),
        })
    }

    fn translate_stop_reason(&self, reason: &str) -> String {
        match reason {
            "STOP" => "stop".to_string(),
            "MAX_TOKENS" => "length".to_string(),
            "SAFETY" | "RECITATION" | "BLOCKLIST" | "PROHIBITED_CONTENT" | "SPII" => {
                "content_filter".to_string()
            }
            other => other.to_ascii_lowercase(),
        }
    }
}
