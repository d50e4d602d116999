//! Translation between the OpenAI chat format and provider-native formats
//!
//! Used by the OpenAI-compatible engine when a model prefix targets a
//! provider that does not speak the OpenAI wire format natively.

pub mod bedrock;
pub mod types;
pub mod vertex;

use serde_json::Value;
use thiserror::Error;

use types::{ChatCompletionRequest, ChatCompletionResponse, Usage};

/// Errors that can occur during message translation
#[derive(Debug, Error)]
pub enum TranslationError {
    /// Message format is invalid for the target provider
    #[error("Invalid message format: {0}")]
    InvalidMessageFormat(String),

    /// A required field is missing from the provider response
    #[error("Missing required field: {0}")]
    MissingRequiredField(String),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Conversation has nothing the provider can answer
    #[error("Conversation must contain at least one user or assistant message")]
    NoConversationMessages,
}

/// Trait for translating between the OpenAI chat format and a provider format
pub trait ChatTranslator {
    /// Translate an OpenAI request to provider-specific JSON
    fn translate_request(&self, request: &ChatCompletionRequest)
        -> Result<Value, TranslationError>;

    /// Translate provider response JSON to an OpenAI completion
    ///
    /// `model` is echoed back in the response as the client named it.
    fn translate_response(
        &self,
        response: Value,
        model: &str,
    ) -> Result<ChatCompletionResponse, TranslationError>;

    /// Map provider stop reason to the OpenAI `finish_reason` vocabulary
    fn translate_stop_reason(&self, reason: &str) -> String;
}

/// Upstream token counts narrowed to the OpenAI `u32` fields
///
/// Counts beyond `u32::MAX` saturate; a missing total is the sum of the parts.
pub fn usage_from_counts(prompt: Option<u64>, completion: Option<u64>, total: Option<u64>) -> Usage {
    let narrow = |count: Option<u64>| u32::try_from(count.unwrap_or(0)).unwrap_or(u32::MAX);
    let prompt_tokens = narrow(prompt);
    let completion_tokens = narrow(completion);

    Usage {
        prompt_tokens,
        completion_tokens,
        total_tokens: match total {
            Some(total) => narrow(Some(total)),
            None => prompt_tokens.saturating_add(completion_tokens),
        },
    }
}

pub use bedrock::BedrockConverseTranslator;
pub use vertex::GeminiTranslator;
