//! OpenAI-compatible engine for every provider
//!
//! Clients speak the OpenAI chat format against `/openai-proxy` and pick the
//! backend with a model prefix:
//!
//! | model                          | backend                          |
//! |--------------------------------|----------------------------------|
//! | `bedrock/anthropic.claude-v2`  | Bedrock Converse API             |
//! | `vertex/gemini-1.5-pro`        | Vertex AI `generateContent`      |
//! | `azure/my-deployment`          | Azure OpenAI deployment          |
//! | `openai/gpt-4o`, `gpt-4o`      | OpenAI                           |
//!
//! The prefix is stripped before the request leaves the relay. Replies from
//! Bedrock and Vertex are translated back into `chat.completion` objects, or
//! `chat.completion.chunk` events when streaming. Streams are translated
//! event by event as the upstream produces them.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::StatusCode;
use futures::StreamExt;
use serde_json::Value;
use tracing::{instrument, warn};

use crate::{
    envelope::{ByteStream, RequestEnvelope, ResponseEnvelope},
    error::{AppError, AppResult},
    proxy::{
        engine::Engine,
        logging::RequestContext,
        translate::{
            types::{ChatCompletionRequest, Delta, Role, StreamMetadata},
            BedrockConverseTranslator, ChatTranslator, GeminiTranslator, TranslationError,
        },
        AzureEngine, BedrockEngine, OpenAIEngine, VertexEngine,
    },
    router::ProviderKind,
    streaming::{
        format_error_event, format_sse_data, format_sse_done, sse_data, EventStreamDecoder,
        SseLineBuffer,
    },
};

const CHAT_COMPLETIONS: &str = "chat/completions";

/// Backend selected by a model prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    OpenAI,
    Azure,
    Bedrock,
    Vertex,
}

impl Target {
    /// Split `prefix/model` into the backend and the provider-side model id
    pub fn parse(model: &str) -> (Target, &str) {
        let prefixes = [
            ("bedrock/", Target::Bedrock),
            ("vertex/", Target::Vertex),
            ("azure/", Target::Azure),
            ("openai/", Target::OpenAI),
        ];

        for (prefix, target) in prefixes {
            if let Some(rest) = model.strip_prefix(prefix) {
                if !rest.is_empty() {
                    return (target, rest);
                }
            }
        }

        (Target::OpenAI, model)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Target::OpenAI => "openai",
            Target::Azure => "azure",
            Target::Bedrock => "bedrock",
            Target::Vertex => "vertex",
        }
    }
}

/// OpenAI-compatible façade over the other engines
pub struct OpenAIProxyEngine {
    openai: Arc<OpenAIEngine>,
    azure: Arc<AzureEngine>,
    bedrock: Arc<BedrockEngine>,
    vertex: Arc<VertexEngine>,
}

impl OpenAIProxyEngine {
    pub fn new(
        openai: Arc<OpenAIEngine>,
        azure: Arc<AzureEngine>,
        bedrock: Arc<BedrockEngine>,
        vertex: Arc<VertexEngine>,
    ) -> Self {
        Self {
            openai,
            azure,
            bedrock,
            vertex,
        }
    }

    async fn to_bedrock(
        &self,
        envelope: &RequestEnvelope,
        request: ChatCompletionRequest,
        model_id: &str,
        ctx: &RequestContext,
    ) -> AppResult<ResponseEnvelope> {
        let translator = BedrockConverseTranslator::new();
        let body = translator.translate_request(&request).map_err(rejected)?;

        if envelope.stream {
            let upstream = self.bedrock.converse_stream(model_id, &body, ctx).await?;
            let meta = StreamMetadata::new(request.model.clone());
            return Ok(ResponseEnvelope::event_stream(converse_stream(
                upstream,
                translator,
                meta,
                request.include_usage(),
            )));
        }

        let reply = self.bedrock.converse(model_id, &body, ctx).await?;
        let completion = translator.translate_response(reply, &request.model)?;
        ResponseEnvelope::json(StatusCode::OK, &serde_json::to_value(completion)?)
    }

    async fn to_vertex(
        &self,
        envelope: &RequestEnvelope,
        request: ChatCompletionRequest,
        model_id: &str,
        ctx: &RequestContext,
    ) -> AppResult<ResponseEnvelope> {
        let translator = GeminiTranslator::new();
        let body = translator.translate_request(&request).map_err(rejected)?;

        if envelope.stream {
            let upstream = self.vertex.stream_generate_content(model_id, &body, ctx).await?;
            let meta = StreamMetadata::new(request.model.clone());
            return Ok(ResponseEnvelope::event_stream(gemini_stream(
                upstream,
                translator,
                meta,
                request.include_usage(),
            )));
        }

        let reply = self.vertex.generate_content(model_id, &body, ctx).await?;
        let completion = translator.translate_response(reply, &request.model)?;
        ResponseEnvelope::json(StatusCode::OK, &serde_json::to_value(completion)?)
    }
}

/// Parse the client body as a chat completion request
fn chat_request(json: &Value) -> AppResult<ChatCompletionRequest> {
    serde_json::from_value(json.clone())
        .map_err(|e| AppError::BadRequest(format!("Invalid chat completion request: {}", e)))
}

fn require_chat_endpoint(target: Target, endpoint: &str) -> AppResult<()> {
    if endpoint == CHAT_COMPLETIONS {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Endpoint '{}' is not supported for {} models; only {} is",
            endpoint,
            target.as_str(),
            CHAT_COMPLETIONS
        )))
    }
}

/// Body with the `model` field replaced by the provider-side id
fn with_model(json: &Value, model_id: &str) -> Value {
    let mut json = json.clone();
    if let Some(obj) = json.as_object_mut() {
        obj.insert("model".to_string(), Value::String(model_id.to_string()));
    }
    json
}

/// A chat request the target provider cannot accept is the client's fault
fn rejected(error: TranslationError) -> AppError {
    AppError::BadRequest(error.to_string())
}

/// Translate a Bedrock `converse-stream` event stream into OpenAI chunk events
fn converse_stream(
    upstream: ByteStream,
    translator: BedrockConverseTranslator,
    meta: StreamMetadata,
    include_usage: bool,
) -> ByteStream {
    Box::pin(async_stream::stream! {
        let mut upstream = upstream;
        let mut decoder = EventStreamDecoder::new("bedrock");
        let mut usage = None;

        yield format_sse_data(&meta.chunk(
            Delta { role: Some(Role::Assistant), content: None },
            None,
        ));

        while let Some(item) = upstream.next().await {
            let frames = match item.and_then(|bytes| decoder.feed(&bytes)) {
                Ok(frames) => frames,
                Err(e) => {
                    warn!(error = %e, "Bedrock stream failed");
                    yield Ok(format_error_event(&e.to_string(), Some("UPSTREAM_ERROR")));
                    yield Err(e);
                    return;
                }
            };

            for frame in frames {
                if let Some(message) = frame.error_message() {
                    let e = AppError::upstream("bedrock", message);
                    warn!(error = %e, "Bedrock stream raised an exception");
                    yield Ok(format_error_event(&e.to_string(), Some("UPSTREAM_ERROR")));
                    yield Err(e);
                    return;
                }
                let Some(event_type) = frame.event_type() else { continue };
                let payload: Value = match serde_json::from_slice(&frame.payload) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(error = %e, event_type, "Skipping unparseable Bedrock event");
                        continue;
                    }
                };

                let translated = translator.translate_stream_event(event_type, &payload, &meta);
                if translated.usage.is_some() {
                    usage = translated.usage;
                }
                if let Some(chunk) = translated.chunk {
                    yield format_sse_data(&chunk);
                }
            }
        }

        if !decoder.is_empty() {
            warn!("Bedrock stream ended inside a frame");
        }
        if include_usage {
            if let Some(usage) = usage {
                yield format_sse_data(&meta.usage_chunk(usage));
            }
        }
        yield Ok(format_sse_done());
    })
}

/// Translate a Gemini SSE stream into OpenAI chunk events
fn gemini_stream(
    upstream: ByteStream,
    translator: GeminiTranslator,
    meta: StreamMetadata,
    include_usage: bool,
) -> ByteStream {
    Box::pin(async_stream::stream! {
        let mut upstream = upstream;
        let mut buffer = SseLineBuffer::new();
        let mut usage = None;

        yield format_sse_data(&meta.chunk(
            Delta { role: Some(Role::Assistant), content: None },
            None,
        ));

        let mut upstream_done = false;
        while !upstream_done {
            let lines = match upstream.next().await {
                Some(Ok(bytes)) => buffer.feed(&bytes),
                Some(Err(e)) => {
                    warn!(error = %e, "Vertex stream failed");
                    yield Ok(format_error_event(&e.to_string(), Some("UPSTREAM_ERROR")));
                    yield Err(e);
                    return;
                }
                None => {
                    upstream_done = true;
                    buffer.finish().into_iter().collect()
                }
            };

            for line in lines {
                let Some(data) = sse_data(&line) else { continue };
                let event: Value = match serde_json::from_str(data) {
                    Ok(event) => event,
                    Err(e) => {
                        warn!(error = %e, "Skipping unparseable Vertex event");
                        continue;
                    }
                };

                let translated = translator.translate_stream_event(&event, &meta);
                if translated.usage.is_some() {
                    usage = translated.usage;
                }
                if let Some(chunk) = translated.chunk {
                    yield format_sse_data(&chunk);
                }
            }
        }

        if include_usage {
            if let Some(usage) = usage {
                yield format_sse_data(&meta.usage_chunk(usage));
            }
        }
        yield Ok(format_sse_done());
    })
}

#[async_trait]
impl Engine for OpenAIProxyEngine {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAIProxy
    }

    fn is_configured(&self) -> bool {
        self.openai.is_configured()
            || self.azure.is_configured()
            || self.bedrock.is_configured()
            || self.vertex.is_configured()
    }

    #[instrument(skip_all, fields(endpoint = %envelope.endpoint))]
    async fn dispatch(
        &self,
        envelope: &RequestEnvelope,
        ctx: &RequestContext,
    ) -> AppResult<ResponseEnvelope> {
        let json = envelope
            .json
            .as_ref()
            .ok_or_else(|| AppError::BadRequest("Request body must be a JSON object".to_string()))?;
        let model = envelope
            .model
            .as_deref()
            .ok_or_else(|| AppError::BadRequest("model parameter is required".to_string()))?;

        let (target, model_id) = Target::parse(model);
        ctx.log_redirect(target.as_str(), model_id);

        match target {
            Target::OpenAI => {
                let redirected = envelope.redirected(
                    ProviderKind::OpenAI,
                    envelope.endpoint.clone(),
                    with_model(json, model_id),
                )?;
                self.openai.dispatch(&redirected, ctx).await
            }
            Target::Azure => {
                let redirected = envelope.redirected(
                    ProviderKind::Azure,
                    format!("openai/deployments/{}/{}", model_id, envelope.endpoint),
                    with_model(json, model_id),
                )?;
                self.azure.dispatch(&redirected, ctx).await
            }
            Target::Bedrock => {
                require_chat_endpoint(target, &envelope.endpoint)?;
                self.to_bedrock(envelope, chat_request(json)?, model_id, ctx)
                    .await
            }
            Target::Vertex => {
                require_chat_endpoint(target, &envelope.endpoint)?;
                self.to_vertex(envelope, chat_request(json)?, model_id, ctx)
                    .await
            }
        }
    }
}
