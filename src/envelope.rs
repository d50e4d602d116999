//! Provider-agnostic request and response envelopes
//!
//! A `RequestEnvelope` is built once per inbound call and shared read-only
//! with hooks and engines. A `ResponseEnvelope` carries the upstream reply,
//! either fully buffered or as a byte stream still being received.

use std::pin::Pin;

use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use bytes::Bytes;
use futures::Stream;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::{
    error::{AppError, AppResult},
    proxy::headers::forwardable_request_headers,
    router::{ProviderKind, RouteMatch},
};

/// Stream type for streaming responses from upstream providers
pub type ByteStream = Pin<Box<dyn Stream<Item = AppResult<Bytes>> + Send>>;

/// Inbound call in provider-agnostic form
#[derive(Debug, Clone)]
pub struct RequestEnvelope {
    /// Unique identifier for log and audit correlation
    pub id: String,
    pub provider: ProviderKind,
    /// Path after the provider prefix, e.g. `chat/completions`
    pub endpoint: String,
    pub method: Method,
    pub query: Option<String>,
    /// Client headers that may be forwarded upstream
    pub headers: HeaderMap,
    /// Raw request body exactly as received
    pub body: Bytes,
    /// Parsed body when it is JSON
    pub json: Option<Value>,
    pub model: Option<String>,
    pub stream: bool,
}

impl RequestEnvelope {
    /// Build the envelope for a resolved route
    ///
    /// A body declared as JSON must parse; other bodies are kept opaque.
    pub fn new(
        route: &RouteMatch,
        method: Method,
        query: Option<String>,
        headers: &HeaderMap,
        body: Bytes,
    ) -> AppResult<Self> {
        let json = parse_json_body(headers, &body)?;

        let model = json
            .as_ref()
            .and_then(|v| v.get("model"))
            .and_then(Value::as_str)
            .map(str::to_string);

        let stream_flag = json
            .as_ref()
            .and_then(|v| v.get("stream"))
            .and_then(Value::as_bool)
            .unwrap_or(false);

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            provider: route.kind,
            endpoint: route.endpoint.clone(),
            method,
            query,
            headers: forwardable_request_headers(headers),
            body,
            json,
            model,
            stream: stream_flag || accepts_event_stream(headers),
        })
    }

    /// Derived envelope for an internal redirect
    ///
    /// Keeps the id, method and headers; replaces the endpoint and JSON body.
    pub fn redirected(&self, provider: ProviderKind, endpoint: String, json: Value) -> AppResult<Self> {
        Ok(Self {
            id: self.id.clone(),
            provider,
            endpoint,
            method: self.method.clone(),
            query: self.query.clone(),
            headers: self.headers.clone(),
            body: Bytes::from(serde_json::to_vec(&json)?),
            model: json.get("model").and_then(Value::as_str).map(str::to_string),
            json: Some(json),
            stream: self.stream,
        })
    }

    /// Number of chat messages in the body, if any
    pub fn message_count(&self) -> Option<usize> {
        self.json
            .as_ref()
            .and_then(|v| v.get("messages"))
            .and_then(Value::as_array)
            .map(Vec::len)
    }
}

fn parse_json_body(headers: &HeaderMap, body: &Bytes) -> AppResult<Option<Value>> {
    if body.is_empty() {
        return Ok(None);
    }

    let declared_json = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.to_ascii_lowercase().contains("json"))
        .unwrap_or(false);

    match serde_json::from_slice::<Value>(body) {
        Ok(value) => Ok(Some(value)),
        Err(e) if declared_json => Err(AppError::BadRequest(format!(
            "Invalid JSON request body: {}",
            e
        ))),
        Err(_) => Ok(None),
    }
}

fn accepts_event_stream(headers: &HeaderMap) -> bool {
    headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .map(|accept| accept.contains("text/event-stream"))
        .unwrap_or(false)
}

/// Upstream reply in provider-agnostic form
pub enum ResponseEnvelope {
    /// Fully buffered reply
    Complete {
        status: StatusCode,
        headers: HeaderMap,
        body: Bytes,
    },
    /// Reply whose body is still arriving
    Streaming {
        status: StatusCode,
        headers: HeaderMap,
        stream: ByteStream,
    },
}

impl ResponseEnvelope {
    /// Buffered JSON reply
    pub fn json(status: StatusCode, value: &Value) -> AppResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(ResponseEnvelope::Complete {
            status,
            headers,
            body: Bytes::from(serde_json::to_vec(value)?),
        })
    }

    /// Server-sent event stream reply
    pub fn event_stream(stream: ByteStream) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        ResponseEnvelope::Streaming {
            status: StatusCode::OK,
            headers,
            stream,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ResponseEnvelope::Complete { status, .. } => *status,
            ResponseEnvelope::Streaming { status, .. } => *status,
        }
    }

    pub fn is_streaming(&self) -> bool {
        matches!(self, ResponseEnvelope::Streaming { .. })
    }
}

impl std::fmt::Debug for ResponseEnvelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResponseEnvelope::Complete { status, body, .. } => f
                .debug_struct("Complete")
                .field("status", status)
                .field("body_len", &body.len())
                .finish(),
            ResponseEnvelope::Streaming { status, .. } => {
                f.debug_struct("Streaming").field("status", status).finish()
            }
        }
    }
}

/// How a proxied request ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Upstream answered 2xx and the reply was delivered
    Success,
    /// Upstream answered with a non-2xx status that was relayed to the client
    UpstreamStatus,
    /// The relay failed before a response existed
    Failed,
    /// The client went away before the upstream stream ended
    ClientClosed,
    /// The upstream stream broke mid-delivery
    StreamFailed,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::UpstreamStatus => "upstream_status",
            Outcome::Failed => "failed",
            Outcome::ClientClosed => "client_closed",
            Outcome::StreamFailed => "stream_failed",
        }
    }

    /// Whether this outcome counts towards error metrics
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Outcome::UpstreamStatus | Outcome::Failed | Outcome::StreamFailed
        )
    }
}

/// Status recorded for a client that left before any response existed
///
/// Nothing is sent with it; it only appears in audit records and metrics.
pub const CLIENT_CLOSED_STATUS: u16 = 499;
