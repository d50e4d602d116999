//! Audit records handed to post-response hooks

use std::time::Duration;

use axum::http::StatusCode;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::{
    envelope::{Outcome, RequestEnvelope, CLIENT_CLOSED_STATUS},
    error::AppError,
    router::ProviderKind,
    streaming::RelaySummary,
};

/// Captured request or response body
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum AuditBody {
    Empty,
    Json(Value),
    Text(String),
    /// Streamed response, one entry per chunk
    Chunks(Vec<String>),
    Binary { len: usize },
}

impl AuditBody {
    /// Capture at most `limit` bytes of a body
    ///
    /// Returns the captured body and whether it was cut short.
    pub fn capture(body: &Bytes, limit: usize) -> (Self, bool) {
        if body.is_empty() {
            return (AuditBody::Empty, false);
        }
        if body.len() > limit {
            let cut = String::from_utf8_lossy(&body[..limit]).into_owned();
            return (AuditBody::Text(cut), true);
        }

        if let Ok(json) = serde_json::from_slice::<Value>(body) {
            return (AuditBody::Json(json), false);
        }
        match std::str::from_utf8(body) {
            Ok(text) => (AuditBody::Text(text.to_string()), false),
            Err(_) => (AuditBody::Binary { len: body.len() }, false),
        }
    }

    pub fn chunks(chunks: &[Bytes]) -> Self {
        AuditBody::Chunks(
            chunks
                .iter()
                .map(|c| String::from_utf8_lossy(c).into_owned())
                .collect(),
        )
    }
}

/// Raw request paired with its raw response (or chunk sequence)
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub request_id: String,
    pub timestamp: DateTime<Utc>,
    pub provider: ProviderKind,
    pub endpoint: String,
    pub method: String,
    pub model: Option<String>,
    pub stream: bool,
    pub request_body: AuditBody,
    pub request_truncated: bool,
    pub status: u16,
    pub outcome: Outcome,
    pub response_body: AuditBody,
    pub response_truncated: bool,
    pub chunks: Option<usize>,
    pub response_bytes: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AuditRecord {
    /// Record for a request whose response is not known yet
    pub fn for_request(envelope: &RequestEnvelope, capture_limit: usize) -> Self {
        let (request_body, request_truncated) = AuditBody::capture(&envelope.body, capture_limit);

        Self {
            request_id: envelope.id.clone(),
            timestamp: Utc::now(),
            provider: envelope.provider,
            endpoint: envelope.endpoint.clone(),
            method: envelope.method.to_string(),
            model: envelope.model.clone(),
            stream: envelope.stream,
            request_body,
            request_truncated,
            status: 0,
            outcome: Outcome::Failed,
            response_body: AuditBody::Empty,
            response_truncated: false,
            chunks: None,
            response_bytes: 0,
            duration_ms: 0,
            error: None,
        }
    }

    /// Buffered response
    pub fn completed(
        mut self,
        status: StatusCode,
        outcome: Outcome,
        body: &Bytes,
        capture_limit: usize,
    ) -> Self {
        let (response_body, truncated) = AuditBody::capture(body, capture_limit);
        self.status = status.as_u16();
        self.outcome = outcome;
        self.response_body = response_body;
        self.response_truncated = truncated;
        self.response_bytes = body.len();
        self
    }

    /// Streamed response, once the body was released
    pub fn streamed(mut self, status: StatusCode, summary: RelaySummary) -> Self {
        self.status = status.as_u16();
        self.outcome = summary.outcome;
        self.response_body = AuditBody::chunks(&summary.captured);
        self.response_truncated = summary.truncated;
        self.chunks = Some(summary.chunks);
        self.response_bytes = summary.bytes;
        self.error = summary.error;
        self
    }

    /// No response was produced
    pub fn failed(mut self, error: &AppError) -> Self {
        self.status = error.status_code().as_u16();
        self.outcome = Outcome::Failed;
        self.error = Some(error.to_string());
        self
    }

    /// The client disconnected before the relay had a response to send
    pub fn client_closed(mut self) -> Self {
        self.status = CLIENT_CLOSED_STATUS;
        self.outcome = Outcome::ClientClosed;
        self.error = Some("client disconnected before the response was ready".to_string());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration_ms = duration.as_millis() as u64;
        self
    }
}
