//! Per-request log correlation
//!
//! Every log line emitted while relaying one request carries the same short
//! `trace_id`, taken from the envelope id, so a request can be followed from
//! the inbound handler to the upstream call and back.

use std::time::Instant;

use tracing::{debug, error, info, warn, Span};

use crate::envelope::RequestEnvelope;

/// Length of the id prefix used as `trace_id`
const TRACE_ID_LEN: usize = 8;

/// Log context carried alongside an envelope while it is relayed
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub trace_id: String,
    /// Set when the envelope entered the relay
    pub start_time: Instant,
    pub provider: String,
    pub endpoint: String,
    pub model: Option<String>,
    pub streaming: bool,
}

impl RequestContext {
    pub fn for_envelope(envelope: &RequestEnvelope) -> Self {
        Self {
            trace_id: envelope.id.chars().take(TRACE_ID_LEN).collect(),
            start_time: Instant::now(),
            provider: envelope.provider.to_string(),
            endpoint: envelope.endpoint.clone(),
            model: envelope.model.clone(),
            streaming: envelope.stream,
        }
    }

    pub fn elapsed_ms(&self) -> u128 {
        self.start_time.elapsed().as_millis()
    }

    /// Span wrapping everything done for this request
    pub fn create_span(&self) -> Span {
        tracing::info_span!(
            "relay",
            trace_id = %self.trace_id,
            provider = %self.provider,
            endpoint = %self.endpoint,
        )
    }

    pub fn log_request_start(&self, method: &str) {
        info!(
            trace_id = %self.trace_id,
            %method,
            model = self.model.as_deref().unwrap_or("-"),
            stream = self.streaming,
            "Relaying request"
        );
    }

    /// The OpenAI-compatible engine picked `target` for `model`
    pub fn log_redirect(&self, target: &str, model: &str) {
        info!(trace_id = %self.trace_id, %target, %model, "Redirected by model prefix");
    }

    pub fn log_upstream_request(&self, url: &str, body_size: Option<usize>) {
        debug!(
            trace_id = %self.trace_id,
            %url,
            bytes = body_size.unwrap_or(0),
            after_ms = self.elapsed_ms() as u64,
            "Calling upstream"
        );
    }

    pub fn log_upstream_response(&self, status: u16, content_length: Option<u64>) {
        debug!(
            trace_id = %self.trace_id,
            status,
            content_length = ?content_length,
            after_ms = self.elapsed_ms() as u64,
            "Upstream answered"
        );
    }

    pub fn log_request_complete(&self, status: u16) {
        info!(
            trace_id = %self.trace_id,
            status,
            duration_ms = self.elapsed_ms() as u64,
            "Relay finished"
        );
    }

    pub fn log_stream_started(&self) {
        info!(
            trace_id = %self.trace_id,
            after_ms = self.elapsed_ms() as u64,
            "Relaying event stream"
        );
    }

    /// Logged from the stream guard once the client side is released
    pub fn log_stream_ended(&self, chunks: usize, outcome: &str) {
        info!(
            trace_id = %self.trace_id,
            chunks,
            %outcome,
            duration_ms = self.elapsed_ms() as u64,
            "Event stream released"
        );
    }

    pub fn log_warning(&self, message: &str) {
        warn!(trace_id = %self.trace_id, %message, "Relay warning");
    }

    pub fn log_error(&self, error: &str) {
        error!(
            trace_id = %self.trace_id,
            %error,
            model = self.model.as_deref().unwrap_or("-"),
            stream = self.streaming,
            duration_ms = self.elapsed_ms() as u64,
            "Relay failed"
        );
    }

    /// No HTTP response was obtained from `url`
    pub fn log_connection_error(&self, error: &str, url: &str) {
        error!(trace_id = %self.trace_id, %url, %error, "Upstream unreachable");
    }
}
