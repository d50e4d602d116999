//! Request metrics
//!
//! Metrics are recorded through the `metrics` facade and exported in
//! Prometheus format on a separate listener. Without an installed recorder
//! every call below is a no-op, so recording can never fail a request.

use std::time::Instant;

use anyhow::{Context, Result};
use axum::http::StatusCode;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::info;

use crate::{
    config::Config,
    envelope::{Outcome, CLIENT_CLOSED_STATUS},
};

pub const REQUESTS_TOTAL: &str = "llm_relay_requests_total";
pub const ERRORS_TOTAL: &str = "llm_relay_errors_total";
pub const REQUEST_DURATION_SECONDS: &str = "llm_relay_request_duration_seconds";
pub const PROVIDER_REQUESTS_TOTAL: &str = "llm_relay_provider_requests_total";
pub const PROVIDER_ERRORS_TOTAL: &str = "llm_relay_provider_errors_total";
pub const STREAMING_REQUESTS_TOTAL: &str = "llm_relay_streaming_requests_total";
pub const ACTIVE_STREAMS: &str = "llm_relay_active_streams";

/// Installed Prometheus recorder
#[derive(Clone)]
pub struct Telemetry {
    handle: PrometheusHandle,
    port: u16,
}

impl Telemetry {
    /// Install the global recorder, or do nothing when telemetry is disabled
    pub fn init(config: &Config) -> Result<Option<Self>> {
        if !config.enable_telemetry {
            info!("Telemetry disabled, metrics endpoint not served");
            return Ok(None);
        }

        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("Failed to install Prometheus recorder")?;
        describe_metrics();

        Ok(Some(Self {
            handle,
            port: config.prometheus_port,
        }))
    }

    /// Wrap an existing handle, e.g. from a recorder built for tests
    pub fn from_handle(handle: PrometheusHandle, port: u16) -> Self {
        Self { handle, port }
    }

    pub fn handle(&self) -> PrometheusHandle {
        self.handle.clone()
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Current metrics in Prometheus text format
    pub fn render(&self) -> String {
        self.handle.render()
    }
}

/// Register descriptions for every relay metric
pub fn describe_metrics() {
    describe_counter!(REQUESTS_TOTAL, "Total number of proxied requests");
    describe_counter!(ERRORS_TOTAL, "Total number of failed requests");
    describe_histogram!(
        REQUEST_DURATION_SECONDS,
        "Request duration in seconds, until the response body was released"
    );
    describe_counter!(PROVIDER_REQUESTS_TOTAL, "Requests per provider");
    describe_counter!(PROVIDER_ERRORS_TOTAL, "Failed requests per provider");
    describe_counter!(STREAMING_REQUESTS_TOTAL, "Requests answered with a stream");
    describe_gauge!(ACTIVE_STREAMS, "Streams currently being relayed");
}

/// Metrics for one request, finished exactly once
#[derive(Debug)]
pub struct RequestMetrics {
    provider: &'static str,
    endpoint: &'static str,
    start: Instant,
    streaming: bool,
}

impl RequestMetrics {
    pub fn start(provider: &'static str, endpoint: &str) -> Self {
        Self {
            provider,
            endpoint: endpoint_label(endpoint),
            start: Instant::now(),
            streaming: false,
        }
    }

    /// The response is a stream; counted as active until finished
    pub fn mark_streaming(&mut self) {
        if self.streaming {
            return;
        }
        self.streaming = true;
        counter!(
            STREAMING_REQUESTS_TOTAL,
            "provider" => self.provider,
            "endpoint" => self.endpoint
        )
        .increment(1);
        gauge!(ACTIVE_STREAMS).increment(1.0);
    }

    /// Record the request outcome
    ///
    /// `error_type` defaults to the outcome label for error outcomes.
    pub fn finish(self, status: StatusCode, outcome: Outcome, error_type: Option<&str>) {
        self.record(status.as_u16(), outcome, error_type);
    }

    /// The client left before any response existed
    pub fn finish_client_closed(self) {
        self.record(CLIENT_CLOSED_STATUS, Outcome::ClientClosed, None);
    }

    fn record(self, status: u16, outcome: Outcome, error_type: Option<&str>) {
        let provider = self.provider;
        let endpoint = self.endpoint;

        counter!(
            REQUESTS_TOTAL,
            "provider" => provider,
            "endpoint" => endpoint,
            "status" => status.to_string()
        )
        .increment(1);
        counter!(PROVIDER_REQUESTS_TOTAL, "provider" => provider).increment(1);
        histogram!(
            REQUEST_DURATION_SECONDS,
            "provider" => provider,
            "endpoint" => endpoint,
            "streaming" => self.streaming.to_string()
        )
        .record(self.start.elapsed().as_secs_f64());

        if outcome.is_error() {
            let error_type = error_type.unwrap_or(outcome.as_str()).to_string();
            counter!(
                ERRORS_TOTAL,
                "provider" => provider,
                "endpoint" => endpoint,
                "error_type" => error_type.clone()
            )
            .increment(1);
            counter!(
                PROVIDER_ERRORS_TOTAL,
                "provider" => provider,
                "error_type" => error_type
            )
            .increment(1);
        }

        if self.streaming {
            gauge!(ACTIVE_STREAMS).decrement(1.0);
        }
    }
}

/// Endpoint labels with their own series; anything else is [`OTHER_ENDPOINT`]
const KNOWN_ENDPOINTS: &[&str] = &[
    "chat/completions",
    "completions",
    "embeddings",
    "models",
    "models/:id",
    "responses",
    "moderations",
    "images/generations",
    "audio/speech",
    "audio/transcriptions",
    "audio/translations",
    "openai/deployments/:id/chat/completions",
    "openai/deployments/:id/completions",
    "openai/deployments/:id/embeddings",
    "model/:id/invoke",
    "model/:id/invoke-with-response-stream",
    "model/:id/converse",
    "model/:id/converse-stream",
    "publishers/google/models/:id:generateContent",
    "publishers/google/models/:id:streamGenerateContent",
    "publishers/google/models/:id:countTokens",
    "publishers/google/models/:id:predict",
    "publishers/google/models/:id:embedContent",
];

pub const OTHER_ENDPOINT: &str = "other";

/// Bounded endpoint label
///
/// Model and deployment names are collapsed to `:id` and the result is
/// looked up in a fixed list, so client-chosen paths cannot grow the
/// number of series. `publishers/google/models/gemini-pro:generateContent`
/// becomes `publishers/google/models/:id:generateContent`.
pub fn endpoint_label(endpoint: &str) -> &'static str {
    let normalized = collapse_ids(endpoint);
    KNOWN_ENDPOINTS
        .iter()
        .copied()
        .find(|known| *known == normalized)
        .unwrap_or(OTHER_ENDPOINT)
}

fn collapse_ids(endpoint: &str) -> String {
    let mut segments = Vec::new();
    let mut redact_next = false;

    for segment in endpoint.split('/').filter(|s| !s.is_empty()) {
        if redact_next {
            redact_next = false;
            match segment.rsplit_once(':') {
                Some((_, action)) if action.chars().all(|c| c.is_ascii_alphabetic()) => {
                    segments.push(format!(":id:{}", action))
                }
                _ => segments.push(":id".to_string()),
            }
            continue;
        }

        redact_next = matches!(segment, "model" | "models" | "deployments");
        segments.push(segment.to_string());
    }

    segments.join("/")
}
