//! Proxy handler
//!
//! Fallback handler for every path under a provider prefix. It resolves the
//! route, builds the request envelope, runs pre-request hooks, dispatches to
//! the engine and delivers the reply. Post-response hooks and metrics are
//! finished exactly once per request:
//! - buffered replies and errors: before the response is returned
//! - streamed replies: when the server releases the response body
//! - client gone before any response: when the handler future is dropped

use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::{OriginalUri, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
};
use tracing::Instrument;

use crate::{
    envelope::{ByteStream, Outcome, RequestEnvelope, ResponseEnvelope},
    error::AppError,
    hooks::{AuditRecord, HookPipeline},
    proxy::logging::RequestContext,
    streaming::RelayStream,
    telemetry::RequestMetrics,
    AppState,
};

/// Response header carrying the relay's request id
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-relay-request-id");

/// Provider label for requests no binding matched
const UNMATCHED: &str = "unmatched";

pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    OriginalUri(uri): OriginalUri,
    method: Method,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let route = match state.routes.resolve(uri.path()) {
        Ok(route) => route,
        Err(e) => {
            RequestMetrics::start(UNMATCHED, UNMATCHED).finish(
                e.status_code(),
                Outcome::Failed,
                Some(e.error_type()),
            );
            return e.into_response();
        }
    };

    let metrics = RequestMetrics::start(route.kind.as_str(), &route.endpoint);

    let envelope = match RequestEnvelope::new(
        &route,
        method,
        uri.query().map(str::to_string),
        &headers,
        body,
    ) {
        Ok(envelope) => Arc::new(envelope),
        Err(e) => {
            metrics.finish(e.status_code(), Outcome::Failed, Some(e.error_type()));
            return e.into_response();
        }
    };

    let ctx = RequestContext::for_envelope(&envelope);
    let span = ctx.create_span();
    ctx.log_request_start(envelope.method.as_str());

    let capture_limit = state.config.audit_capture_limit_bytes;
    let pending = PendingRequest {
        hooks: state.hooks.clone(),
        ctx: ctx.clone(),
        request_id: envelope.id.clone(),
        capture_limit,
        owed: Some((AuditRecord::for_request(&envelope, capture_limit), metrics)),
    };

    let engine = state.engines.get(route.kind);
    let result = async {
        state.hooks.run_pre(&envelope).await?;
        engine.dispatch(&envelope, &ctx).await
    }
    .instrument(span)
    .await;

    match result {
        Err(e) => pending.failed(e).await,
        Ok(ResponseEnvelope::Complete {
            status,
            headers,
            body,
        }) => pending.completed(status, headers, body).await,
        Ok(ResponseEnvelope::Streaming {
            status,
            headers,
            stream,
        }) => pending.streaming(status, headers, stream),
    }
}

/// Audit record and metrics owed for a request until it is answered
///
/// Dropped while still owing them means the handler future itself was
/// dropped: the client disconnected before a response existed. That case
/// is recorded as `ClientClosed` from `Drop`.
struct PendingRequest {
    hooks: HookPipeline,
    ctx: RequestContext,
    request_id: String,
    capture_limit: usize,
    owed: Option<(AuditRecord, RequestMetrics)>,
}

impl PendingRequest {
    async fn failed(mut self, e: AppError) -> Response {
        self.ctx.log_error(&e.to_string());
        if let Some((record, metrics)) = self.owed.take() {
            let record = record.failed(&e).with_duration(self.ctx.start_time.elapsed());
            metrics.finish(e.status_code(), Outcome::Failed, Some(e.error_type()));
            self.hooks.run_post(&record).await;
        }
        with_request_id(e.into_response(), &self.request_id)
    }

    async fn completed(mut self, status: StatusCode, headers: HeaderMap, body: Bytes) -> Response {
        let outcome = if status.is_success() {
            Outcome::Success
        } else {
            self.ctx.log_warning(&format!("Upstream answered {}", status));
            Outcome::UpstreamStatus
        };
        self.ctx.log_request_complete(status.as_u16());

        if let Some((record, metrics)) = self.owed.take() {
            let record = record
                .completed(status, outcome, &body, self.capture_limit)
                .with_duration(self.ctx.start_time.elapsed());
            metrics.finish(status, outcome, None);
            self.hooks.run_post(&record).await;
        }

        build_response(status, headers, Body::from(body), &self.request_id)
    }

    /// Hand the owed record and metrics to the stream's close callback
    fn streaming(mut self, status: StatusCode, headers: HeaderMap, stream: ByteStream) -> Response {
        self.ctx.log_stream_started();
        let mut relay = RelayStream::new(stream, self.capture_limit);

        if let Some((record, mut metrics)) = self.owed.take() {
            metrics.mark_streaming();
            let hooks = self.hooks.clone();
            let ctx = self.ctx.clone();
            relay = relay.on_close(move |summary| {
                ctx.log_stream_ended(summary.chunks, summary.outcome.as_str());
                if let Some(error) = &summary.error {
                    ctx.log_error(error);
                }
                let outcome = summary.outcome;
                let record = record
                    .streamed(status, summary)
                    .with_duration(ctx.start_time.elapsed());
                metrics.finish(status, outcome, None);
                hooks.spawn_post(record);
            });
        }

        build_response(status, headers, Body::from_stream(relay), &self.request_id)
    }
}

impl Drop for PendingRequest {
    fn drop(&mut self) {
        let Some((record, metrics)) = self.owed.take() else {
            return;
        };
        self.ctx
            .log_warning("Client disconnected before the response was ready");
        metrics.finish_client_closed();
        self.hooks
            .spawn_post(record.client_closed().with_duration(self.ctx.start_time.elapsed()));
    }
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body, request_id: &str) -> Response {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    with_request_id(response, request_id)
}

fn with_request_id(mut response: Response, request_id: &str) -> Response {
    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
