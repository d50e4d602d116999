//! Shared upstream transport
//!
//! Sending requests through the shared `reqwest::Client` and turning the
//! replies into response envelopes, either buffered or as a relayed stream.

use axum::http::{header, HeaderMap, Method};
use futures::StreamExt;
use serde_json::Value;

use crate::{
    envelope::{ByteStream, RequestEnvelope, ResponseEnvelope},
    error::{AppError, AppResult},
    proxy::{headers::filter_response_headers, logging::RequestContext},
};

/// Content types that are relayed chunk by chunk even without a streaming request
const STREAMING_CONTENT_TYPES: &[&str] = &["text/event-stream", "application/vnd.amazon.eventstream"];

/// Join a base URL, an endpoint path and an optional query string
pub fn join_url(base: &str, endpoint: &str, query: Option<&str>) -> String {
    let base = base.trim_end_matches('/');
    let endpoint = endpoint.trim_start_matches('/');

    let mut url = if endpoint.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, endpoint)
    };

    if let Some(query) = query.filter(|q| !q.is_empty()) {
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(query);
    }

    url
}

/// Attach the client body unless the method carries none
pub fn attach_body(
    request: reqwest::RequestBuilder,
    envelope: &RequestEnvelope,
) -> reqwest::RequestBuilder {
    if envelope.body.is_empty() || envelope.method == Method::GET || envelope.method == Method::HEAD {
        request
    } else {
        request.body(envelope.body.clone())
    }
}

/// Send a prepared request
///
/// Timeouts keep their own error so they surface as 504; every other
/// transport failure becomes an `UpstreamError`.
pub async fn send(
    provider: &'static str,
    request: reqwest::RequestBuilder,
    url: &str,
    ctx: &RequestContext,
) -> AppResult<reqwest::Response> {
    let response = request.send().await.map_err(|e| {
        ctx.log_connection_error(&e.to_string(), url);
        if e.is_timeout() {
            AppError::HttpError(e)
        } else {
            AppError::upstream(provider, e.to_string())
        }
    })?;

    ctx.log_upstream_response(response.status().as_u16(), response.content_length());
    Ok(response)
}

/// Turn an upstream reply into a response envelope, verbatim
///
/// Non-2xx replies are buffered and passed through with their status.
pub async fn relay(
    provider: &'static str,
    response: reqwest::Response,
    want_stream: bool,
) -> AppResult<ResponseEnvelope> {
    let status = response.status();
    let headers = filter_response_headers(response.headers());

    if status.is_success() && (want_stream || is_streaming_content(&headers)) {
        return Ok(ResponseEnvelope::Streaming {
            status,
            headers,
            stream: byte_stream(provider, response),
        });
    }

    let body = response
        .bytes()
        .await
        .map_err(|e| AppError::upstream(provider, format!("Failed to read upstream body: {}", e)))?;

    Ok(ResponseEnvelope::Complete {
        status,
        headers,
        body,
    })
}

/// Read a JSON reply, turning non-2xx statuses into `UpstreamError`
pub async fn read_json(provider: &'static str, response: reqwest::Response) -> AppResult<Value> {
    let response = ensure_success(provider, response).await?;
    let body = response
        .bytes()
        .await
        .map_err(|e| AppError::upstream(provider, format!("Failed to read upstream body: {}", e)))?;

    serde_json::from_slice(&body)
        .map_err(|e| AppError::upstream(provider, format!("Invalid JSON from upstream: {}", e)))
}

/// Fail with the upstream status and body unless the reply is 2xx
pub async fn ensure_success(
    provider: &'static str,
    response: reqwest::Response,
) -> AppResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    Err(AppError::UpstreamError {
        provider,
        status: Some(status.as_u16()),
        message: format!("{} returned {}: {}", provider, status, text),
    })
}

/// Upstream body as a relay byte stream
pub fn byte_stream(provider: &'static str, response: reqwest::Response) -> ByteStream {
    Box::pin(
        response
            .bytes_stream()
            .map(move |chunk| chunk.map_err(|e| AppError::upstream(provider, e.to_string()))),
    )
}

fn is_streaming_content(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| STREAMING_CONTENT_TYPES.iter().any(|s| ct.starts_with(s)))
        .unwrap_or(false)
}
