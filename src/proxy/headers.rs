//! Header utilities for provider proxying
//!
//! Client credentials are never forwarded upstream: only a small whitelist of
//! content negotiation headers crosses the relay, and each engine adds its own
//! provider authentication.

use axum::http::header::{self, HeaderName};
use reqwest::header::{HeaderMap, HeaderValue};

use crate::error::{AppError, AppResult};

/// Hop-by-hop headers that must never be forwarded
const HOP_BY_HOP_HEADERS: &[HeaderName] = &[
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Client headers copied onto upstream requests
const FORWARDED_REQUEST_HEADERS: &[HeaderName] =
    &[header::CONTENT_TYPE, header::ACCEPT, header::USER_AGENT];

/// Check if a header is a hop-by-hop header that should not be forwarded
pub fn is_hop_by_hop_header(name: &HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(name)
}

/// Keep only the whitelisted client headers
pub fn forwardable_request_headers(incoming: &HeaderMap) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for name in FORWARDED_REQUEST_HEADERS {
        if let Some(value) = incoming.get(name) {
            headers.insert(name.clone(), value.clone());
        }
    }

    headers
}

/// Filter hop-by-hop headers from a response
///
/// `Content-Length` is dropped as well; the body is re-framed by the server.
pub fn filter_response_headers(response_headers: &HeaderMap) -> HeaderMap {
    let mut filtered = HeaderMap::new();

    for (name, value) in response_headers {
        if !is_hop_by_hop_header(name) && name != header::CONTENT_LENGTH {
            filtered.append(name.clone(), value.clone());
        }
    }

    filtered
}

/// `Authorization: Bearer <token>` value
pub fn bearer_value(token: &str) -> AppResult<HeaderValue> {
    secret_value(&format!("Bearer {}", token))
}

/// Header value for a credential, marked sensitive so it is never logged
pub fn secret_value(secret: &str) -> AppResult<HeaderValue> {
    let mut value = HeaderValue::from_str(secret).map_err(|_| {
        AppError::Internal(anyhow::anyhow!("Credential contains invalid header characters"))
    })?;
    value.set_sensitive(true);
    Ok(value)
}
