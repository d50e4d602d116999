//! Error types for llm-relay
//!
//! This module defines the error type shared by routing, the engines and the
//! HTTP handlers, together with its JSON wire representation.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Every failure the relay reports to a client
#[derive(Debug, Error)]
pub enum AppError {
    #[error("No provider route matches path: {0}")]
    NoMatchingRoute(String),

    #[error("Credential missing for {provider}: {variable} is not set")]
    CredentialMissing {
        provider: &'static str,
        variable: &'static str,
    },

    #[error("Upstream error from {provider}: {message}")]
    UpstreamError {
        provider: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Translation error: {0}")]
    Translation(#[from] crate::proxy::translate::TranslationError),

    #[error("Request rejected by audit hook: {0}")]
    HookRejected(String),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Build an upstream error from a transport or protocol failure
    pub fn upstream(provider: &'static str, message: impl Into<String>) -> Self {
        AppError::UpstreamError {
            provider,
            status: None,
            message: message.into(),
        }
    }

    /// Short label used for the `error_type` metric dimension
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::NoMatchingRoute(_) => "no_matching_route",
            AppError::CredentialMissing { .. } => "credential_missing",
            AppError::UpstreamError { .. } => "upstream_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::Translation(_) => "translation_error",
            AppError::HookRejected(_) => "hook_rejected",
            AppError::HttpError(e) if e.is_timeout() => "upstream_timeout",
            AppError::HttpError(_) => "upstream_transport",
            AppError::JsonError(_) => "invalid_json",
            AppError::Internal(_) => "internal",
        }
    }

    /// HTTP status this error is reported with
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NoMatchingRoute(_) => StatusCode::NOT_FOUND,
            AppError::CredentialMissing { .. } => StatusCode::SERVICE_UNAVAILABLE,
            AppError::UpstreamError { .. } => StatusCode::BAD_GATEWAY,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Translation(_) => StatusCode::BAD_GATEWAY,
            AppError::HookRejected(_) => StatusCode::FORBIDDEN,
            AppError::HttpError(e) if e.is_timeout() => StatusCode::GATEWAY_TIMEOUT,
            AppError::HttpError(_) => StatusCode::BAD_GATEWAY,
            AppError::JsonError(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `{"error": {...}}` envelope returned for local failures
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

/// Additional error details for upstream and credential failures
#[derive(Debug, Serialize)]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub variable: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (code, message, details) = match &self {
            AppError::NoMatchingRoute(_) => ("NO_MATCHING_ROUTE", self.to_string(), None),
            AppError::CredentialMissing { provider, variable } => (
                "CREDENTIAL_MISSING",
                self.to_string(),
                Some(ErrorDetails {
                    provider: Some(provider.to_string()),
                    upstream_status: None,
                    variable: Some(variable.to_string()),
                }),
            ),
            AppError::UpstreamError {
                provider,
                status,
                message,
            } => (
                "UPSTREAM_ERROR",
                message.clone(),
                Some(ErrorDetails {
                    provider: Some(provider.to_string()),
                    upstream_status: *status,
                    variable: None,
                }),
            ),
            AppError::BadRequest(msg) => ("BAD_REQUEST", msg.clone(), None),
            AppError::Translation(e) => ("TRANSLATION_ERROR", e.to_string(), None),
            AppError::HookRejected(msg) => ("HOOK_REJECTED", msg.clone(), None),
            AppError::HttpError(e) if e.is_timeout() => (
                "UPSTREAM_TIMEOUT",
                "Upstream request timed out".to_string(),
                None,
            ),
            AppError::HttpError(_) => (
                "UPSTREAM_ERROR",
                "Upstream service error".to_string(),
                None,
            ),
            AppError::JsonError(_) => ("INVALID_JSON", "Invalid JSON in request".to_string(), None),
            AppError::Internal(_) => (
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
