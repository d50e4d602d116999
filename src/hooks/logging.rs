//! Structured log lines for every request and response

use async_trait::async_trait;
use tracing::{info, warn};

use super::{AuditHook, AuditRecord};
use crate::{envelope::RequestEnvelope, error::AppResult};

/// Logs each request and its outcome through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHook;

#[async_trait]
impl AuditHook for LoggingHook {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn pre_request(&self, envelope: &RequestEnvelope) -> AppResult<()> {
        info!(
            request_id = %envelope.id,
            provider = %envelope.provider,
            endpoint = %envelope.endpoint,
            method = %envelope.method,
            model = ?envelope.model,
            messages = ?envelope.message_count(),
            stream = envelope.stream,
            body_bytes = envelope.body.len(),
            "Audit: request"
        );
        Ok(())
    }

    async fn post_response(&self, record: &AuditRecord) {
        if record.outcome.is_error() {
            warn!(
                request_id = %record.request_id,
                provider = %record.provider,
                endpoint = %record.endpoint,
                status = record.status,
                outcome = record.outcome.as_str(),
                error = ?record.error,
                duration_ms = record.duration_ms,
                "Audit: response failed"
            );
        } else {
            info!(
                request_id = %record.request_id,
                provider = %record.provider,
                endpoint = %record.endpoint,
                status = record.status,
                outcome = record.outcome.as_str(),
                chunks = ?record.chunks,
                response_bytes = record.response_bytes,
                duration_ms = record.duration_ms,
                "Audit: response"
            );
        }
    }
}
