//! Audit hook pipeline
//!
//! Hooks see every proxied request twice: before dispatch, with the
//! request envelope, and once the response is over, with an `AuditRecord`.
//! For streamed responses "over" means the server released the body,
//! either because delivery finished or because the client went away.

pub mod file;
pub mod logging;
pub mod record;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::{config::Config, envelope::RequestEnvelope, error::AppResult};

pub use file::FileAuditHook;
pub use logging::LoggingHook;
pub use record::{AuditBody, AuditRecord};

/// Pre-request and post-response callback
#[async_trait]
pub trait AuditHook: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs before dispatch; an error aborts the request with that error
    async fn pre_request(&self, _envelope: &RequestEnvelope) -> AppResult<()> {
        Ok(())
    }

    /// Runs exactly once per request, after the response is over
    async fn post_response(&self, record: &AuditRecord);
}

/// Hooks in registration order
#[derive(Clone, Default)]
pub struct HookPipeline {
    hooks: Vec<Arc<dyn AuditHook>>,
}

impl HookPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-in hooks enabled by configuration
    pub fn from_config(config: &Config) -> Self {
        let mut pipeline = Self::new().with_hook(Arc::new(LoggingHook));
        if let Some(dir) = &config.audit_log_dir {
            pipeline = pipeline.with_hook(Arc::new(FileAuditHook::new(
                dir,
                config.audit_capture_limit_bytes,
            )));
        }
        pipeline
    }

    pub fn with_hook(mut self, hook: Arc<dyn AuditHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub async fn run_pre(&self, envelope: &RequestEnvelope) -> AppResult<()> {
        for hook in &self.hooks {
            hook.pre_request(envelope).await.map_err(|e| {
                warn!(hook = hook.name(), request_id = %envelope.id, error = %e, "Pre-request hook failed");
                e
            })?;
        }
        Ok(())
    }

    pub async fn run_post(&self, record: &AuditRecord) {
        for hook in &self.hooks {
            hook.post_response(record).await;
        }
    }

    /// Run post hooks in the background
    ///
    /// Used from the stream relay's drop guard, which cannot await.
    pub fn spawn_post(&self, record: AuditRecord) {
        if self.hooks.is_empty() {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let pipeline = self.clone();
                runtime.spawn(async move {
                    pipeline.run_post(&record).await;
                });
            }
            Err(_) => warn!(
                request_id = %record.request_id,
                "No async runtime available, post-response hooks skipped"
            ),
        }
    }
}
