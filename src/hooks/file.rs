//! JSON-lines audit file
//!
//! One file per UTC day, `audit_YYYYMMDD.log`, with a `request` line before
//! dispatch and a `response` or `error` line once the response is over.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{fs, io::AsyncWriteExt, sync::Mutex};
use tracing::error;

use super::{AuditBody, AuditHook, AuditRecord};
use crate::{envelope::RequestEnvelope, error::AppResult, router::ProviderKind};

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AuditLine<'a> {
    Request {
        timestamp: DateTime<Utc>,
        request_id: &'a str,
        provider: ProviderKind,
        endpoint: &'a str,
        method: &'a str,
        model: Option<&'a str>,
        stream: bool,
        body: AuditBody,
        truncated: bool,
    },
    Response(&'a AuditRecord),
    Error(&'a AuditRecord),
}

/// Appends audit records to a daily file
pub struct FileAuditHook {
    dir: PathBuf,
    capture_limit: usize,
    // Serializes appends so lines never interleave
    write_lock: Mutex<()>,
}

impl FileAuditHook {
    pub fn new(dir: impl AsRef<Path>, capture_limit: usize) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
            capture_limit,
            write_lock: Mutex::new(()),
        }
    }

    /// File receiving records written at `now`
    pub fn path_for(&self, now: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("audit_{}.log", now.format("%Y%m%d")))
    }

    async fn append(&self, line: &AuditLine<'_>) {
        if let Err(e) = self.try_append(line).await {
            error!(dir = %self.dir.display(), error = %e, "Failed to write audit record");
        }
    }

    async fn try_append(&self, line: &AuditLine<'_>) -> anyhow::Result<()> {
        let mut json = serde_json::to_vec(line)?;
        json.push(b'\n');

        let _guard = self.write_lock.lock().await;
        fs::create_dir_all(&self.dir).await?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path_for(Utc::now()))
            .await?;
        file.write_all(&json).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl AuditHook for FileAuditHook {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn pre_request(&self, envelope: &RequestEnvelope) -> AppResult<()> {
        let (body, truncated) = AuditBody::capture(&envelope.body, self.capture_limit);
        self.append(&AuditLine::Request {
            timestamp: Utc::now(),
            request_id: &envelope.id,
            provider: envelope.provider,
            endpoint: &envelope.endpoint,
            method: envelope.method.as_str(),
            model: envelope.model.as_deref(),
            stream: envelope.stream,
            body,
            truncated,
        })
        .await;
        Ok(())
    }

    async fn post_response(&self, record: &AuditRecord) {
        let line = if record.error.is_some() || record.outcome.is_error() {
            AuditLine::Error(record)
        } else {
            AuditLine::Response(record)
        };
        self.append(&line).await;
    }
}
