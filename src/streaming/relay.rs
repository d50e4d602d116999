//! Stream relay
//!
//! Forwards an upstream byte stream to the client chunk by chunk. The relay
//! owns a close callback that runs exactly once, when the server releases
//! the response body: after the last chunk was written, or as soon as the
//! client disconnects. Dropping the relay drops the upstream stream, which
//! cancels the upstream read.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::Stream;

use crate::{
    envelope::{ByteStream, Outcome},
    error::AppResult,
};

/// What the relay observed by the time the body was released
#[derive(Debug, Clone)]
pub struct RelaySummary {
    pub chunks: usize,
    pub bytes: usize,
    /// Copy of the leading chunks, bounded by the capture limit
    pub captured: Vec<Bytes>,
    /// Whether chunks were left out of `captured`
    pub truncated: bool,
    pub outcome: Outcome,
    pub error: Option<String>,
}

type CloseCallback = Box<dyn FnOnce(RelaySummary) + Send>;

/// Pass-through stream with a drop-triggered completion callback
pub struct RelayStream {
    inner: Option<ByteStream>,
    chunks: usize,
    bytes: usize,
    captured: Vec<Bytes>,
    captured_bytes: usize,
    capture_limit: usize,
    truncated: bool,
    upstream_done: bool,
    error: Option<String>,
    on_close: Option<CloseCallback>,
}

impl RelayStream {
    pub fn new(inner: ByteStream, capture_limit: usize) -> Self {
        Self {
            inner: Some(inner),
            chunks: 0,
            bytes: 0,
            captured: Vec::new(),
            captured_bytes: 0,
            capture_limit,
            truncated: false,
            upstream_done: false,
            error: None,
            on_close: None,
        }
    }

    /// Register the callback run when the body is released
    pub fn on_close<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(RelaySummary) + Send + 'static,
    {
        self.on_close = Some(Box::new(callback));
        self
    }

    fn record_chunk(&mut self, chunk: &Bytes) {
        self.chunks += 1;
        self.bytes += chunk.len();

        if self.captured_bytes + chunk.len() <= self.capture_limit {
            self.captured_bytes += chunk.len();
            self.captured.push(chunk.clone());
        } else {
            self.truncated = true;
        }
    }

    fn outcome(&self) -> Outcome {
        if self.error.is_some() {
            Outcome::StreamFailed
        } else if self.upstream_done {
            Outcome::Success
        } else {
            Outcome::ClientClosed
        }
    }
}

impl Stream for RelayStream {
    type Item = AppResult<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        let Some(inner) = this.inner.as_mut() else {
            return Poll::Ready(None);
        };

        match inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.record_chunk(&chunk);
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.error = Some(e.to_string());
                this.inner = None;
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.upstream_done = true;
                this.inner = None;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RelayStream {
    fn drop(&mut self) {
        // Release the upstream connection before running the callback.
        self.inner = None;

        if let Some(callback) = self.on_close.take() {
            let summary = RelaySummary {
                chunks: self.chunks,
                bytes: self.bytes,
                captured: std::mem::take(&mut self.captured),
                truncated: self.truncated,
                outcome: self.outcome(),
                error: self.error.take(),
            };
            callback(summary);
        }
    }
}
