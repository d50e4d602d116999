//! SSE (Server-Sent Events) streaming utilities
//!
//! Line reassembly and event formatting for translated streams, plus the
//! relay that forwards upstream bodies to clients. AWS event-stream frames
//! are decoded in `eventstream`.

pub mod eventstream;
pub mod relay;

use bytes::Bytes;
use serde::Serialize;

use crate::error::AppResult;

pub use eventstream::{EventFrame, EventStreamDecoder};
pub use relay::{RelayStream, RelaySummary};

/// Reassembles SSE lines from arbitrarily split byte chunks
///
/// Bytes are kept until a `\n` arrives, so multi-byte characters split
/// across chunks decode intact. Returned lines have `\r\n` / `\n` removed;
/// blank separator lines are skipped.
///
/// ```
/// use llm_relay::streaming::SseLineBuffer;
///
/// let mut buffer = SseLineBuffer::new();
/// assert!(buffer.feed(b"data: {\"a\":").is_empty());
/// assert_eq!(buffer.feed(b"1}\r\n\n"), vec!["data: {\"a\":1}"]);
/// ```
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and drain every line it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);

        let Some(last_newline) = self.pending.iter().rposition(|b| *b == b'\n') else {
            return Vec::new();
        };
        let rest = self.pending.split_off(last_newline + 1);
        let complete = std::mem::replace(&mut self.pending, rest);

        complete
            .split(|b| *b == b'\n')
            .filter_map(decode_line)
            .collect()
    }

    /// Trailing line left without a terminating newline
    pub fn finish(&mut self) -> Option<String> {
        let pending = std::mem::take(&mut self.pending);
        decode_line(&pending)
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn decode_line(raw: &[u8]) -> Option<String> {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    if raw.is_empty() {
        None
    } else {
        Some(String::from_utf8_lossy(raw).into_owned())
    }
}

/// Payload of an SSE `data:` line, or `None` for comments and other fields
pub fn sse_data(line: &str) -> Option<&str> {
    let line = line.trim_end_matches('\r');
    line.strip_prefix("data:").map(str::trim_start)
}

/// Format a serializable value as an SSE data event: `data: {json}\n\n`
pub fn format_sse_data<T: Serialize>(value: &T) -> AppResult<Bytes> {
    let json = serde_json::to_string(value)?;
    Ok(Bytes::from(format!("data: {}\n\n", json)))
}

/// Format the SSE done marker: `data: [DONE]\n\n`
pub fn format_sse_done() -> Bytes {
    Bytes::from_static(b"data: [DONE]\n\n")
}

/// SSE error event structure for stream errors.
#[derive(Debug, Serialize)]
struct SseErrorEvent {
    error: SseErrorDetails,
}

#[derive(Debug, Serialize)]
struct SseErrorDetails {
    message: String,
    #[serde(rename = "type")]
    error_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    code: Option<String>,
}

/// Format an error as an SSE error event so clients see why a stream ended.
pub fn format_error_event(message: &str, code: Option<&str>) -> Bytes {
    let event = SseErrorEvent {
        error: SseErrorDetails {
            message: message.to_string(),
            error_type: "stream_error".to_string(),
            code: code.map(|c| c.to_string()),
        },
    };
    match serde_json::to_string(&event) {
        Ok(json) => Bytes::from(format!("data: {}\n\n", json)),
        Err(_) => Bytes::from_static(b"data: {\"error\":{\"type\":\"stream_error\"}}\n\n"),
    }
}
