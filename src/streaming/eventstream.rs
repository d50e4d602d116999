//! AWS event-stream framing
//!
//! Bedrock's `converse-stream` replies with binary frames instead of SSE:
//!
//! ```text
//! [total len u32][headers len u32][prelude crc u32][headers][payload][message crc u32]
//! ```
//!
//! Integers are big-endian. Each header is a one-byte name length, the
//! name, a one-byte value type and the value. Only string headers
//! (`:event-type`, `:message-type`, ...) are kept. CRCs are not checked;
//! TLS already covers transport integrity.

use bytes::{Bytes, BytesMut};
use serde_json::Value;

use crate::error::{AppError, AppResult};

const PRELUDE_LEN: usize = 12;
const CRC_LEN: usize = 4;
/// Frames above this size are treated as corruption
const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Header value type tags
const TYPE_BYTE_ARRAY: u8 = 6;
const TYPE_STRING: u8 = 7;

/// One decoded event-stream message
#[derive(Debug, Clone)]
pub struct EventFrame {
    headers: Vec<(String, String)>,
    pub payload: Bytes,
}

impl EventFrame {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// `:event-type` of a regular event frame
    pub fn event_type(&self) -> Option<&str> {
        match self.header(":message-type") {
            Some("event") | None => self.header(":event-type"),
            Some(_) => None,
        }
    }

    /// Description of an `exception` or `error` frame
    pub fn error_message(&self) -> Option<String> {
        match self.header(":message-type")? {
            "exception" => {
                let kind = self.header(":exception-type").unwrap_or("exception");
                let detail = serde_json::from_slice::<Value>(&self.payload)
                    .ok()
                    .and_then(|v| v.get("message").and_then(Value::as_str).map(str::to_string))
                    .unwrap_or_else(|| String::from_utf8_lossy(&self.payload).into_owned());
                Some(format!("{}: {}", kind, detail))
            }
            "error" => Some(format!(
                "{}: {}",
                self.header(":error-code").unwrap_or("error"),
                self.header(":error-message").unwrap_or_default()
            )),
            _ => None,
        }
    }

    fn parse(frame: Bytes, headers_len: usize, provider: &'static str) -> AppResult<Self> {
        let mut cursor = &frame[PRELUDE_LEN..PRELUDE_LEN + headers_len];
        let mut headers = Vec::new();

        while !cursor.is_empty() {
            let name_len = take(&mut cursor, 1, provider)?[0] as usize;
            let name = String::from_utf8_lossy(take(&mut cursor, name_len, provider)?).into_owned();
            let value_type = take(&mut cursor, 1, provider)?[0];

            let fixed_len = match value_type {
                0 | 1 => 0,
                2 => 1,
                3 => 2,
                4 => 4,
                5 | 8 => 8,
                9 => 16,
                TYPE_BYTE_ARRAY | TYPE_STRING => {
                    let len = take(&mut cursor, 2, provider)?;
                    let len = u16::from_be_bytes([len[0], len[1]]) as usize;
                    let value = take(&mut cursor, len, provider)?;
                    if value_type == TYPE_STRING {
                        headers.push((name, String::from_utf8_lossy(value).into_owned()));
                    }
                    continue;
                }
                other => return Err(malformed(provider, format!("unknown header type {}", other))),
            };
            take(&mut cursor, fixed_len, provider)?;
        }

        let payload = frame.slice(PRELUDE_LEN + headers_len..frame.len() - CRC_LEN);
        Ok(Self { headers, payload })
    }
}

/// Incremental frame decoder fed with arbitrarily split chunks
#[derive(Debug)]
pub struct EventStreamDecoder {
    provider: &'static str,
    pending: BytesMut,
}

impl EventStreamDecoder {
    pub fn new(provider: &'static str) -> Self {
        Self {
            provider,
            pending: BytesMut::new(),
        }
    }

    /// Append a chunk and return every frame it completes
    pub fn feed(&mut self, chunk: &[u8]) -> AppResult<Vec<EventFrame>> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();

        while self.pending.len() >= PRELUDE_LEN {
            let total_len = be_u32(&self.pending[0..4]);
            let headers_len = be_u32(&self.pending[4..8]);

            if total_len > MAX_FRAME_LEN || PRELUDE_LEN + headers_len + CRC_LEN > total_len {
                return Err(malformed(
                    self.provider,
                    format!("{} byte frame with {} header bytes", total_len, headers_len),
                ));
            }
            if self.pending.len() < total_len {
                break;
            }

            let frame = self.pending.split_to(total_len).freeze();
            frames.push(EventFrame::parse(frame, headers_len, self.provider)?);
        }

        Ok(frames)
    }

    /// True when no partial frame is buffered
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

fn be_u32(bytes: &[u8]) -> usize {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
}

fn take<'a>(cursor: &mut &'a [u8], len: usize, provider: &'static str) -> AppResult<&'a [u8]> {
    if cursor.len() < len {
        return Err(malformed(provider, "header runs past its section".to_string()));
    }
    let (head, rest) = cursor.split_at(len);
    *cursor = rest;
    Ok(head)
}

fn malformed(provider: &'static str, detail: String) -> AppError {
    AppError::upstream(provider, format!("Malformed event-stream frame: {}", detail))
}
