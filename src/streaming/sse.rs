//! Incremental server-sent-events decoder
//!
//! Accumulates raw bytes from the HTTP body and yields the payload of every
//! complete `data:` line. Partial lines stay buffered until the next chunk.
//! The buffer is bounded so a server that never sends a newline cannot grow
//! it without limit.

use crate::errors::{AgentError, Result};

/// Maximum buffered bytes of an unterminated line (1MB)
pub const MAX_BUFFER_SIZE: usize = 1_048_576;

/// Payload that terminates an OpenAI-style stream
pub const DONE_MARKER: &str = "[DONE]";

/// One decoded SSE payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Line-oriented SSE decoder
#[derive(Debug)]
pub struct SseDecoder {
    buffer: Vec<u8>,
    max_buffer_size: usize,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::with_capacity(MAX_BUFFER_SIZE)
    }

    pub fn with_capacity(max_buffer_size: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            max_buffer_size,
        }
    }

    /// Add bytes and return every event completed by them
    ///
    /// Only the unterminated tail left after complete lines are decoded
    /// counts against the buffer bound.
    pub fn add_bytes(&mut self, bytes: &[u8]) -> Result<Vec<SseEvent>> {
        self.buffer.extend_from_slice(bytes);

        let mut events = Vec::new();
        let mut start = 0;
        while let Some(offset) = self.buffer[start..].iter().position(|&b| b == b'\n') {
            let end = start + offset;
            let line = String::from_utf8_lossy(&self.buffer[start..end]);
            if let Some(event) = decode_line(line.trim_end_matches('\r')) {
                events.push(event);
            }
            start = end + 1;
        }
        self.buffer.drain(..start);

        if self.buffer.len() > self.max_buffer_size {
            let size = self.buffer.len();
            self.buffer.clear();
            return Err(AgentError::ModelApi(format!(
                "SSE buffer overflow: {} bytes exceeds maximum {}",
                size, self.max_buffer_size
            )));
        }
        Ok(events)
    }

    /// Decode whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<SseEvent> {
        if self.buffer.is_empty() {
            return None;
        }
        let line = String::from_utf8_lossy(&self.buffer).to_string();
        self.buffer.clear();
        decode_line(line.trim())
    }
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_line(line: &str) -> Option<SseEvent> {
    // Comments (": keep-alive") and non-data fields carry nothing we use
    let payload = line.strip_prefix("data:")?.trim();
    if payload.is_empty() {
        return None;
    }
    if payload == DONE_MARKER {
        return Some(SseEvent::Done);
    }
    Some(SseEvent::Data(payload.to_string()))
}
