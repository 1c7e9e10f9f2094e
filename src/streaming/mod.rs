//! Model streaming module
//!
//! Chat-completions client, SSE decoding and tool-call markup parsing.

pub mod client;
pub mod parser;
pub mod sse;

// Re-export commonly used types
pub use client::{
    ChatRequest, HttpModelClient, ModelClient, ModelError, StreamEvent, DEFAULT_BASE_URL,
    DEFAULT_MODEL,
};
pub use parser::{ParsedResponse, ResponseParser};
pub use sse::{SseDecoder, SseEvent};
