//! Type definitions module
//!
//! Core types for model communication and conversation history.

pub mod messages;

// Re-export commonly used types
pub use messages::{ChatMessage, FunctionCall, Role, ToolCall, FUNCTION_CALL_TYPE};
