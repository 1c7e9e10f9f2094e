//! deepbuddy - Terminal Coding Assistant
//!
//! Lets a DeepSeek model request local tools mid-conversation, with a human
//! approving each call.
//!
//! # Architecture
//!
//! - **streaming**: chat-completions client, SSE decoding, tool-call markup parser
//! - **tools**: tool trait, registry, path jail, timed executor, built-in tools
//! - **permissions**: per-project decisions and the approval workflow
//! - **agent**: pipeline state machine, tool manager, turn runner
//! - **repl** / **cli**: terminal front-end and configuration

pub mod errors;
pub mod types;
pub mod streaming;
pub mod tools;
pub mod permissions;
pub mod agent;
pub mod cli;
pub mod repl;

// Re-export commonly used types
pub use errors::{AgentError, Result};
