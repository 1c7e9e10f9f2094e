//! Agent orchestration module
//!
//! Tool-call pipeline state machine, conversation history, the tool
//! manager and the turn runner that drives them.

pub mod state;
pub mod conversation;
pub mod manager;
pub mod runner;

// Re-export commonly used types
pub use state::{PipelineEvent, PipelineState};
pub use conversation::{Conversation, DEFAULT_SYSTEM_PROMPT, MAX_CONVERSATION_MESSAGES};
pub use manager::{ToolEffect, ToolManager};
pub use runner::{AgentUi, TurnOutcome, TurnRunner, CANCELLED_NOTICE};
