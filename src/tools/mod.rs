//! Tool execution system
//!
//! - Tool trait and registry (name → implementation, injected)
//! - Path jail confining tools to the project directory
//! - Executor running one call at a time under a timeout
//! - Built-in read-only tools: read_file, list_files, git_diff

pub mod types;
pub mod registry;
pub mod security;
pub mod executor;
pub mod implementations;

// Re-export commonly used types
pub use types::{ExecutionResult, Tool, ToolContext, ToolSchema};
pub use registry::ToolRegistry;
pub use security::PathJail;
pub use executor::{ToolExecutor, DEFAULT_TOOL_TIMEOUT};
