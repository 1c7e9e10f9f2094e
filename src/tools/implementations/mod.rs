//! Built-in tool implementations

pub mod filesystem;
pub mod git;

// Re-export for convenience
pub use filesystem::{ListFilesTool, ReadFileTool};
pub use git::GitDiffTool;
