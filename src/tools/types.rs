//! Tool execution types and structures
//!
//! The `Tool` trait every local tool implements, the execution context it
//! runs in, and the structured result the executor hands back.

use crate::errors::Result;
use crate::tools::security::PathJail;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default cap on tool output kept in history (200KB)
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 200_000;

/// A local tool the model may call
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name the model uses to call the tool
    fn name(&self) -> &str;

    /// One-line description shown in approval prompts and sent to the model
    fn description(&self) -> &str;

    /// JSON Schema of the argument object
    fn parameters(&self) -> serde_json::Value;

    /// Run the tool with already-decoded arguments
    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String>;

    fn schema(&self) -> ToolSchema {
        ToolSchema::new(self.name(), self.description(), self.parameters())
    }
}

/// Outcome of one tool call
///
/// A successful result never carries an error message; construct through
/// `success` / `failure` to keep it that way.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionResult {
    success: bool,
    output: String,
    error: String,
    duration_ms: u64,
}

impl ExecutionResult {
    pub fn success(output: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: true,
            output: output.into(),
            error: String::new(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn failure(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: error.into(),
            duration_ms: duration.as_millis() as u64,
        }
    }

    pub fn is_success(&self) -> bool {
        self.success
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn error(&self) -> &str {
        &self.error
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Text recorded in the tool-role history entry
    pub fn history_text(&self) -> String {
        if self.success {
            self.output.clone()
        } else {
            format!("Error: {}", self.error)
        }
    }
}

/// Tool execution context with security and resource bounds
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Path jail rooted at the project directory
    pub jail: PathJail,

    /// Maximum output size (bytes)
    pub max_output_size: usize,
}

impl ToolContext {
    /// Create a context rooted at an existing project directory
    pub fn new(working_dir: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            jail: PathJail::new(working_dir)?,
            max_output_size: DEFAULT_MAX_OUTPUT_BYTES,
        })
    }

    /// Set max output size
    pub fn with_max_output_size(mut self, size: usize) -> Self {
        self.max_output_size = size;
        self
    }

    /// Canonical project root
    pub fn working_dir(&self) -> &Path {
        self.jail.jail_root()
    }

    /// Resolve a model-supplied path inside the project
    pub fn resolve(&self, path: &str) -> Result<PathBuf> {
        self.jail.verify_and_canonicalize(path)
    }
}

/// Tool schema definition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,

    /// Parameter schema (JSON Schema)
    pub parameters: serde_json::Value,
}

impl ToolSchema {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }

    /// Entry for the `tools` array of a chat-completions request
    pub fn to_function_spec(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}
