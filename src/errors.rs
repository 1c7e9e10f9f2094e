//! Error types for deepbuddy
//!
//! One crate-wide error enum with context-carrying variants. Tool and
//! transport failures that the pipeline recovers from locally are not
//! represented here; they become `ExecutionResult`s or `ModelError`s.

use thiserror::Error;

/// Main error type for the deepbuddy agent
#[derive(Error, Debug)]
pub enum AgentError {
    /// Tool pipeline state machine transition errors
    #[error("Invalid state transition from {from} on {event}: {reason}")]
    InvalidTransition {
        from: String,
        event: String,
        reason: String,
    },

    /// Approval response that does not answer the outstanding request
    #[error("Approval response {response_id} does not match outstanding request {expected}")]
    StaleApproval {
        response_id: String,
        expected: String,
    },

    /// Permission store read/write failures
    #[error("Permission store error: {0}")]
    PermissionStore(String),

    /// Tool implementation errors (reported inside an ExecutionResult)
    #[error("{0}")]
    Tool(String),

    /// Path escapes the project directory
    #[error("Security violation: {0}")]
    PathViolation(String),

    /// Model API errors surfaced outside the streaming path
    #[error("Model API error: {0}")]
    ModelApi(String),

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic errors with context
    #[error("Agent error: {0}")]
    Generic(String),
}

/// Result type alias for agent operations
pub type Result<T> = std::result::Result<T, AgentError>;

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Generic(err.to_string())
    }
}
