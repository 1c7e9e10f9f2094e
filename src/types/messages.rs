//! Message types for agent communication
//!
//! Defines the tool calls extracted from model output and the chat messages
//! that make up the conversation history sent back to the model. Both use
//! the OpenAI chat-completions wire shape so they serialize straight into
//! request bodies.

use serde::{Deserialize, Serialize};

/// The only tool-call type the model emits
pub const FUNCTION_CALL_TYPE: &str = "function";

/// Function name and raw argument text of a tool call
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,

    /// Raw argument text as emitted by the model (usually JSON, not guaranteed)
    pub arguments: String,
}

/// A tool call requested by the model
///
/// IDs are assigned per response (`call_1`, `call_2`, ...) and repeat across
/// turns.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: String,

    pub function: FunctionCall,
}

impl ToolCall {
    /// Create a function tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: FUNCTION_CALL_TYPE.to_string(),
            function: FunctionCall {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    /// Sequential call ID for the n-th call of a response (1-based)
    pub fn sequential_id(n: usize) -> String {
        format!("call_{}", n)
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn arguments(&self) -> &str {
        &self.function.arguments
    }

    /// A queued call must carry a name and an ID to be dispatched
    pub fn is_dispatchable(&self) -> bool {
        !self.id.trim().is_empty() && !self.function.name.trim().is_empty()
    }
}

/// Conversation roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// One entry of the conversation history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,

    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCall>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::plain(Role::Assistant, content)
    }

    /// Assistant turn carrying a single tool call
    pub fn assistant_tool_call(call: ToolCall) -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            tool_calls: vec![call],
            tool_call_id: None,
        }
    }

    /// Tool-role turn carrying a call's textual output
    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: Some(call_id.into()),
        }
    }

    /// Rough token estimate (1 token ≈ 4 characters)
    pub fn estimate_tokens(&self) -> usize {
        let calls: usize = self
            .tool_calls
            .iter()
            .map(|c| c.function.name.len() + c.function.arguments.len())
            .sum();
        (self.content.chars().count() + calls) / 4
    }
}
