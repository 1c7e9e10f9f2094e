//! Bounded conversation history
//!
//! Keeps the system prompt plus a fixed-size FIFO of chat messages:
//! - Oldest messages evicted first once the cap is reached
//! - The system prompt is never evicted
//! - Eviction never leaves a tool result without its assistant call

use crate::types::{ChatMessage, Role};
use std::collections::VecDeque;

/// Default cap on history messages (system prompt excluded)
pub const MAX_CONVERSATION_MESSAGES: usize = 200;

/// System prompt used when none is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are deepbuddy, a coding assistant working inside the \
user's project directory. You can inspect the project with the provided tools: read_file, \
list_files and git_diff. Call a tool when you need information from the project, then answer \
concisely based on what the tools returned.";

/// Conversation history with bounded storage
#[derive(Debug, Clone)]
pub struct Conversation {
    system_prompt: String,

    /// FIFO of messages (bounded by max_messages)
    messages: VecDeque<ChatMessage>,

    max_messages: usize,
}

impl Conversation {
    /// Create conversation with default capacity
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self::with_capacity(system_prompt, MAX_CONVERSATION_MESSAGES)
    }

    /// Create conversation with custom capacity
    pub fn with_capacity(system_prompt: impl Into<String>, max_messages: usize) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            messages: VecDeque::with_capacity(max_messages.min(MAX_CONVERSATION_MESSAGES)),
            max_messages: max_messages.max(1),
        }
    }

    /// Append a message, evicting the oldest if at capacity
    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push_back(message);

        while self.messages.len() > self.max_messages {
            self.messages.pop_front();
        }
        // A leading tool result has lost its call
        while self
            .messages
            .front()
            .map_or(false, |m| m.role == Role::Tool)
        {
            self.messages.pop_front();
        }
    }

    /// Full request payload: system prompt first, then history
    pub fn messages(&self) -> Vec<ChatMessage> {
        std::iter::once(ChatMessage::system(self.system_prompt.clone()))
            .chain(self.messages.iter().cloned())
            .collect()
    }

    /// History without the system prompt
    pub fn history(&self) -> &VecDeque<ChatMessage> {
        &self.messages
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.back()
    }

    /// Count history messages (system prompt excluded)
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn max_messages(&self) -> usize {
        self.max_messages
    }

    /// Forget the history, keeping the system prompt
    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// Rough token total including the system prompt
    pub fn total_tokens(&self) -> usize {
        self.system_prompt.chars().count() / 4
            + self.messages.iter().map(|m| m.estimate_tokens()).sum::<usize>()
    }
}

impl Default for Conversation {
    fn default() -> Self {
        Self::new(DEFAULT_SYSTEM_PROMPT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ToolCall;

    #[test]
    fn test_system_prompt_leads_request() {
        let mut conversation = Conversation::new("be brief");
        conversation.push(ChatMessage::user("hello"));

        let messages = conversation.messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, "be brief");
        assert_eq!(conversation.len(), 1);
    }

    #[test]
    fn test_bounded_capacity() {
        let mut conversation = Conversation::with_capacity("sys", 3);
        for i in 0..10 {
            conversation.push(ChatMessage::user(format!("message {}", i)));
        }

        assert_eq!(conversation.len(), 3);
        assert_eq!(conversation.history()[0].content, "message 7");
        assert_eq!(conversation.last().unwrap().content, "message 9");
        assert_eq!(conversation.system_prompt(), "sys");
    }

    #[test]
    fn test_eviction_drops_orphaned_tool_result() {
        let mut conversation = Conversation::with_capacity("sys", 3);
        conversation.push(ChatMessage::assistant_tool_call(ToolCall::new("call_1", "read_file", "{}")));
        conversation.push(ChatMessage::tool_result("call_1", "contents"));
        conversation.push(ChatMessage::assistant("done"));
        conversation.push(ChatMessage::user("next"));

        // Evicting the call would leave its result leading the history
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation.history()[0].content, "done");
    }

    #[test]
    fn test_clear_keeps_system_prompt() {
        let mut conversation = Conversation::default();
        conversation.push(ChatMessage::user("hello"));
        conversation.clear();

        assert!(conversation.is_empty());
        assert_eq!(conversation.messages().len(), 1);
        assert_eq!(conversation.system_prompt(), DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn test_total_tokens_counts_prompt_and_calls() {
        let mut conversation = Conversation::new("12345678");
        assert_eq!(conversation.total_tokens(), 2);

        conversation.push(ChatMessage::user("abcd"));
        conversation.push(ChatMessage::assistant_tool_call(ToolCall::new("call_1", "read_file", "{}")));
        // 8/4 + 4/4 + (9 + 2)/4
        assert_eq!(conversation.total_tokens(), 5);
    }
}
