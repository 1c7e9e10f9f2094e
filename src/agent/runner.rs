//! Turn runner
//!
//! Drives one user turn through the model, the tool manager, the executor
//! and the UI. The manager decides; the runner performs its effects and
//! owns cancellation.

use crate::agent::conversation::Conversation;
use crate::agent::manager::{ToolEffect, ToolManager};
use crate::permissions::{ApprovalRequest, ApprovalResponse};
use crate::streaming::client::{ChatRequest, ModelClient, ModelError, StreamEvent};
use crate::streaming::parser::TOOL_CALLS_BEGIN;
use crate::tools::{ToolExecutor, ToolSchema};
use crate::types::{ChatMessage, ToolCall};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Notice shown when the user cancels a turn
pub const CANCELLED_NOTICE: &str = "Request cancelled.";

/// Everything the runner needs from the front-end
#[async_trait]
pub trait AgentUi: Send + Sync {
    /// Ask the human about one call; must answer with the request's id
    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalResponse;

    /// Live assistant text as it streams
    fn assistant_delta(&self, delta: &str);

    /// Assistant text not already shown through `assistant_delta`
    fn assistant_message(&self, text: &str);

    fn system_message(&self, text: &str);

    fn error_message(&self, text: &str);

    fn tool_started(&self, call: &ToolCall);
}

/// How a turn ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    Completed,

    /// User cancelled; not an error
    Cancelled,

    /// Model or pipeline failure, with the message shown to the user
    Failed(String),
}

/// A model response and how much of it was already displayed
struct Response {
    text: String,
    shown: String,
}

/// Drives turns for one conversation
pub struct TurnRunner {
    client: Arc<dyn ModelClient>,
    executor: ToolExecutor,
    manager: ToolManager,
    conversation: Conversation,
    tools: Vec<ToolSchema>,
    streaming: bool,
}

impl TurnRunner {
    pub fn new(
        client: Arc<dyn ModelClient>,
        executor: ToolExecutor,
        manager: ToolManager,
        conversation: Conversation,
    ) -> Self {
        let tools = executor.registry().schemas();
        Self {
            client,
            executor,
            manager,
            conversation,
            tools,
            streaming: true,
        }
    }

    /// Use single-shot completions instead of streaming
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn manager(&self) -> &ToolManager {
        &self.manager
    }

    /// Start a fresh conversation, keeping the system prompt
    pub fn reset_conversation(&mut self) {
        self.manager.reset();
        self.conversation.clear();
    }

    /// Run one user turn to completion, cancellation or failure
    pub async fn run_turn(
        &mut self,
        input: &str,
        ui: &dyn AgentUi,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        self.conversation.push(ChatMessage::user(input));
        info!(
            messages = self.conversation.len(),
            tokens = self.conversation.total_tokens(),
            "starting turn"
        );

        let request = ChatRequest::with_tools(self.conversation.messages(), self.tools.clone());
        let response = match self.request(&request, ui, cancel, true).await {
            Ok(response) => response,
            Err(e) => return self.model_failure(e, ui),
        };

        let parsed = self.manager.process_response(&response.text);
        ui.assistant_message(unshown(&response.shown, &parsed.content));
        if parsed.truncated {
            warn!("model response ended inside a tool-call block");
        }
        if !parsed.content.is_empty() {
            self.conversation.push(ChatMessage::assistant(parsed.content.clone()));
        }
        if !parsed.has_tool_calls() {
            return TurnOutcome::Completed;
        }

        match self.manager.handle_parsed_tool_calls(parsed.tool_calls) {
            Ok(effects) => self.perform(effects, ui, cancel).await,
            Err(e) => self.pipeline_failure(e.to_string(), ui),
        }
    }

    /// Perform effects in order until the queue of work is empty
    async fn perform(
        &mut self,
        effects: Vec<ToolEffect>,
        ui: &dyn AgentUi,
        cancel: &CancellationToken,
    ) -> TurnOutcome {
        let mut work: VecDeque<ToolEffect> = effects.into();
        let mut followup = false;

        while let Some(effect) = work.pop_front() {
            let next = match effect {
                ToolEffect::SystemMessage(message) => {
                    ui.system_message(&message);
                    continue;
                }
                ToolEffect::RequestFollowup => {
                    followup = true;
                    continue;
                }
                ToolEffect::RequestApproval(request) => {
                    let response = tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return self.cancelled(ui),
                        response = ui.request_approval(&request) => response,
                    };
                    if cancel.is_cancelled() {
                        return self.cancelled(ui);
                    }
                    self.manager.on_approval_resolved(&response)
                }
                ToolEffect::Execute(call) => {
                    ui.tool_started(&call);
                    let result = self.executor.execute_with_cancel(&call, cancel).await;
                    if cancel.is_cancelled() {
                        return self.cancelled(ui);
                    }
                    self.manager.on_execution_complete(&result, &mut self.conversation)
                }
            };

            match next {
                Ok(effects) => work.extend(effects),
                Err(e) => return self.pipeline_failure(e.to_string(), ui),
            }
        }

        if followup {
            self.followup(ui, cancel).await
        } else {
            TurnOutcome::Completed
        }
    }

    /// Tools-disabled narration of the results, parsed in suppressed mode
    async fn followup(&mut self, ui: &dyn AgentUi, cancel: &CancellationToken) -> TurnOutcome {
        debug!("requesting follow-up with tools disabled");
        let request = ChatRequest::without_tools(self.conversation.messages());
        let response = match self.request(&request, ui, cancel, false).await {
            Ok(response) => response,
            Err(e) => return self.model_failure(e, ui),
        };

        let parsed = self.manager.process_response(&response.text);
        ui.assistant_message(&parsed.content);
        self.conversation.push(ChatMessage::assistant(parsed.content));
        TurnOutcome::Completed
    }

    /// Fetch one response, streaming visible text to the UI when `live`
    async fn request(
        &self,
        request: &ChatRequest,
        ui: &dyn AgentUi,
        cancel: &CancellationToken,
        live: bool,
    ) -> Result<Response, ModelError> {
        if !self.streaming {
            let text = tokio::select! {
                _ = cancel.cancelled() => return Err(ModelError::Cancelled),
                text = self.client.complete(request) => text?,
            };
            return Ok(Response {
                text,
                shown: String::new(),
            });
        }

        let mut events = self.client.stream(request, cancel.clone()).await?;
        let mut visible = VisibleText::default();

        loop {
            let event = tokio::select! {
                _ = cancel.cancelled() => return Err(ModelError::Cancelled),
                event = events.recv() => event,
            };

            match event {
                Some(StreamEvent::Delta(delta)) => {
                    if live {
                        if let Some(shown) = visible.push(&delta) {
                            ui.assistant_delta(&shown);
                        }
                    }
                }
                Some(StreamEvent::Done { text, error: None }) => {
                    return Ok(Response {
                        text,
                        shown: visible.into_shown(),
                    })
                }
                Some(StreamEvent::Done { error: Some(e), .. }) => return Err(e),
                None => return Err(ModelError::Transport("stream closed before completion".to_string())),
            }
        }
    }

    fn cancelled(&mut self, ui: &dyn AgentUi) -> TurnOutcome {
        info!("turn cancelled by user");
        self.manager.reset();
        ui.system_message(CANCELLED_NOTICE);
        TurnOutcome::Cancelled
    }

    fn model_failure(&mut self, error: ModelError, ui: &dyn AgentUi) -> TurnOutcome {
        if error.is_cancelled() {
            return self.cancelled(ui);
        }

        let mut message = format!("Model request failed: {}", error);
        if let Some(status) = error.status() {
            message.push_str(&format!(" (HTTP {})", status));
        }
        warn!(%error, "model request failed");
        self.manager.reset();
        ui.error_message(&message);
        TurnOutcome::Failed(message)
    }

    fn pipeline_failure(&mut self, message: String, ui: &dyn AgentUi) -> TurnOutcome {
        warn!(%message, "tool pipeline error");
        self.manager.reset();
        ui.system_message(&message);
        TurnOutcome::Failed(message)
    }
}

/// Part of `content` not already displayed as `shown`
fn unshown<'a>(shown: &str, content: &'a str) -> &'a str {
    let shown = shown.trim();
    if shown.is_empty() {
        return content;
    }
    content.strip_prefix(shown).map_or(content, str::trim_start)
}

/// Streamed text up to the first tool-call block
///
/// A tail that could be the start of the block sentinel is held back until
/// the next delta decides it.
#[derive(Debug, Default)]
struct VisibleText {
    text: String,
    emitted: usize,
    blocked: bool,
}

impl VisibleText {
    fn push(&mut self, delta: &str) -> Option<String> {
        self.text.push_str(delta);
        if self.blocked {
            return None;
        }

        let end = match self.text.find(TOOL_CALLS_BEGIN) {
            Some(begin) => {
                self.blocked = true;
                begin
            }
            None => self.text.len() - sentinel_prefix_len(&self.text),
        };
        if end <= self.emitted {
            return None;
        }

        let shown = self.text[self.emitted..end].to_string();
        self.emitted = end;
        Some(shown)
    }

    fn into_shown(mut self) -> String {
        self.text.truncate(self.emitted);
        self.text
    }
}

/// Length of the longest suffix of `text` that begins the block sentinel
fn sentinel_prefix_len(text: &str) -> usize {
    (1..TOOL_CALLS_BEGIN.len())
        .rev()
        .filter(|&k| TOOL_CALLS_BEGIN.is_char_boundary(k))
        .find(|&k| text.ends_with(&TOOL_CALLS_BEGIN[..k]))
        .unwrap_or(0)
}
