//! Tool manager - the tool-call pipeline coordinator
//!
//! Owns the pending queue, the in-flight call, the outstanding approval
//! request and the suppress flag. Every operation is synchronous and I/O
//! free: it updates state and returns the `ToolEffect`s the driver must
//! perform, in order.

use crate::agent::conversation::Conversation;
use crate::agent::state::{PipelineEvent, PipelineState};
use crate::errors::{AgentError, Result};
use crate::permissions::{ApprovalCoordinator, ApprovalDecision, ApprovalOutcome, ApprovalRequest, ApprovalResponse};
use crate::streaming::parser::{ParsedResponse, ResponseParser};
use crate::tools::ExecutionResult;
use crate::types::{ChatMessage, ToolCall};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Work the driver must perform on the manager's behalf
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEffect {
    /// Ask the human; answer with `on_approval_resolved`
    RequestApproval(ApprovalRequest),

    /// Run the call; report with `on_execution_complete`
    Execute(ToolCall),

    /// Show a notice in the transcript
    SystemMessage(String),

    /// Issue one tools-disabled model call; feed it to `process_response`
    RequestFollowup,
}

/// Tool-call pipeline state machine
pub struct ToolManager {
    state: PipelineState,
    queue: VecDeque<ToolCall>,
    in_flight: Option<ToolCall>,
    outstanding: Option<ApprovalRequest>,
    suppress: bool,
    parser: ResponseParser,
    coordinator: ApprovalCoordinator,
}

impl ToolManager {
    pub fn new(coordinator: ApprovalCoordinator) -> Self {
        Self::with_parser(coordinator, ResponseParser::new())
    }

    pub fn with_parser(coordinator: ApprovalCoordinator, parser: ResponseParser) -> Self {
        Self {
            state: PipelineState::Idle,
            queue: VecDeque::new(),
            in_flight: None,
            outstanding: None,
            suppress: false,
            parser,
            coordinator,
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Whether the next response will be parsed in suppressed mode
    pub fn is_suppressed(&self) -> bool {
        self.suppress
    }

    /// Calls still waiting behind the current one
    pub fn pending(&self) -> &VecDeque<ToolCall> {
        &self.queue
    }

    pub fn in_flight(&self) -> Option<&ToolCall> {
        self.in_flight.as_ref()
    }

    pub fn outstanding_request(&self) -> Option<&ApprovalRequest> {
        self.outstanding.as_ref()
    }

    pub fn coordinator(&self) -> &ApprovalCoordinator {
        &self.coordinator
    }

    /// Parse a model response
    ///
    /// With the suppress flag set this is the follow-up response: it is
    /// cleaned in suppressed mode, the flag is cleared and no calls are
    /// returned whatever the text contains.
    pub fn process_response(&mut self, text: &str) -> ParsedResponse {
        if !self.suppress {
            return self.parser.parse(text);
        }

        self.suppress = false;
        let next = match self.state.transition(PipelineEvent::FollowupConsumed) {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "suppressed response outside follow-up, returning to idle");
                PipelineState::Idle
            }
        };
        self.set_state(next);
        debug!("follow-up response consumed in suppressed mode");

        ParsedResponse {
            tool_calls: Vec::new(),
            content: self.parser.parse_suppressed(text),
            truncated: false,
        }
    }

    /// Queue a response's calls and start approval of the first
    pub fn handle_parsed_tool_calls(&mut self, calls: Vec<ToolCall>) -> Result<Vec<ToolEffect>> {
        if calls.is_empty() {
            return Ok(Vec::new());
        }

        let next = self.state.transition(PipelineEvent::CallsQueued)?;
        self.queue = calls.into();
        self.drop_undispatchable();

        if self.queue.is_empty() {
            warn!("no dispatchable tool calls in response");
            return Ok(Vec::new());
        }

        info!(count = self.queue.len(), "queued tool calls");
        self.set_state(next);
        self.begin_approval()
    }

    /// Apply the human's answer to the outstanding request
    ///
    /// A response whose id does not match the outstanding request is
    /// rejected and leaves the manager unchanged.
    pub fn on_approval_resolved(&mut self, response: &ApprovalResponse) -> Result<Vec<ToolEffect>> {
        let expected = match &self.outstanding {
            Some(request) if request.id == response.request_id => request.id,
            Some(request) => {
                return Err(AgentError::StaleApproval {
                    response_id: response.request_id.to_string(),
                    expected: request.id.to_string(),
                })
            }
            None => {
                return Err(AgentError::StaleApproval {
                    response_id: response.request_id.to_string(),
                    expected: "none".to_string(),
                })
            }
        };
        debug!(request = %expected, approved = response.approved, level = %response.level, "approval resolved");

        let request = match self.outstanding.take() {
            Some(request) => request,
            None => return Ok(Vec::new()),
        };

        match self.coordinator.resolve(&request, response) {
            ApprovalOutcome::Execute => self.approve_head().map(|effect| vec![effect]),
            ApprovalOutcome::Cancelled => self.deny_head(format!(
                "Tool call cancelled: {} was not approved.",
                request.function_name
            )),
            ApprovalOutcome::Blocked => self.deny_head(format!(
                "Tool call cancelled: {} is now blocked for this project.",
                request.function_name
            )),
        }
    }

    /// Record a finished call and move to the next one or the follow-up
    pub fn on_execution_complete(
        &mut self,
        result: &ExecutionResult,
        conversation: &mut Conversation,
    ) -> Result<Vec<ToolEffect>> {
        let call = match self.in_flight.take() {
            Some(call) => call,
            None => {
                return Err(AgentError::InvalidTransition {
                    from: format!("{:?}", self.state),
                    event: "ExecutionComplete".to_string(),
                    reason: "no tool call in flight".to_string(),
                })
            }
        };

        conversation.push(ChatMessage::assistant_tool_call(call.clone()));
        conversation.push(ChatMessage::tool_result(call.id.clone(), result.history_text()));

        let mut effects = Vec::new();
        if !result.is_success() {
            effects.push(ToolEffect::SystemMessage(format!(
                "Tool {} failed: {}",
                call.name(),
                result.error()
            )));
        }

        self.drop_undispatchable();
        if self.queue.is_empty() {
            self.set_state(self.state.transition(PipelineEvent::QueueDrained)?);
            self.suppress = true;
            effects.push(ToolEffect::RequestFollowup);
        } else {
            self.set_state(self.state.transition(PipelineEvent::NextCall)?);
            effects.extend(self.begin_approval()?);
        }
        Ok(effects)
    }

    /// Abandon all tool work (user cancellation or transport failure)
    pub fn reset(&mut self) {
        if self.state != PipelineState::Idle || !self.queue.is_empty() {
            debug!(state = ?self.state, pending = self.queue.len(), "resetting tool pipeline");
        }
        self.queue.clear();
        self.in_flight = None;
        self.outstanding = None;
        self.suppress = false;
        self.state = PipelineState::Idle;
    }

    /// Consult stored permissions for the head call
    fn begin_approval(&mut self) -> Result<Vec<ToolEffect>> {
        let head = match self.queue.front() {
            Some(call) => call.clone(),
            None => return Ok(Vec::new()),
        };

        match self.coordinator.evaluate(&head) {
            ApprovalDecision::Execute => self.approve_head().map(|effect| vec![effect]),
            ApprovalDecision::Blocked => self.deny_head(format!(
                "Tool call cancelled: {} is blocked for this project.",
                head.name()
            )),
            ApprovalDecision::Ask(request) => {
                self.outstanding = Some(request.clone());
                Ok(vec![ToolEffect::RequestApproval(request)])
            }
        }
    }

    fn approve_head(&mut self) -> Result<ToolEffect> {
        let next = self.state.transition(PipelineEvent::Approved)?;
        let call = self.queue.pop_front().ok_or_else(|| AgentError::InvalidTransition {
            from: format!("{:?}", self.state),
            event: format!("{:?}", PipelineEvent::Approved),
            reason: "approval with an empty queue".to_string(),
        })?;

        self.set_state(next);
        self.in_flight = Some(call.clone());
        Ok(ToolEffect::Execute(call))
    }

    /// Denial of the head call drops everything queued behind it
    fn deny_head(&mut self, notice: String) -> Result<Vec<ToolEffect>> {
        let next = self.state.transition(PipelineEvent::Denied)?;
        let dropped = self.queue.len();
        self.queue.clear();
        self.set_state(next);

        info!(dropped, "tool calls cancelled");
        let notice = if dropped > 1 {
            format!("{} ({} queued calls dropped)", notice, dropped)
        } else {
            notice
        };
        Ok(vec![ToolEffect::SystemMessage(notice)])
    }

    fn drop_undispatchable(&mut self) {
        while let Some(call) = self.queue.front() {
            if call.is_dispatchable() {
                break;
            }
            warn!(id = %call.id, name = %call.function.name, "dropping tool call without name or id");
            self.queue.pop_front();
        }
    }

    fn set_state(&mut self, next: PipelineState) {
        if next != self.state {
            debug!(from = ?self.state, to = ?next, "tool pipeline transition");
        }
        self.state = next;
    }
}
