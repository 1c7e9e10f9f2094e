//! Tool-call pipeline state machine
//!
//! A deterministic finite state machine over one turn's tool calls:
//! - Safety: at most one call awaiting approval or executing
//! - Liveness: every path returns to Idle
//! - Determinism: unique next state per (state, event)

use crate::errors::{AgentError, Result};
use serde::{Deserialize, Serialize};

/// Pipeline states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    /// No tool work in progress
    Idle,

    /// Head call is waiting for a human (or stored) decision
    AwaitingApproval,

    /// Approved call is running
    Executing,

    /// Queue drained; waiting for the tools-disabled follow-up response
    FollowupPending,
}

/// Events that trigger state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineEvent {
    /// Parsed calls replaced the queue
    CallsQueued,

    /// Head call approved (by the human or a stored `Always`)
    Approved,

    /// Head call denied or blocked; queue cleared
    Denied,

    /// Execution finished and another call is queued
    NextCall,

    /// Execution finished and the queue is empty
    QueueDrained,

    /// Follow-up response processed in suppressed mode
    FollowupConsumed,

    /// User cancellation or transport failure
    Reset,
}

impl PipelineState {
    /// Attempt state transition with validation
    ///
    /// Valid transitions:
    /// 1. Idle             → AwaitingApproval (on: CallsQueued)
    /// 2. AwaitingApproval → Executing        (on: Approved)
    /// 3. AwaitingApproval → Idle             (on: Denied)
    /// 4. Executing        → AwaitingApproval (on: NextCall)
    /// 5. Executing        → FollowupPending  (on: QueueDrained)
    /// 6. FollowupPending  → Idle             (on: FollowupConsumed)
    /// 7. \*               → Idle             (on: Reset)
    pub fn transition(&self, event: PipelineEvent) -> Result<PipelineState> {
        use PipelineEvent::*;
        use PipelineState::*;

        if event == Reset {
            return Ok(Idle);
        }

        let next_state = match (self, event) {
            (Idle, CallsQueued) => AwaitingApproval,
            (AwaitingApproval, Approved) => Executing,
            (AwaitingApproval, Denied) => Idle,
            (Executing, NextCall) => AwaitingApproval,
            (Executing, QueueDrained) => FollowupPending,
            (FollowupPending, FollowupConsumed) => Idle,

            (from, event) => {
                return Err(AgentError::InvalidTransition {
                    from: format!("{:?}", from),
                    event: format!("{:?}", event),
                    reason: format!("No valid transition from {:?} on {:?}", from, event),
                });
            }
        };

        Ok(next_state)
    }

    /// Get all valid events from this state
    pub fn valid_events(&self) -> Vec<PipelineEvent> {
        use PipelineEvent::*;
        use PipelineState::*;

        match self {
            Idle => vec![CallsQueued, Reset],
            AwaitingApproval => vec![Approved, Denied, Reset],
            Executing => vec![NextCall, QueueDrained, Reset],
            FollowupPending => vec![FollowupConsumed, Reset],
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        PipelineState::Idle
    }
}
