//! Approval coordination for tool calls
//!
//! Decides whether a call may run straight away, is blocked by a stored
//! `Never`, or needs a human decision. A human decision travels as an
//! `ApprovalRequest` out to the UI and comes back as an `ApprovalResponse`
//! carrying the request's correlation id.

use crate::permissions::store::{PermissionLevel, PermissionStore};
use crate::streaming::parser::strip_code_fence;
use crate::tools::ToolRegistry;
use crate::types::ToolCall;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// A pending human decision about one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    /// Correlation id the response must echo
    pub id: Uuid,

    pub call_id: String,
    pub function_name: String,
    pub description: String,

    /// Best-effort decode of the call's argument text
    pub arguments: Map<String, Value>,

    /// Why the argument text could not be decoded, if it could not
    pub argument_warning: Option<String>,
}

/// The human's answer to an `ApprovalRequest`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalResponse {
    pub request_id: Uuid,
    pub approved: bool,
    pub level: PermissionLevel,
}

impl ApprovalResponse {
    pub fn approve(request: &ApprovalRequest, level: PermissionLevel) -> Self {
        Self {
            request_id: request.id,
            approved: true,
            level,
        }
    }

    pub fn deny(request: &ApprovalRequest) -> Self {
        Self {
            request_id: request.id,
            approved: false,
            level: PermissionLevel::Once,
        }
    }
}

/// What to do with a call before any human is asked
#[derive(Debug, Clone, PartialEq)]
pub enum ApprovalDecision {
    /// Stored `Always`: run without prompting
    Execute,

    /// Stored `Never`: do not run, do not prompt
    Blocked,

    /// Ask the human
    Ask(ApprovalRequest),
}

/// What to do with a call once the human has answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOutcome {
    Execute,
    Cancelled,
    Blocked,
}

/// Best-effort decoded arguments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodedArguments {
    pub map: Map<String, Value>,
    pub warning: Option<String>,
}

/// Decode argument text for display, never failing
///
/// Empty and `null` text decode silently to an empty map. Anything else
/// that is not a JSON object also becomes an empty map, but keeps the
/// reason so the prompt can show it.
pub fn decode_arguments(text: &str) -> DecodedArguments {
    let text = strip_code_fence(text);
    if text.is_empty() || text == "null" {
        return DecodedArguments::default();
    }

    let warning = match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => return DecodedArguments { map, warning: None },
        Ok(Value::Null) => return DecodedArguments::default(),
        Ok(_) => "arguments are not a JSON object".to_string(),
        Err(e) => format!("arguments are not valid JSON: {}", e),
    };

    warn!(%warning, "falling back to empty arguments for approval prompt");
    DecodedArguments {
        map: Map::new(),
        warning: Some(warning),
    }
}

/// Applies stored decisions and records new ones for one project
pub struct ApprovalCoordinator {
    store: Arc<dyn PermissionStore>,
    registry: Arc<ToolRegistry>,
    project: String,
}

impl ApprovalCoordinator {
    pub fn new(
        store: Arc<dyn PermissionStore>,
        registry: Arc<ToolRegistry>,
        project: impl Into<String>,
    ) -> Self {
        Self {
            store,
            registry,
            project: project.into(),
        }
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn store(&self) -> &Arc<dyn PermissionStore> {
        &self.store
    }

    /// Consult the store for a call
    ///
    /// A failed lookup is treated as "ask".
    pub fn evaluate(&self, call: &ToolCall) -> ApprovalDecision {
        let stored = match self.store.check(call.name(), &self.project) {
            Ok(level) => level,
            Err(e) => {
                warn!(tool = call.name(), error = %e, "permission lookup failed, asking instead");
                None
            }
        };

        match stored {
            Some(PermissionLevel::Always) => {
                debug!(tool = call.name(), "auto-approved by stored decision");
                ApprovalDecision::Execute
            }
            Some(PermissionLevel::Never) => {
                debug!(tool = call.name(), "auto-blocked by stored decision");
                ApprovalDecision::Blocked
            }
            Some(PermissionLevel::Once) | None => ApprovalDecision::Ask(self.build_request(call)),
        }
    }

    /// Build the request shown to the human
    pub fn build_request(&self, call: &ToolCall) -> ApprovalRequest {
        let decoded = decode_arguments(call.arguments());
        let description = self
            .registry
            .description(call.name())
            .unwrap_or_else(|| format!("Run the {} tool", call.name()));

        ApprovalRequest {
            id: Uuid::new_v4(),
            call_id: call.id.clone(),
            function_name: call.name().to_string(),
            description,
            arguments: decoded.map,
            argument_warning: decoded.warning,
        }
    }

    /// Apply the human's answer, persisting non-`Once` approvals
    ///
    /// A failed persist is logged; the current call still proceeds.
    pub fn resolve(&self, request: &ApprovalRequest, response: &ApprovalResponse) -> ApprovalOutcome {
        if !response.approved {
            return ApprovalOutcome::Cancelled;
        }

        if response.level.persists() {
            if let Err(e) = self
                .store
                .set(&request.function_name, &self.project, response.level)
            {
                warn!(tool = %request.function_name, error = %e, "failed to persist permission");
            }
        }

        match response.level {
            PermissionLevel::Never => ApprovalOutcome::Blocked,
            PermissionLevel::Once | PermissionLevel::Always => ApprovalOutcome::Execute,
        }
    }
}
