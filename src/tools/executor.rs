//! Single-call tool executor
//!
//! Runs one approved tool call at a time and always produces an
//! `ExecutionResult`. Unknown tools, bad arguments, tool errors, timeouts,
//! cancellation and panics all come back as failure results; nothing
//! escapes as an error or unwinds into the caller.
//!
//! The tool runs on its own tokio task so a panic is caught by the runtime
//! and surfaces as a `JoinError`, and so a timed-out or cancelled tool can
//! be aborted instead of left running.

use crate::streaming::parser::strip_code_fence;
use crate::tools::registry::ToolRegistry;
use crate::tools::types::{ExecutionResult, ToolContext};
use crate::types::ToolCall;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default per-call timeout
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// Tool executor
pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    context: ToolContext,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>, context: ToolContext) -> Self {
        Self {
            registry,
            context,
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    /// Set the per-call timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Execute a call with no external cancellation
    pub async fn execute(&self, call: &ToolCall) -> ExecutionResult {
        self.execute_with_cancel(call, &CancellationToken::new()).await
    }

    /// Execute a call, aborting it if `cancel` fires first
    pub async fn execute_with_cancel(
        &self,
        call: &ToolCall,
        cancel: &CancellationToken,
    ) -> ExecutionResult {
        let start = Instant::now();
        let name = call.name();

        let tool = match self.registry.get(name) {
            Some(tool) => tool,
            None => {
                warn!(tool = name, "model called an unregistered tool");
                return ExecutionResult::failure(format!("tool {} not found", name), start.elapsed());
            }
        };

        let args = match parse_arguments(call.arguments()) {
            Ok(args) => args,
            Err(reason) => {
                return ExecutionResult::failure(
                    format!("invalid arguments for tool {}: {}", name, reason),
                    start.elapsed(),
                );
            }
        };

        info!(tool = name, call_id = %call.id, "executing tool");

        let ctx = self.context.clone();
        let mut handle = tokio::spawn(async move { tool.execute(args, &ctx).await });

        let joined = tokio::select! {
            joined = tokio::time::timeout(self.timeout, &mut handle) => Some(joined),
            _ = cancel.cancelled() => None,
        };

        let result = match joined {
            None => {
                handle.abort();
                ExecutionResult::failure("cancelled", start.elapsed())
            }
            Some(Err(_)) => {
                handle.abort();
                ExecutionResult::failure(
                    format!("timed out after {}s", self.timeout.as_secs_f64()),
                    start.elapsed(),
                )
            }
            Some(Ok(Err(join_err))) if join_err.is_panic() => ExecutionResult::failure(
                format!("panicked: {}", panic_message(join_err.into_panic())),
                start.elapsed(),
            ),
            Some(Ok(Err(join_err))) => {
                ExecutionResult::failure(format!("task failed: {}", join_err), start.elapsed())
            }
            Some(Ok(Ok(Err(e)))) => ExecutionResult::failure(e.to_string(), start.elapsed()),
            Some(Ok(Ok(Ok(output)))) => ExecutionResult::success(
                truncate_output(output, self.context.max_output_size),
                start.elapsed(),
            ),
        };

        info!(
            tool = name,
            success = result.is_success(),
            duration_ms = result.duration_ms(),
            "tool finished"
        );
        result
    }
}

/// Decode argument text into the JSON object handed to the tool
///
/// Empty and `null` argument text mean "no arguments".
pub fn parse_arguments(text: &str) -> std::result::Result<serde_json::Value, String> {
    let text = strip_code_fence(text);
    if text.is_empty() || text == "null" {
        return Ok(serde_json::json!({}));
    }

    match serde_json::from_str::<serde_json::Value>(text) {
        Ok(value @ serde_json::Value::Object(_)) => Ok(value),
        Ok(serde_json::Value::Null) => Ok(serde_json::json!({})),
        Ok(other) => Err(format!("expected a JSON object, got {}", other)),
        Err(e) => Err(e.to_string()),
    }
}

/// Cap output at `max_bytes`, cutting on a char boundary
pub fn truncate_output(mut output: String, max_bytes: usize) -> String {
    if output.len() <= max_bytes {
        return output;
    }
    let mut cut = max_bytes;
    while !output.is_char_boundary(cut) {
        cut -= 1;
    }
    let dropped = output.len() - cut;
    output.truncate(cut);
    output.push_str(&format!("\n... [output truncated, {} bytes omitted]", dropped));
    output
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{AgentError, Result};
    use crate::tools::types::Tool;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct ScriptedTool {
        name: &'static str,
    }

    #[async_trait]
    impl Tool for ScriptedTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "test tool"
        }

        fn parameters(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }

        async fn execute(&self, args: serde_json::Value, _ctx: &ToolContext) -> Result<String> {
            match self.name {
                "echo" => Ok(args.to_string()),
                "fail" => Err(AgentError::Tool("disk on fire".to_string())),
                "slow" => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok("late".to_string())
                }
                "boom" => panic!("tool exploded"),
                "big" => Ok("é".repeat(100)),
                _ => unreachable!(),
            }
        }
    }

    fn setup_executor() -> (ToolExecutor, TempDir) {
        let temp = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        for name in ["echo", "fail", "slow", "boom", "big"] {
            registry.register(Arc::new(ScriptedTool { name }));
        }
        let ctx = ToolContext::new(temp.path()).unwrap().with_max_output_size(51);
        let executor = ToolExecutor::new(Arc::new(registry), ctx)
            .with_timeout(Duration::from_millis(200));
        (executor, temp)
    }

    #[tokio::test]
    async fn test_unknown_tool_names_function() {
        let (executor, _temp) = setup_executor();
        let result = executor.execute(&ToolCall::new("call_1", "delete_repo", "{}")).await;

        assert!(!result.is_success());
        assert_eq!(result.error(), "tool delete_repo not found");
    }

    #[tokio::test]
    async fn test_success_passes_arguments() {
        let (executor, _temp) = setup_executor();
        let result = executor
            .execute(&ToolCall::new("call_1", "echo", r#"{"path":"a.go"}"#))
            .await;

        assert!(result.is_success());
        assert_eq!(result.output(), r#"{"path":"a.go"}"#);
        assert!(result.error().is_empty());
    }

    #[tokio::test]
    async fn test_null_arguments_become_empty_object() {
        let (executor, _temp) = setup_executor();

        for raw in ["null", "", "  "] {
            let result = executor.execute(&ToolCall::new("call_1", "echo", raw)).await;
            assert_eq!(result.output(), "{}");
        }
    }

    #[tokio::test]
    async fn test_malformed_arguments_fail_softly() {
        let (executor, _temp) = setup_executor();
        let result = executor.execute(&ToolCall::new("call_1", "echo", "{path: ")).await;

        assert!(!result.is_success());
        assert!(result.error().contains("invalid arguments for tool echo"));
    }

    #[tokio::test]
    async fn test_tool_error_maps_to_failure() {
        let (executor, _temp) = setup_executor();
        let result = executor.execute(&ToolCall::new("call_1", "fail", "{}")).await;

        assert!(!result.is_success());
        assert_eq!(result.error(), "disk on fire");
    }

    #[tokio::test]
    async fn test_timeout_maps_to_failure() {
        let (executor, _temp) = setup_executor();
        let result = executor.execute(&ToolCall::new("call_1", "slow", "{}")).await;

        assert!(!result.is_success());
        assert!(result.error().contains("timed out"));
    }

    #[tokio::test]
    async fn test_panic_is_caught() {
        let (executor, _temp) = setup_executor();
        let result = executor.execute(&ToolCall::new("call_1", "boom", "{}")).await;

        assert!(!result.is_success());
        assert_eq!(result.error(), "panicked: tool exploded");
    }

    #[tokio::test]
    async fn test_cancellation_aborts_tool() {
        let (executor, _temp) = setup_executor();
        let executor = executor.with_timeout(Duration::from_secs(30));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = executor
            .execute_with_cancel(&ToolCall::new("call_1", "slow", "{}"), &cancel)
            .await;
        assert_eq!(result.error(), "cancelled");
    }

    #[tokio::test]
    async fn test_output_truncated_on_char_boundary() {
        let (executor, _temp) = setup_executor();
        let result = executor.execute(&ToolCall::new("call_1", "big", "{}")).await;

        assert!(result.is_success());
        assert!(result.output().starts_with(&"é".repeat(25)));
        assert!(result.output().contains("output truncated"));
    }

    #[test]
    fn test_parse_arguments() {
        assert_eq!(parse_arguments("{\"a\":1}").unwrap()["a"], 1);
        assert_eq!(parse_arguments("```json\n{\"a\":1}\n```").unwrap()["a"], 1);
        assert!(parse_arguments("[1,2]").is_err());
        assert!(parse_arguments("not json").is_err());
    }
}
