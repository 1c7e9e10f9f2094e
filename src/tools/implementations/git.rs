//! Git tool implementations
//!
//! - git_diff: Show uncommitted changes in the project repository
//!
//! Runs the `git` binary directly with an argv array (no shell).

use crate::errors::{AgentError, Result};
use crate::tools::types::{Tool, ToolContext};
use async_trait::async_trait;
use serde_json::json;
use tokio::process::Command;

/// Show `git diff` output for the project
pub struct GitDiffTool;

#[async_trait]
impl Tool for GitDiffTool {
    fn name(&self) -> &str {
        "git_diff"
    }

    fn description(&self) -> &str {
        "Show uncommitted changes in the project's git repository"
    }

    fn parameters(&self) -> serde_json::Value {
        json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Limit the diff to this file or directory"
                },
                "staged": {
                    "type": "boolean",
                    "description": "Show staged changes instead of the working tree",
                    "default": false
                }
            }
        })
    }

    async fn execute(&self, args: serde_json::Value, ctx: &ToolContext) -> Result<String> {
        let staged = args["staged"].as_bool().unwrap_or(false);

        let mut cmd = Command::new("git");
        cmd.arg("diff").arg("--no-color");
        if staged {
            cmd.arg("--cached");
        }
        if let Some(path) = args["path"].as_str().filter(|p| !p.trim().is_empty()) {
            let verified = ctx.resolve(path)?;
            cmd.arg("--").arg(verified);
        }
        cmd.current_dir(ctx.working_dir()).kill_on_drop(true);

        let output = cmd
            .output()
            .await
            .map_err(|e| AgentError::Tool(format!("failed to run git: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AgentError::Tool(format!(
                "git diff exited with code {}: {}",
                output.status.code().unwrap_or(-1),
                stderr.trim()
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if stdout.trim().is_empty() {
            return Ok("No changes.".to_string());
        }
        Ok(stdout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::process::Command as StdCommand;
    use tempfile::TempDir;

    fn git(dir: &std::path::Path, args: &[&str]) -> bool {
        StdCommand::new("git")
            .args(args)
            .current_dir(dir)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    #[tokio::test]
    async fn test_outside_repository_is_error() {
        let temp = TempDir::new().unwrap();
        let ctx = ToolContext::new(temp.path()).unwrap();

        // Fails either because git is missing or because this is not a repo
        let result = GitDiffTool.execute(json!({}), &ctx).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_diff_shows_changes() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path();
        if !git(dir, &["init", "-q"]) {
            return;
        }
        git(dir, &["config", "user.email", "dev@example.com"]);
        git(dir, &["config", "user.name", "dev"]);
        fs::write(dir.join("a.txt"), "one\n").unwrap();
        git(dir, &["add", "a.txt"]);
        git(dir, &["commit", "-q", "-m", "init"]);

        let ctx = ToolContext::new(dir).unwrap();
        let clean = GitDiffTool.execute(json!({}), &ctx).await.unwrap();
        assert_eq!(clean, "No changes.");

        fs::write(dir.join("a.txt"), "two\n").unwrap();
        let diff = GitDiffTool.execute(json!({"path": "a.txt"}), &ctx).await.unwrap();
        assert!(diff.contains("-one"));
        assert!(diff.contains("+two"));
    }
}
