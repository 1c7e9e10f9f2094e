//! Display manager for REPL terminal UI
//!
//! Line-oriented, color-coded output plus a spinner while waiting on the
//! model or a tool.

use crate::permissions::ApprovalRequest;
use crate::types::ToolCall;
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::sync::Mutex;
use std::time::Duration;

/// Spinner refresh interval (10 FPS)
const SPINNER_TICK: Duration = Duration::from_millis(100);

/// Display manager for REPL UI
pub struct DisplayManager {
    spinner: Mutex<Option<ProgressBar>>,
    show_progress: bool,
}

impl DisplayManager {
    pub fn new() -> Self {
        Self::with_progress(true)
    }

    /// Create display manager; `show_progress = false` disables the spinner
    pub fn with_progress(show_progress: bool) -> Self {
        DisplayManager {
            spinner: Mutex::new(None),
            show_progress,
        }
    }

    /// Show welcome banner
    pub fn show_banner(&self, version: &str, model: &str, project: &str) {
        let width = 64;
        let rule = "=".repeat(width);
        let title = format!("  deepbuddy {} - Coding Assistant", version);
        let info = format!("  Model: {} | Project: {}", model, project);

        println!("\n{}", rule.cyan());
        println!("{}", title.bold().cyan());
        println!("{}", info.dimmed());
        println!("{}\n", rule.cyan());
        println!(
            "Type your request (or {} for commands, {} to quit)\n",
            "/help".green(),
            "/exit".green()
        );
    }

    /// Start a spinner with a message, replacing any running one
    pub fn start_spinner(&self, message: &str) {
        if !self.show_progress {
            return;
        }
        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg}") {
            pb.set_style(style);
        }
        pb.set_message(message.to_string());
        pb.enable_steady_tick(SPINNER_TICK);

        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(previous) = slot.replace(pb) {
                previous.finish_and_clear();
            }
        }
    }

    /// Clear the spinner if one is running
    pub fn stop_spinner(&self) {
        if let Ok(mut slot) = self.spinner.lock() {
            if let Some(pb) = slot.take() {
                pb.finish_and_clear();
            }
        }
    }

    pub fn is_spinning(&self) -> bool {
        self.spinner.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }

    /// Display streaming tokens
    pub fn stream_token(&self, token: &str) {
        print!("{}", token);
        let _ = io::stdout().flush();
    }

    /// Display assistant text
    pub fn show_assistant(&self, text: &str) {
        println!("{}", text);
    }

    /// Display a pipeline notice
    pub fn show_system(&self, message: &str) {
        println!("{} {}", "•".yellow(), message.yellow());
    }

    /// Display error message
    pub fn show_error(&self, error: &str) {
        println!("{} {}", "Error:".red().bold(), error.red());
    }

    /// Display warning message
    pub fn show_warning(&self, warning: &str) {
        println!("{} {}", "Warning:".yellow().bold(), warning.yellow());
    }

    /// Display info message
    pub fn show_info(&self, info: &str) {
        println!("{} {}", "Info:".cyan(), info);
    }

    /// Announce a tool run
    pub fn show_tool_started(&self, call: &ToolCall) {
        println!("{} {} {}", "→".cyan(), "Running".dimmed(), call.name().bold());
    }

    /// Display an approval request
    pub fn show_approval(&self, request: &ApprovalRequest) {
        println!("{}", format_approval(request));
    }

    /// Clear screen
    pub fn clear_screen(&self) {
        print!("\x1B[2J\x1B[1;1H");
        let _ = io::stdout().flush();
    }
}

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Approval prompt body: tool, description, arguments, any warning
pub fn format_approval(request: &ApprovalRequest) -> String {
    let mut text = format!(
        "\n{} {}\n  {}\n",
        "Tool request:".bold().yellow(),
        request.function_name.bold(),
        request.description.dimmed()
    );

    if request.arguments.is_empty() {
        text.push_str(&format!("  {}\n", "(no arguments)".dimmed()));
    } else {
        let pretty = serde_json::to_string_pretty(&request.arguments)
            .unwrap_or_else(|_| format!("{:?}", request.arguments));
        for line in pretty.lines() {
            text.push_str(&format!("  {}\n", line));
        }
    }

    if let Some(warning) = &request.argument_warning {
        text.push_str(&format!("  {} {}\n", "Warning:".yellow().bold(), warning.yellow()));
    }
    text
}

/// Prompt line for the approval answer
pub fn approval_prompt() -> String {
    format!(
        "Allow? [{}]es once / [{}]lways / [{}]o / [{}]ever: ",
        "y".green(),
        "a".green(),
        "n".red(),
        "N".red()
    )
}
