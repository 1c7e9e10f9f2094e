//! Built-in REPL commands
//!
//! Slash commands are parsed here; the session performs them since they
//! touch the conversation and the permission store.

use crate::permissions::PermissionRecord;
use colored::*;

/// REPL command types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Exit,
    /// Forget the conversation, keep the system prompt
    Reset,
    /// Show stored tool decisions for this project
    Permissions,
    Clear,
    Unknown { input: String },
}

/// Check if input is a slash command
pub fn is_command(input: &str) -> bool {
    input.trim_start().starts_with('/')
}

/// Parse input string into a command
pub fn parse(input: &str) -> Command {
    let trimmed = input.trim();
    let name = trimmed
        .strip_prefix('/')
        .and_then(|rest| rest.split_whitespace().next())
        .map(str::to_lowercase);

    match name.as_deref() {
        Some("help") | Some("h") => Command::Help,
        Some("exit") | Some("quit") | Some("q") => Command::Exit,
        Some("reset") => Command::Reset,
        Some("permissions") | Some("perms") => Command::Permissions,
        Some("clear") | Some("cls") => Command::Clear,
        _ => Command::Unknown {
            input: trimmed.to_string(),
        },
    }
}

/// Help text for the REPL
pub fn help_text() -> String {
    let commands = [
        ("/help, /h", "Show this help message"),
        ("/reset", "Start a fresh conversation"),
        ("/permissions", "Show stored tool decisions for this project"),
        ("/clear, /cls", "Clear screen"),
        ("/exit, /quit, /q", "Exit REPL"),
    ];

    let mut text = format!("\n{}\n{}\n", "Available Commands:".bold().cyan(), "=".repeat(60).cyan());
    for (cmd, desc) in commands {
        text.push_str(&format!("  {:<20} {}\n", cmd.green(), desc));
    }
    text.push_str(&format!("\n{}\n", "Usage:".bold()));
    text.push_str("  - Type your request directly (no / prefix)\n");
    text.push_str(&format!(
        "  - Approve tools with {} once, {} always, {} deny, {} never\n",
        "y".cyan(),
        "a".cyan(),
        "n".cyan(),
        "N".cyan()
    ));
    text.push_str(&format!("  - Press {} to cancel a running request\n", "Ctrl-C".cyan()));
    text.push_str(&format!("  - Press {} or type {} to exit\n", "Ctrl-D".cyan(), "/exit".cyan()));
    text
}

/// Table of stored decisions
pub fn format_permissions(project: &str, records: &[(String, PermissionRecord)]) -> String {
    if records.is_empty() {
        return format!("No stored tool permissions for {}.", project);
    }

    let mut text = format!("Stored tool permissions for {}:\n", project);
    for (function, record) in records {
        text.push_str(&format!(
            "  {:<16} {:<8} {}\n",
            function,
            record.level.to_string(),
            record.updated_at.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    text
}
