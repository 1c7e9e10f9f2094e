//! Input handler for REPL using rustyline
//!
//! Line editing with in-session history for prompts, plus the single-key
//! answers of the approval prompt.

use crate::permissions::PermissionLevel;
use anyhow::Result;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

/// Prompt shown for user requests
pub const DEFAULT_PROMPT: &str = "deepbuddy> ";

/// One read from the terminal
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Line(String),
    /// Ctrl-C
    Interrupted,
    /// Ctrl-D
    Eof,
}

/// Answer to an approval prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalChoice {
    Approve(PermissionLevel),
    Deny,
}

/// Parse an approval answer: `y` once, `a` always, `n` deny, `N` never
///
/// `n` and `N` differ only by case, so only they are case-sensitive.
pub fn parse_approval(answer: &str) -> Option<ApprovalChoice> {
    match answer.trim() {
        "y" | "Y" | "yes" => Some(ApprovalChoice::Approve(PermissionLevel::Once)),
        "a" | "A" | "always" => Some(ApprovalChoice::Approve(PermissionLevel::Always)),
        "n" | "no" => Some(ApprovalChoice::Deny),
        "N" | "never" => Some(ApprovalChoice::Approve(PermissionLevel::Never)),
        _ => None,
    }
}

/// Input handler managing the readline interface
pub struct InputHandler {
    editor: DefaultEditor,
    prompt: String,
}

impl InputHandler {
    pub fn new() -> Result<Self> {
        Ok(InputHandler {
            editor: DefaultEditor::new()?,
            prompt: DEFAULT_PROMPT.to_string(),
        })
    }

    /// Read a request line, recording non-empty lines in history
    pub fn read_line(&mut self) -> Result<Input> {
        let prompt = self.prompt.clone();
        let input = self.read_with(&prompt)?;
        if let Input::Line(line) = &input {
            if !line.is_empty() {
                let _ = self.editor.add_history_entry(line.as_str());
            }
        }
        Ok(input)
    }

    /// Read one approval answer; not recorded in history
    pub fn read_approval(&mut self, prompt: &str) -> Result<Input> {
        self.read_with(prompt)
    }

    fn read_with(&mut self, prompt: &str) -> Result<Input> {
        match self.editor.readline(prompt) {
            Ok(line) => Ok(Input::Line(line.trim().to_string())),
            Err(ReadlineError::Interrupted) => Ok(Input::Interrupted),
            Err(ReadlineError::Eof) => Ok(Input::Eof),
            Err(err) => Err(anyhow::anyhow!("Readline error: {}", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_approval_keys() {
        assert_eq!(parse_approval("y"), Some(ApprovalChoice::Approve(PermissionLevel::Once)));
        assert_eq!(parse_approval(" a "), Some(ApprovalChoice::Approve(PermissionLevel::Always)));
        assert_eq!(parse_approval("n"), Some(ApprovalChoice::Deny));
        assert_eq!(parse_approval("N"), Some(ApprovalChoice::Approve(PermissionLevel::Never)));
        assert_eq!(parse_approval("never"), Some(ApprovalChoice::Approve(PermissionLevel::Never)));
        assert_eq!(parse_approval(""), None);
        assert_eq!(parse_approval("maybe"), None);
    }

    #[test]
    fn test_input_handler_creation() {
        let handler = InputHandler::new();
        assert!(handler.is_ok());
    }

    #[test]
    fn test_default_prompt() {
        let handler = InputHandler::new().unwrap();
        assert_eq!(handler.prompt, DEFAULT_PROMPT);
    }
}
