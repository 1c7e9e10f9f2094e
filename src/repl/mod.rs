//! REPL (Read-Eval-Print Loop) module for interactive terminal experience
//!
//! Reads requests with rustyline, runs them through the turn runner, and
//! answers the runner's approval requests at the terminal. Ctrl-C during a
//! turn cancels it; Ctrl-C at the prompt just clears the line.

pub mod commands;
pub mod display;
pub mod input;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::agent::{AgentUi, TurnOutcome, TurnRunner};
use crate::permissions::{ApprovalRequest, ApprovalResponse};
use crate::repl::commands::{format_permissions, help_text, is_command, Command};
pub use crate::repl::display::DisplayManager;
use crate::repl::display::approval_prompt;
use crate::repl::input::{parse_approval, ApprovalChoice, Input, InputHandler};
use crate::types::ToolCall;

/// Terminal front-end for the turn runner
pub struct TerminalUi {
    display: DisplayManager,
    input: Arc<Mutex<InputHandler>>,

    /// Token of the turn in progress; approval Ctrl-C cancels it
    cancel: Mutex<CancellationToken>,

    /// Streamed text is on the current line
    mid_line: AtomicBool,
}

impl TerminalUi {
    pub fn new(input: Arc<Mutex<InputHandler>>, display: DisplayManager) -> Self {
        Self {
            display,
            input,
            cancel: Mutex::new(CancellationToken::new()),
            mid_line: AtomicBool::new(false),
        }
    }

    pub fn display(&self) -> &DisplayManager {
        &self.display
    }

    /// Prepare for a turn that `cancel` can abort
    pub fn begin_turn(&self, cancel: CancellationToken) {
        if let Ok(mut slot) = self.cancel.lock() {
            *slot = cancel;
        }
        self.display.start_spinner("Thinking...");
    }

    pub fn end_turn(&self) {
        self.display.stop_spinner();
        self.close_line();
    }

    fn cancel_turn(&self) {
        if let Ok(slot) = self.cancel.lock() {
            slot.cancel();
        }
    }

    /// End a line of streamed text before printing anything else
    fn close_line(&self) {
        if self.mid_line.swap(false, Ordering::SeqCst) {
            println!();
        }
    }

    async fn read_approval(&self) -> Result<Input> {
        let input = self.input.clone();
        let prompt = approval_prompt();
        tokio::task::spawn_blocking(move || {
            input
                .lock()
                .map_err(|_| anyhow::anyhow!("input handler lock poisoned"))?
                .read_approval(&prompt)
        })
        .await?
    }
}

#[async_trait]
impl AgentUi for TerminalUi {
    async fn request_approval(&self, request: &ApprovalRequest) -> ApprovalResponse {
        self.display.stop_spinner();
        self.close_line();
        self.display.show_approval(request);

        loop {
            match self.read_approval().await {
                Ok(Input::Line(answer)) => match parse_approval(&answer) {
                    Some(ApprovalChoice::Approve(level)) => {
                        return ApprovalResponse::approve(request, level)
                    }
                    Some(ApprovalChoice::Deny) => return ApprovalResponse::deny(request),
                    None => self.display.show_warning("Please answer y, a, n or N."),
                },
                Ok(Input::Interrupted) | Ok(Input::Eof) => {
                    debug!("approval prompt interrupted");
                    self.cancel_turn();
                    return ApprovalResponse::deny(request);
                }
                Err(e) => {
                    warn!(error = %e, "failed to read approval answer");
                    self.display.show_error(&format!("Could not read answer: {}", e));
                    return ApprovalResponse::deny(request);
                }
            }
        }
    }

    fn assistant_delta(&self, delta: &str) {
        self.display.stop_spinner();
        let delta = if self.mid_line.load(Ordering::SeqCst) {
            delta
        } else {
            delta.trim_start()
        };
        if delta.is_empty() {
            return;
        }
        self.mid_line.store(true, Ordering::SeqCst);
        self.display.stream_token(delta);
    }

    fn assistant_message(&self, text: &str) {
        self.display.stop_spinner();
        if self.mid_line.swap(false, Ordering::SeqCst) {
            println!();
        }
        if !text.is_empty() {
            self.display.show_assistant(text);
        }
    }

    fn system_message(&self, text: &str) {
        self.display.stop_spinner();
        self.close_line();
        self.display.show_system(text);
    }

    fn error_message(&self, text: &str) {
        self.display.stop_spinner();
        self.close_line();
        self.display.show_error(text);
    }

    fn tool_started(&self, call: &ToolCall) {
        self.close_line();
        self.display.show_tool_started(call);
        self.display.start_spinner(&format!("Running {}...", call.name()));
    }
}

/// REPL session coordinator
pub struct ReplSession {
    input: Arc<Mutex<InputHandler>>,
    ui: TerminalUi,
    runner: TurnRunner,
}

impl ReplSession {
    pub fn new(runner: TurnRunner, show_progress: bool) -> Result<Self> {
        let input = Arc::new(Mutex::new(InputHandler::new()?));
        let ui = TerminalUi::new(input.clone(), DisplayManager::with_progress(show_progress));
        Ok(Self { input, ui, runner })
    }

    /// Show welcome banner
    pub fn show_welcome(&self, version: &str, model: &str) {
        let project = self.runner.manager().coordinator().project().to_string();
        self.ui.display().show_banner(version, model, &project);
    }

    /// Run one request, with Ctrl-C cancelling it
    pub async fn run_once(&mut self, prompt: &str) -> TurnOutcome {
        let cancel = CancellationToken::new();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            })
        };

        self.ui.begin_turn(cancel.clone());
        let outcome = self.runner.run_turn(prompt, &self.ui, &cancel).await;
        self.ui.end_turn();
        watcher.abort();

        debug!(?outcome, "turn finished");
        outcome
    }

    /// Read-eval-print until /exit or Ctrl-D
    pub async fn run(&mut self) -> Result<()> {
        loop {
            let input = self.input.clone();
            let line = tokio::task::spawn_blocking(move || {
                input
                    .lock()
                    .map_err(|_| anyhow::anyhow!("input handler lock poisoned"))?
                    .read_line()
            })
            .await??;

            let line = match line {
                Input::Line(line) => line,
                Input::Interrupted => continue,
                Input::Eof => break,
            };

            if line.is_empty() {
                continue;
            }
            if is_command(&line) {
                if !self.handle_command(commands::parse(&line)) {
                    break;
                }
                continue;
            }

            self.run_once(&line).await;
        }

        println!("Goodbye!");
        Ok(())
    }

    /// Perform a slash command; false means exit
    pub fn handle_command(&mut self, command: Command) -> bool {
        let display = self.ui.display();
        match command {
            Command::Help => println!("{}", help_text()),
            Command::Exit => return false,
            Command::Reset => {
                self.runner.reset_conversation();
                display.show_info("Conversation reset.");
            }
            Command::Permissions => {
                let coordinator = self.runner.manager().coordinator();
                match coordinator.store().list(coordinator.project()) {
                    Ok(records) => println!("{}", format_permissions(coordinator.project(), &records)),
                    Err(e) => display.show_error(&e.to_string()),
                }
            }
            Command::Clear => display.clear_screen(),
            Command::Unknown { input } => {
                display.show_warning(&format!("Unknown command: {}", input));
                println!("Type /help for available commands");
            }
        }
        true
    }

    pub fn runner(&self) -> &TurnRunner {
        &self.runner
    }
}
