//! Command-line argument parsing for deepbuddy
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use crate::cli::config::Config;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// deepbuddy - a coding assistant that can read your project, with your permission
#[derive(Parser, Debug)]
#[command(name = "deepbuddy")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Chat with a DeepSeek model that can inspect your project through approved tools", long_about = None)]
pub struct Args {
    /// Prompt to run once; starts the interactive REPL when omitted
    #[arg(value_name = "PROMPT")]
    pub prompt: Option<String>,

    /// Model name (overrides config)
    #[arg(short, long)]
    pub model: Option<String>,

    /// API base URL (overrides config)
    #[arg(long)]
    pub base_url: Option<String>,

    /// Project directory (current directory by default)
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Keep "always"/"never" decisions for this session only
    #[arg(long)]
    pub no_persist: bool,

    /// Wait for whole responses instead of streaming
    #[arg(long)]
    pub no_stream: bool,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Inspect or clear stored tool permissions for the project
    Permissions {
        #[command(subcommand)]
        action: PermissionsCommand,
    },

    /// Display current configuration
    Config,
}

/// Permission subcommands
#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionsCommand {
    /// List stored decisions
    List,

    /// Forget every stored decision
    Reset,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }

    /// Get working directory (current dir if not specified)
    pub fn working_dir(&self) -> PathBuf {
        self.cwd.clone().unwrap_or_else(|| {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        })
    }

    /// A prompt and a subcommand cannot be combined
    pub fn validate(&self) -> Result<(), String> {
        if self.command.is_some() && self.prompt.is_some() {
            return Err("Cannot specify a prompt with a subcommand.".to_string());
        }
        Ok(())
    }

    /// Apply flag overrides on top of file configuration
    pub fn apply_overrides(&self, config: &mut Config) {
        if let Some(model) = &self.model {
            config.model.model = model.clone();
        }
        if let Some(base_url) = &self.base_url {
            config.model.base_url = base_url.clone();
        }
        if self.no_persist {
            config.permissions.persist = false;
        }
        if self.no_stream {
            config.model.stream = false;
        }
    }
}

impl Verbosity {
    /// Default tracing filter; `RUST_LOG` takes precedence
    pub fn log_filter(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "error",
            Verbosity::Normal => "warn",
            Verbosity::Verbose => "info",
            Verbosity::VeryVerbose => "debug",
        }
    }

    /// Check if should show the progress spinner
    pub fn show_progress(&self) -> bool {
        !matches!(self, Verbosity::Quiet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("deepbuddy").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(parse(&["-q"]).verbosity(), Verbosity::Quiet);
        assert_eq!(parse(&[]).verbosity(), Verbosity::Normal);
        assert_eq!(parse(&["-v"]).verbosity(), Verbosity::Verbose);
        assert_eq!(parse(&["-vv"]).verbosity(), Verbosity::VeryVerbose);
    }

    #[test]
    fn test_log_filters() {
        assert_eq!(Verbosity::Quiet.log_filter(), "error");
        assert_eq!(Verbosity::Normal.log_filter(), "warn");
        assert_eq!(Verbosity::Verbose.log_filter(), "info");
        assert_eq!(Verbosity::VeryVerbose.log_filter(), "debug");
    }

    #[test]
    fn test_prompt_and_flags() {
        let args = parse(&["--model", "deepseek-coder", "--no-persist", "explain main.rs"]);
        assert_eq!(args.prompt.as_deref(), Some("explain main.rs"));
        assert_eq!(args.model.as_deref(), Some("deepseek-coder"));
        assert!(args.no_persist);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_permissions_subcommand() {
        let args = parse(&["permissions", "reset"]);
        assert_eq!(
            args.command,
            Some(Commands::Permissions {
                action: PermissionsCommand::Reset
            })
        );
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_overrides_apply_to_config() {
        let args = parse(&["--base-url", "http://localhost:8000/v1", "--no-persist", "--no-stream"]);
        let mut config = Config::default();
        args.apply_overrides(&mut config);

        assert_eq!(config.model.base_url, "http://localhost:8000/v1");
        assert_eq!(config.model.model, "deepseek-chat");
        assert!(!config.permissions.persist);
        assert!(!config.model.stream);
    }

    #[test]
    fn test_verbosity_methods() {
        assert!(!Verbosity::Quiet.show_progress());
        assert!(Verbosity::Normal.show_progress());
    }
}
