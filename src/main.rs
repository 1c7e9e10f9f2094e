//! deepbuddy - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use deepbuddy::agent::{Conversation, ToolManager, TurnOutcome, TurnRunner, DEFAULT_SYSTEM_PROMPT};
use deepbuddy::cli::{Args, Commands, Config, PermissionsCommand, Verbosity};
use deepbuddy::permissions::{
    ApprovalCoordinator, FilePermissionStore, MemoryPermissionStore, PermissionStore,
};
use deepbuddy::repl::ReplSession;
use deepbuddy::repl::commands::format_permissions;
use deepbuddy::streaming::HttpModelClient;
use deepbuddy::tools::{ToolContext, ToolExecutor, ToolRegistry};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    if let Err(message) = args.validate() {
        eprintln!("{} {}", "Error:".red().bold(), message);
        std::process::exit(2);
    }

    init_logging(args.verbosity());

    let mut config = Config::load(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply_overrides(&mut config);
    config.validate().context("Invalid configuration")?;

    let project_dir = args.working_dir();
    let project_dir = project_dir
        .canonicalize()
        .with_context(|| format!("Project directory {} is not accessible", project_dir.display()))?;
    let project = project_dir.to_string_lossy().to_string();
    debug!(%project, "resolved project directory");

    let store = open_store(&config)?;

    match &args.command {
        Some(Commands::Config) => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Some(Commands::Permissions { action }) => run_permissions(*action, store.as_ref(), &project),
        None => run_agent(&args, &config, store, &project_dir, &project).await,
    }
}

/// Install the stderr subscriber; `RUST_LOG` overrides the verbosity flags
fn init_logging(verbosity: Verbosity) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("deepbuddy={}", verbosity.log_filter())));

    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn open_store(config: &Config) -> Result<Arc<dyn PermissionStore>> {
    if !config.permissions.persist {
        info!("permission decisions will not be persisted");
        return Ok(Arc::new(MemoryPermissionStore::new()));
    }

    let path = config.permissions_path();
    let store = FilePermissionStore::open(&path)
        .with_context(|| format!("Failed to open permission store {}", path.display()))?;
    Ok(Arc::new(store))
}

fn run_permissions(action: PermissionsCommand, store: &dyn PermissionStore, project: &str) -> Result<()> {
    match action {
        PermissionsCommand::List => {
            let records = store.list(project)?;
            print!("{}", format_permissions(project, &records));
            if records.is_empty() {
                println!();
            }
        }
        PermissionsCommand::Reset => {
            let removed = store.reset(project)?;
            println!("Removed {} stored permission(s) for {}.", removed, project);
        }
    }
    Ok(())
}

async fn run_agent(
    args: &Args,
    config: &Config,
    store: Arc<dyn PermissionStore>,
    project_dir: &Path,
    project: &str,
) -> Result<()> {
    let registry = Arc::new(ToolRegistry::with_builtin_tools());
    let context = ToolContext::new(project_dir)?.with_max_output_size(config.tools.max_output_bytes);
    let executor = ToolExecutor::new(registry.clone(), context).with_timeout(config.tool_timeout());

    let coordinator = ApprovalCoordinator::new(store, registry, project);
    let manager = ToolManager::new(coordinator);

    let system_prompt = config
        .conversation
        .system_prompt
        .clone()
        .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
    let conversation = Conversation::with_capacity(system_prompt, config.conversation.max_messages);

    let client = Arc::new(HttpModelClient::from_config(&config.model)?);
    let runner = TurnRunner::new(client, executor, manager, conversation)
        .with_streaming(config.model.stream);

    let verbosity = args.verbosity();
    let mut session = ReplSession::new(runner, verbosity.show_progress())?;

    match &args.prompt {
        Some(prompt) => match session.run_once(prompt).await {
            TurnOutcome::Failed(_) => std::process::exit(1),
            TurnOutcome::Completed | TurnOutcome::Cancelled => Ok(()),
        },
        None => {
            session.show_welcome(env!("CARGO_PKG_VERSION"), &config.model.model);
            session.run().await
        }
    }
}
