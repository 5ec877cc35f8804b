//! ShellRelay CLI - Main entry point

mod protocol;
mod run;
mod server;

use anyhow::Context;
use clap::{Parser, Subcommand};
use relay_foundation::{JsonStore, RelayConfig, SurfaceKind, RELAY_CONFIG_FILE};
use relay_task::{TaskManager, TaskStatus};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ShellRelay - run long commands in the background and poll them
#[derive(Parser, Debug)]
#[command(name = "relay")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Execution surface (pty, process)
    #[arg(long)]
    surface: Option<String>,

    /// Shell used to interpret commands
    #[arg(long)]
    shell: Option<String>,

    /// Load configuration from this file instead of the global/project files
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// How long to wait for a channel to become ready
    #[arg(long)]
    readiness_timeout_ms: Option<u64>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer JSON requests on stdin, one per line (default)
    Serve,
    /// Run a single command and follow its output
    Run {
        /// Command to run
        #[arg(required = true, trailing_var_arg = true)]
        command: Vec<String>,

        /// Working directory for the command
        #[arg(long)]
        cwd: Option<String>,

        /// Status poll interval
        #[arg(long, default_value = "200")]
        poll_ms: u64,
    },
    /// Write the effective configuration to ./.shellrelay/relay.json
    Init {
        /// Overwrite an existing project configuration
        #[arg(short, long)]
        force: bool,
    },
}

fn load_config(args: &Args) -> anyhow::Result<RelayConfig> {
    let mut config = match &args.config {
        Some(path) => RelayConfig::load_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => RelayConfig::load()?,
    };

    if let Some(surface) = &args.surface {
        config.surface = SurfaceKind::parse(surface)
            .with_context(|| format!("unknown surface '{}'", surface))?;
    }
    if let Some(shell) = &args.shell {
        config.shell = Some(shell.clone());
    }
    if let Some(ms) = args.readiness_timeout_ms {
        config.readiness_timeout_ms = ms;
    }

    config.validate()?;
    Ok(config)
}

fn init_project(config: &RelayConfig, force: bool) -> anyhow::Result<()> {
    let store = JsonStore::current_project()?;
    if store.contains(RELAY_CONFIG_FILE) && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            store.path_of(RELAY_CONFIG_FILE).display()
        );
    }

    config.save_project()?;
    println!("Wrote {}", store.path_of(RELAY_CONFIG_FILE).display());
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        // No signal handler; never resolve
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (stdout is reserved for protocol output)
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let config = load_config(&args)?;
    if let Some(Command::Init { force }) = args.command {
        return init_project(&config, force);
    }

    info!(
        "ShellRelay {} using {} surface",
        env!("CARGO_PKG_VERSION"),
        config.surface
    );
    let manager = TaskManager::from_config(&config);

    match args.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let stdin = BufReader::new(tokio::io::stdin());
            tokio::select! {
                result = server::serve(&manager, stdin, tokio::io::stdout()) => result?,
                _ = shutdown_signal() => info!("Interrupted; shutting down"),
            }
            Ok(())
        }
        Command::Run {
            command,
            cwd,
            poll_ms,
        } => {
            let status = run::run_once(
                &manager,
                &command.join(" "),
                cwd.as_deref(),
                Duration::from_millis(poll_ms.max(1)),
                tokio::io::stdout(),
                shutdown_signal(),
            )
            .await?;

            std::process::exit(if status == TaskStatus::Completed { 0 } else { 1 });
        }
        Command::Init { .. } => Ok(()),
    }
}
