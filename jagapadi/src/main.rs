//! jagapadi - paddy pest detection client
//!
//! Command-line front end for the detection workflow. Each command builds one
//! [`DetectionOrchestrator`], forwards the user's intent to it and prints what
//! comes back. No workflow or validation logic lives here.
//!
//! Uses XDG Base Directory specification for file locations:
//! - Config: $XDG_CONFIG_HOME/jagapadi/config.toml (~/.config/jagapadi/config.toml)
//! - History and preferences: $XDG_DATA_HOME/jagapadi/ (~/.local/share/jagapadi/)
//! - Logs: $XDG_STATE_HOME/jagapadi/ (~/.local/state/jagapadi/)

mod commands;
mod observe;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use jagapadi_core::{Config, DetectionOrchestrator};

#[derive(Parser)]
#[command(name = "jagapadi")]
#[command(about = "Detect paddy pests with a remote detection service")]
#[command(version)]
struct Args {
    /// Print workflow and connection changes, and warnings, to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show service connection status and today's stats
    Status,

    /// Authenticate with the detection service
    Connect {
        /// Service password
        #[arg(short, long, env = "JAGAPADI_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// End the session with the detection service
    Disconnect,

    /// Analyze an image
    Detect {
        /// Image file to analyze
        image: PathBuf,

        /// Connect with this password first
        #[arg(short, long, env = "JAGAPADI_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Analyze the image of a previous detection again
    Rerun {
        /// Record id (as shown by `history`)
        id: String,

        /// Connect with this password first
        #[arg(short, long, env = "JAGAPADI_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// List past detections, most recent first
    History {
        /// Show at most this many records
        #[arg(short, long)]
        limit: Option<usize>,
    },

    /// Print or export the report for one detection
    Report {
        /// Record id (as shown by `history`)
        id: String,

        /// Write the report to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Show today's detection totals
    Stats,

    /// Delete all detection history
    ClearHistory,

    /// Show or set the preferred theme
    Theme {
        /// New theme
        #[arg(value_enum)]
        theme: Option<Theme>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Theme {
    Light,
    Dark,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = jagapadi_core::logging::init(&config.logging, args.verbose)
        .context("failed to initialize logging")?;

    let orchestrator =
        DetectionOrchestrator::from_config(&config).context("failed to set up detection client")?;

    let observers = args.verbose.then(|| observe::spawn(&orchestrator));

    tracing::debug!(base_url = %config.service.base_url, "jagapadi starting");

    let outcome = run(args.command, &orchestrator, &config).await;

    // Closing the channels lets the observers print what is left and stop.
    drop(orchestrator);
    if let Some(observers) = observers {
        observers.finish().await;
    }

    outcome
}

async fn run(command: Command, orchestrator: &DetectionOrchestrator, config: &Config) -> Result<()> {
    match command {
        Command::Status => commands::status(orchestrator, config).await,
        Command::Connect { password } => commands::connect(orchestrator, password).await,
        Command::Disconnect => commands::disconnect(orchestrator).await,
        Command::Detect { image, password } => {
            commands::detect(orchestrator, &image, password).await
        }
        Command::Rerun { id, password } => commands::rerun(orchestrator, &id, password).await,
        Command::History { limit } => commands::history(orchestrator, limit).await,
        Command::Report { id, output } => commands::report(orchestrator, &id, output).await,
        Command::Stats => commands::stats(orchestrator).await,
        Command::ClearHistory => commands::clear_history(orchestrator).await,
        Command::Theme { theme } => {
            commands::theme(config, theme.map(|t| matches!(t, Theme::Dark)))
        }
    }
}
