//! Hooklens CLI - capture and inspect incoming webhook traffic
//!
//! Usage:
//!   hooklens watch              Start a capture session and watch requests
//!   hooklens status             Show the backend session status
//!   hooklens config             Persist default capture options

mod backend;
mod commands;
mod config;
mod feed;
mod log;
mod session;
mod tui;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "hooklens")]
#[command(version)]
#[command(about = "Capture and inspect incoming webhook traffic", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a capture session and watch requests arrive
    Watch {
        /// Port the backend should capture on
        #[arg(short, long)]
        port: Option<u16>,

        /// Request a public tunnel when the session starts
        #[arg(short, long)]
        tunnel: bool,

        /// Print requests as plain lines instead of the interactive UI
        #[arg(long)]
        plain: bool,
    },

    /// Show the backend session status
    Status {
        /// Port the backend listens on
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Persist default capture options
    Config {
        /// Default capture port
        #[arg(long)]
        port: Option<u16>,

        /// Whether new sessions request a tunnel by default
        #[arg(long)]
        tunnel: Option<bool>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("{},hooklens_cli=info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();

    // Ensure config directories exist
    config::ensure_dirs()?;

    match cli.command {
        Commands::Watch { port, tunnel, plain } => {
            let opts = commands::watch::WatchOptions { port, tunnel, plain };
            commands::watch::run(opts).await?;
        }

        Commands::Status { port } => {
            commands::status::run(port).await?;
        }

        Commands::Config { port, tunnel } => {
            commands::configure::run(port, tunnel)?;
        }
    }

    Ok(())
}
