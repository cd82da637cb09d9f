//! PlayBeacon CLI - Telemetry replay and inspection
//!
//! Features:
//! - Replay recorded engine callback logs through a telemetry session
//! - Print the lifecycle transition table
//! - Show beacon retry backoff bounds

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use url::Url;

mod commands;
mod output;

/// PlayBeacon CLI - Playback telemetry toolkit
#[derive(Parser)]
#[command(name = "playbeacon")]
#[command(author = "Purple Squirrel Media")]
#[command(version)]
#[command(about = "Playback telemetry replay and inspection toolkit", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Output format (text, json)
    #[arg(short, long, default_value = "text")]
    format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines log of engine callbacks
    Replay {
        /// Callback log, one JSON object per line
        file: PathBuf,

        /// Send beacons to this collector instead of printing them
        #[arg(short, long)]
        collector: Option<Url>,

        /// Session configuration file (JSON)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Print the lifecycle transition table
    Transitions,

    /// Show retry backoff bounds
    Backoff {
        /// Number of failed attempts to show
        #[arg(short, long, default_value = "4")]
        attempts: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(level)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Replay {
            file,
            collector,
            config,
        } => {
            commands::replay(&file, collector, config, &cli.format).await?;
        }
        Commands::Transitions => {
            commands::transitions(&cli.format)?;
        }
        Commands::Backoff { attempts } => {
            commands::backoff(attempts, &cli.format)?;
        }
    }

    Ok(())
}
