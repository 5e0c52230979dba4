//! Courier Control - CLI driver for a remote installation peer.
//!
//! Talks the courier frame protocol to a peer device over an already-open
//! point-to-point link and walks it through the staged installation.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use courierctl::commands;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "courierctl")]
#[command(about = "Remote installation driver for a courier peer device", long_about = None)]
#[command(version)]
struct Cli {
    /// Peer link socket path (overrides COURIER_LINK and the plan)
    #[arg(long, global = true)]
    link: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full installation procedure
    Install {
        /// Installation plan TOML file
        #[arg(long)]
        plan: Option<PathBuf>,

        /// Directory for the run journal
        #[arg(long)]
        journal_dir: Option<PathBuf>,
    },

    /// Handshake with the peer and list the disks it reports
    Detect,

    /// Query the peer's status report
    Status,

    /// Print the effective installation plan
    Plan {
        /// Installation plan TOML file
        #[arg(long)]
        plan: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Install { plan, journal_dir } => {
            commands::install(plan, cli.link, journal_dir).await
        }
        Commands::Detect => commands::detect(cli.link).await,
        Commands::Status => commands::status(cli.link).await,
        Commands::Plan { plan } => commands::plan(plan),
    }
}
