//! Vigil: service lifecycle daemon with downtime-aware reconciliation.
//!
//! # Usage
//!
//! ```text
//! vigil run
//! vigil status [--json]
//! vigil stop
//! vigil heartbeat [--json]
//! vigil plan [--json]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{heartbeat::HeartbeatArgs, plan::PlanArgs, status::StatusArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "vigil",
    version,
    about = "Start, supervise, and stop services in dependency order",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Reconcile, start every service, and run until stopped.
    Run,

    /// Show per-service state and health of the running daemon.
    Status(StatusArgs),

    /// Ask the running daemon to shut down.
    Stop,

    /// Show the last persisted heartbeat and how it would be classified.
    Heartbeat(HeartbeatArgs),

    /// Print the resolved start order without starting anything.
    Plan(PlanArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Run => commands::run::run(),
        Commands::Status(args) => args.run(),
        Commands::Stop => commands::stop::run(),
        Commands::Heartbeat(args) => args.run(),
        Commands::Plan(args) => args.run(),
    }
}
