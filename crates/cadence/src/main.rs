//! Cadence - credential-hiding proxy for a now-playing widget
//!
//! Main entry point for the Cadence CLI.

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{config, start};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Cadence - credential-hiding proxy for a now-playing widget
#[derive(Parser)]
#[command(name = "cadence")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the proxy server
    Start(start::StartArgs),

    /// Show the resolved configuration and secret sources
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable) + rotating JSON file
    let filter = if cli.verbose {
        "cadence=debug,cadence_server=debug,cadence_llm=debug,cadence_upstream=debug,cadence_config=debug,tower_http=debug,info"
    } else {
        "cadence=info,cadence_server=info,cadence_llm=info,cadence_upstream=info,warn"
    };

    let log_dir = cadence_config::xdg_config_dir()
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| std::path::PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "cadence.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "cadence=trace,cadence_server=trace,cadence_llm=trace,cadence_upstream=trace,cadence_config=trace,info",
                )),
        )
        .init();

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Start(args) => start::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
