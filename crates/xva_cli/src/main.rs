//! XVA CLI - exposure simulation runs from the command line.
//!
//! # Commands
//!
//! - `xva run --config <file>` - Run the simulation and print the XVA report
//! - `xva check --config <file>` - Load and validate a run configuration
//!
//! Configuration files are TOML. Any key can be overridden from the
//! environment with the `XVA_` prefix, nested keys joined by `__`, e.g.
//! `XVA_SCENARIO_GENERATOR__SAMPLES=5000`.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod portfolio;
mod settings;

/// Monte-Carlo exposure simulation and XVA
#[derive(Parser)]
#[command(name = "xva")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true, default_value = "xva.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the simulation and print the report as JSON
    Run {
        /// Portfolio file (JSON); a demo portfolio is used if omitted
        #[arg(short, long)]
        portfolio: Option<PathBuf>,

        /// Restrict the run to these trade ids
        #[arg(short, long, value_delimiter = ',')]
        trades: Vec<String>,

        /// Record build, pricing and calibration failures instead of aborting
        #[arg(long)]
        continue_on_error: bool,

        /// Write the report to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Load and validate the configuration
    Check,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .init();

    info!(config = %cli.config.display(), "xva v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Run {
            portfolio,
            trades,
            continue_on_error,
            output,
        } => commands::run::run(
            &cli.config,
            portfolio.as_deref(),
            &trades,
            continue_on_error,
            output.as_deref(),
        ),
        Commands::Check => commands::check::run(&cli.config),
    }
}
