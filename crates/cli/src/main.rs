//! RenderGrid CLI - Main Entry Point
//!
//! Drives the render-job orchestrator against an in-memory grid and
//! manages grid configuration files.

use clap::{Parser, Subcommand};
use rendergrid_cli::commands::{config, simulate};
use rendergrid_cli::output::{self, print_status, Status};
use rendergrid_common::GridConfig;
use std::path::PathBuf;

/// RenderGrid CLI - Cross-Browser Render Job Orchestration
#[derive(Parser)]
#[command(name = "rendergrid")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Grid configuration file
    #[arg(long, default_value = "grid.toml", env = "RENDERGRID_CONFIG", global = true)]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a manifest against the simulated grid
    Simulate(simulate::SimulateArgs),

    /// Show or write the grid configuration
    Config(config::ConfigArgs),

    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match cli.command {
        Commands::Simulate(args) => {
            let config = match GridConfig::load(&cli.config) {
                Ok(config) => config,
                Err(e) => {
                    print_status(
                        Status::Failure,
                        &format!("Cannot load {}: {}", cli.config.display(), e),
                    );
                    std::process::exit(1);
                }
            };
            simulate::execute(args, config, cli.format).await?
        }
        Commands::Config(args) => config::execute(args, &cli.config)?,
        Commands::Version => {
            println!("RenderGrid CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("Core library v{}", rendergrid_common::VERSION);
        }
    }

    Ok(())
}
