//! Tilepath - Development Tools

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use serde::Serialize;
use tilepath_core::config::PathfindingConfig;
use tilepath_tools::error::{Result, ToolError};
use tilepath_tools::scenario::{blocking_checksums, run_scenario, Scenario};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tilepath-tools")]
#[command(about = "Development tools for the tilepath pathfinder")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a route scenario and print a JSON report
    Route {
        /// Path to the scenario RON file
        scenario: PathBuf,
        /// Pathfinder config RON file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Write the report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Print blocking map checksums for a scenario's requests
    Checksum {
        /// Path to the scenario RON file
        scenario: PathBuf,
    },
}

fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let outcome = match cli.command {
        Commands::Route {
            scenario,
            config,
            output,
        } => route(&scenario, config.as_deref(), output.as_deref()),
        Commands::Checksum { scenario } => checksum(&scenario),
    };

    if let Err(e) = outcome {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}

fn route(scenario: &Path, config: Option<&Path>, output: Option<&Path>) -> Result<()> {
    tracing::info!("Running scenario: {}", scenario.display());
    let config = match config {
        Some(path) => PathfindingConfig::load(path)?,
        None => PathfindingConfig::default(),
    };
    let report = run_scenario(&Scenario::load(scenario)?, config)?;
    emit(&report, output)
}

fn checksum(scenario: &Path) -> Result<()> {
    let sums = blocking_checksums(&Scenario::load(scenario)?)?;
    emit(&sums, None)
}

fn emit<T: Serialize>(value: &T, output: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match output {
        Some(path) => std::fs::write(path, json).map_err(|source| ToolError::Io {
            path: path.to_path_buf(),
            source,
        }),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}
