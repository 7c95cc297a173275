//! SPOT CLI - command-line interface for streaming extreme value detection
//!
//! This CLI lets operators:
//! - Calibrate a detector on a batch of readings and store it
//! - Stream readings through a stored detector and see its alarms
//! - Inspect stored detectors
//! - Run several independent series at once

use clap::{Parser, Subcommand};
use std::ffi::OsString;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
pub mod config;
mod error;
mod input;
pub mod output;

use commands::{detect, fit, inspect, run as run_cmd};
use config::CliConfig;
pub use error::{CliError, CliResult};

/// SPOT CLI application
#[derive(Parser)]
#[command(name = "spot")]
#[command(about = "SPOT - Streaming Peaks-Over-Threshold detector CLI", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "SPOT_CONFIG")]
    config: Option<String>,

    /// Output format (table, json, yaml)
    #[arg(short, long)]
    output: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Available commands
#[derive(Subcommand)]
enum Commands {
    /// Calibrate a detector on a batch and store it
    Fit(fit::FitArgs),

    /// Stream readings through a stored detector
    Run(run_cmd::RunArgs),

    /// Show stored detectors
    Inspect(inspect::InspectArgs),

    /// Calibrate and run several series concurrently
    Detect(detect::DetectArgs),
}

/// Run using the current process arguments.
pub async fn run() -> CliResult<()> {
    run_with_args(std::env::args_os()).await
}

/// Run using the provided argument iterator.
pub async fn run_with_args<I, T>(args: I) -> CliResult<()>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_from(args);

    // Initialize tracing; stdout is reserved for command output.
    let filter = if cli.verbose { "debug" } else { "info" };
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .without_time()
                .with_writer(std::io::stderr),
        )
        .try_init();

    let config = CliConfig::load(cli.config.as_deref())?;
    config.detector.validate()?;
    let format = cli.output.or(config.output).unwrap_or_default();

    match cli.command {
        Commands::Fit(args) => fit::execute(args, &config, format),
        Commands::Run(args) => run_cmd::execute(args, format),
        Commands::Inspect(args) => inspect::execute(args, format),
        Commands::Detect(args) => detect::execute(args, &config, format).await,
    }
}
