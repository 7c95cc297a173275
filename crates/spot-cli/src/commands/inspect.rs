//! Show stored detectors

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use spot_core::{JsonFileStore, MetricId, StatePersistence};

use super::DetectorRow;
use crate::error::{CliError, CliResult};
use crate::output::{print_output, print_single, OutputFormat};

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// State file written by `spot fit`
    #[arg(short, long)]
    pub state: PathBuf,

    /// Show a single metric in full
    #[arg(short, long)]
    pub metric: Option<String>,
}

/// Execute inspect command
pub fn execute(args: InspectArgs, format: OutputFormat) -> CliResult<()> {
    if !args.state.exists() {
        return Err(CliError::NotFound(format!(
            "state file {}",
            args.state.display()
        )));
    }
    let states: BTreeMap<MetricId, _> = JsonFileStore::new(&args.state).load()?.into_iter().collect();

    if let Some(name) = args.metric {
        let metric = MetricId(name);
        let state = states
            .get(&metric)
            .ok_or_else(|| CliError::NotFound(format!("no detector '{}'", metric)))?;
        return match format {
            OutputFormat::Table => {
                println!("{} {}", "Detector".bold().cyan(), metric.to_string().bold());
                println!("{}", "=".repeat(50));
                print!("{}", state);
                Ok(())
            }
            _ => print_single(state, format),
        };
    }

    match format {
        OutputFormat::Table => {
            let rows: Vec<DetectorRow> = states
                .iter()
                .map(|(id, state)| DetectorRow::new(id, state))
                .collect();
            print_output(rows, format)
        }
        _ => print_single(&states, format),
    }
}
