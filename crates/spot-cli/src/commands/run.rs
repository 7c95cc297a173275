//! Stream readings through a stored detector

use std::path::PathBuf;

use clap::Args;
use colored::Colorize;
use serde::Serialize;
use spot_core::{Decision, JsonFileStore, MetricId, StatePersistence, StreamProcessor, Verdict};
use tabled::Tabled;

use crate::error::{CliError, CliResult};
use crate::input::read_series;
use crate::output::{fmt_f64, print_output, print_single, print_warning, OutputFormat};

#[derive(Debug, Args)]
pub struct RunArgs {
    /// State file written by `spot fit`
    #[arg(short, long)]
    pub state: PathBuf,

    /// Readings to ingest (`-` for stdin)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Metric to run
    #[arg(short, long, default_value = "default")]
    pub metric: String,

    /// Learning mode: fold alarm-level readings into the model instead of alarming
    #[arg(long)]
    pub learn: bool,

    /// Write the updated detector back to the state file
    #[arg(long)]
    pub save: bool,

    /// Only print readings that raised an alarm
    #[arg(long)]
    pub alarms_only: bool,
}

/// One ingested reading
#[derive(Debug, Serialize, Tabled)]
pub struct ReadingRow {
    #[tabled(rename = "#")]
    pub index: usize,
    #[tabled(rename = "Value")]
    pub value: f64,
    #[tabled(rename = "Decision")]
    pub decision: String,
    #[tabled(rename = "Upper")]
    pub upper_threshold: String,
    #[tabled(rename = "Lower")]
    pub lower_threshold: String,
    #[tabled(rename = "Alarm")]
    pub alarm: bool,
}

impl ReadingRow {
    fn new(index: usize, value: f64, verdict: &Verdict) -> Self {
        let decision = match verdict.decision {
            Decision::Alarm(side) => format!("alarm ({})", side),
            Decision::Peak(side) => format!("peak ({})", side),
            Decision::Bulk => "bulk".to_string(),
        };
        Self {
            index,
            value,
            decision,
            upper_threshold: fmt_f64(verdict.upper_threshold),
            lower_threshold: fmt_f64(verdict.lower_threshold),
            alarm: verdict.alarm,
        }
    }
}

#[derive(Serialize)]
struct RunReport<'a> {
    metric: &'a MetricId,
    readings: usize,
    alarms: Vec<usize>,
    verdicts: Vec<Verdict>,
}

/// Execute run command
pub fn execute(args: RunArgs, format: OutputFormat) -> CliResult<()> {
    let store = JsonFileStore::new(&args.state);
    let mut states = store.load()?;
    let metric = MetricId(args.metric);
    let state = states.remove(&metric).ok_or_else(|| {
        CliError::NotFound(format!(
            "no detector '{}' in {}",
            metric,
            args.state.display()
        ))
    })?;

    let values = read_series(&args.input)?;
    let mut processor = StreamProcessor::from_state(state);
    let with_alarm = !args.learn;

    let mut verdicts = Vec::with_capacity(values.len());
    let mut failure = None;
    for &v in &values {
        match processor.ingest(v, with_alarm) {
            Ok(verdict) => verdicts.push(verdict),
            Err(e) => {
                failure = Some(e);
                break;
            }
        }
    }
    let processed = verdicts.len();
    let alarms: Vec<usize> = verdicts
        .iter()
        .enumerate()
        .filter(|(_, v)| v.alarm)
        .map(|(i, _)| i)
        .collect();

    match format {
        OutputFormat::Table => {
            let rows: Vec<ReadingRow> = verdicts
                .iter()
                .zip(&values)
                .enumerate()
                .filter(|(_, (v, _))| !args.alarms_only || v.alarm)
                .map(|(i, (v, &x))| ReadingRow::new(i, x, v))
                .collect();
            print_output(rows, format)?;
            let summary = format!("{} readings, {} alarms", processed, alarms.len());
            if alarms.is_empty() {
                println!("{}", summary.green());
            } else {
                println!("{}", summary.red().bold());
            }
        }
        _ => {
            let verdicts = if args.alarms_only {
                verdicts.into_iter().filter(|v| v.alarm).collect()
            } else {
                verdicts
            };
            print_single(
                &RunReport {
                    metric: &metric,
                    readings: processed,
                    alarms,
                    verdicts,
                },
                format,
            )?;
        }
    }

    if let Some(e) = failure {
        if format == OutputFormat::Table {
            print_warning(&format!(
                "stopped after {} of {} readings; state file left unchanged",
                processed,
                values.len()
            ));
        }
        return Err(e.into());
    }

    if args.save {
        if let Some(state) = processor.into_state() {
            store.save_incremental(&metric, &state)?;
        }
    }
    Ok(())
}
