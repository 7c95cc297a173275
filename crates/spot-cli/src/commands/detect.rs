//! Calibrate and run several independent series concurrently

use std::path::PathBuf;
use std::str::FromStr;

use clap::Args;
use serde::Serialize;
use spot_core::{SpotConfig, StreamProcessor};
use tabled::Tabled;
use tokio::task::JoinSet;
use tracing::{debug, info};

use super::fit::{resolve_config, Preset};
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::input::read_series;
use crate::output::{fmt_f64, print_output, OutputFormat};

/// `NAME=CALIBRATION_FILE:STREAM_FILE`
#[derive(Debug, Clone)]
pub struct SeriesSpec {
    pub name: String,
    pub calibration: PathBuf,
    pub stream: PathBuf,
}

impl FromStr for SeriesSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, files) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=CALIB:STREAM, got '{}'", s))?;
        let (calibration, stream) = files
            .split_once(':')
            .ok_or_else(|| format!("expected CALIB:STREAM after '{}=', got '{}'", name, files))?;
        if name.is_empty() || calibration.is_empty() || stream.is_empty() {
            return Err(format!("empty component in '{}'", s));
        }
        Ok(Self {
            name: name.to_string(),
            calibration: PathBuf::from(calibration),
            stream: PathBuf::from(stream),
        })
    }
}

#[derive(Debug, Args)]
pub struct DetectArgs {
    /// Series to run, as NAME=CALIB:STREAM (repeatable)
    #[arg(short, long = "series", required = true)]
    pub series: Vec<SeriesSpec>,

    /// Detector variant (defaults to the configured detector)
    #[arg(short, long)]
    pub preset: Option<Preset>,

    /// Risk q: target false alarm probability
    #[arg(short, long)]
    pub risk: Option<f64>,

    /// Sliding window depth for detrending
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Learning mode: fold alarm-level readings into the model instead of alarming
    #[arg(long)]
    pub learn: bool,
}

/// Outcome of one series
#[derive(Debug, Serialize, Tabled)]
pub struct SeriesReport {
    #[tabled(rename = "Series")]
    pub series: String,
    #[tabled(rename = "Calibration")]
    pub calibration_readings: usize,
    #[tabled(rename = "Stream")]
    pub stream_readings: usize,
    #[tabled(rename = "Alarms", display_with = "display_indices")]
    pub alarms: Vec<usize>,
    #[tabled(rename = "Upper")]
    pub upper_threshold: String,
    #[tabled(rename = "Lower")]
    pub lower_threshold: String,
}

fn display_indices(indices: &[usize]) -> String {
    const SHOWN: usize = 8;
    if indices.is_empty() {
        return "-".to_string();
    }
    let head: Vec<String> = indices.iter().take(SHOWN).map(|i| i.to_string()).collect();
    if indices.len() > SHOWN {
        format!("{} … ({} total)", head.join(", "), indices.len())
    } else {
        head.join(", ")
    }
}

/// Calibrate and stream one series on the calling thread.
pub fn run_series(spec: &SeriesSpec, config: SpotConfig, with_alarm: bool) -> CliResult<SeriesReport> {
    let batch = read_series(&spec.calibration)?;
    let stream = read_series(&spec.stream)?;

    let mut processor = StreamProcessor::new(config);
    processor.fit(&batch)?;
    let prediction = processor.predict_batch(&stream, with_alarm)?;
    debug!(series = %spec.name, alarms = prediction.alarms.len(), "series done");

    let last = |v: &[f64]| v.last().copied().map(fmt_f64).unwrap_or_else(|| "-".into());
    Ok(SeriesReport {
        series: spec.name.clone(),
        calibration_readings: batch.len(),
        stream_readings: stream.len(),
        upper_threshold: last(&prediction.upper_thresholds),
        lower_threshold: last(&prediction.lower_thresholds),
        alarms: prediction.alarms,
    })
}

/// Execute detect command
pub async fn execute(args: DetectArgs, config: &CliConfig, format: OutputFormat) -> CliResult<()> {
    let detector = resolve_config(&config.detector, args.preset, args.risk, args.depth)?;
    let with_alarm = !args.learn;

    let mut tasks = JoinSet::new();
    for (order, spec) in args.series.into_iter().enumerate() {
        let detector = detector.clone();
        tasks.spawn_blocking(move || (order, run_series(&spec, detector, with_alarm)));
    }

    let mut reports = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let (order, result) = joined.map_err(|e| CliError::Task(e.to_string()))?;
        reports.push((order, result?));
    }
    reports.sort_by_key(|(order, _)| *order);

    let total: usize = reports.iter().map(|(_, r)| r.alarms.len()).sum();
    info!(series = reports.len(), alarms = total, "detection finished");

    print_output(reports.into_iter().map(|(_, r)| r).collect(), format)
}
