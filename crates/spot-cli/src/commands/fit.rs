//! Calibrate a detector and store it

use std::collections::BTreeMap;
use std::path::PathBuf;

use clap::{Args, ValueEnum};
use spot_core::{
    Calibrator, JsonFileStore, MetricId, SpotConfig, StatePersistence, DEFAULT_DEPTH,
};

use super::DetectorRow;
use crate::config::CliConfig;
use crate::error::{CliError, CliResult};
use crate::input::read_series;
use crate::output::{print_output, print_single, print_success, OutputFormat};

/// Detector variant presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// Static two-sided SPOT, maximum likelihood fit
    Bispot,
    /// Static two-sided SPOT, method of moments fit
    Momspot,
    /// Detrended SPOT with bounded peak sets
    Espot,
}

#[derive(Debug, Args)]
pub struct FitArgs {
    /// Calibration readings (`-` for stdin)
    #[arg(short, long)]
    pub input: PathBuf,

    /// State file to create or update
    #[arg(short, long)]
    pub state: PathBuf,

    /// Metric name the detector is stored under
    #[arg(short, long, default_value = "default")]
    pub metric: String,

    /// Detector variant (defaults to the configured detector)
    #[arg(short, long)]
    pub preset: Option<Preset>,

    /// Risk q: target false alarm probability
    #[arg(short, long)]
    pub risk: Option<f64>,

    /// Sliding window depth for detrending
    #[arg(short, long)]
    pub depth: Option<usize>,
}

/// Resolve the detector configuration from the config file and flags.
pub fn resolve_config(
    base: &SpotConfig,
    preset: Option<Preset>,
    risk: Option<f64>,
    depth: Option<usize>,
) -> CliResult<SpotConfig> {
    let risk = risk.unwrap_or(base.risk);
    let mut config = match preset {
        Some(Preset::Bispot) => SpotConfig::bispot(risk),
        Some(Preset::Momspot) => SpotConfig::mom_spot(risk),
        Some(Preset::Espot) => {
            SpotConfig::espot(risk, depth.or(base.depth()).unwrap_or(DEFAULT_DEPTH))
        }
        None => SpotConfig {
            risk,
            ..base.clone()
        },
    };
    if let Some(depth) = depth {
        match config.detrend.as_mut() {
            Some(detrend) => detrend.depth = depth,
            None => {
                return Err(CliError::InvalidArgument(
                    "--depth needs a detrending detector (use --preset espot)".into(),
                ))
            }
        }
    }
    config.validate()?;
    Ok(config)
}

/// Execute fit command
pub fn execute(args: FitArgs, config: &CliConfig, format: OutputFormat) -> CliResult<()> {
    let detector = resolve_config(&config.detector, args.preset, args.risk, args.depth)?;
    let batch = read_series(&args.input)?;
    let state = Calibrator::new(detector).fit(&batch)?;

    let metric = MetricId(args.metric);
    let store = JsonFileStore::new(&args.state);
    store.save_incremental(&metric, &state)?;

    match format {
        OutputFormat::Table => {
            print_success(&format!(
                "calibrated '{}' on {} readings → {}",
                metric,
                batch.len(),
                args.state.display()
            ));
            print_output(vec![DetectorRow::new(&metric, &state)], format)
        }
        _ => {
            let mut out = BTreeMap::new();
            out.insert(metric, state);
            print_single(&out, format)
        }
    }
}
