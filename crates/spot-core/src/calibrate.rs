//! Batch calibration.
//!
//! ```text
//!   raw batch ──► [detrend] ──► sort ──► init thresholds (98% / 2%)
//!                                             │
//!                       peaks beyond each ◄───┘
//!                             │
//!                             ▼
//!                GPD fit + extreme quantile per side
//! ```

use tracing::{debug, info};

use crate::config::SpotConfig;
use crate::detrend::{detrend_batch, SlidingWindow};
use crate::error::{SpotError, SpotResult};
use crate::peaks::PeakSet;
use crate::side::{PerSide, Side};
use crate::state::{DetectorState, ThresholdState};

/// Order-statistic level of the upper initial threshold.
pub const UPPER_INIT_LEVEL: f64 = 0.98;

/// Order-statistic level of the lower initial threshold.
pub const LOWER_INIT_LEVEL: f64 = 0.02;

/// Builds a [`DetectorState`] from a calibration batch.
#[derive(Clone, Debug)]
pub struct Calibrator {
    config: SpotConfig,
}

impl Calibrator {
    pub fn new(config: SpotConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpotConfig {
        &self.config
    }

    /// Calibrate on `batch`.
    ///
    /// The batch must be non-empty and finite. With detrending enabled the
    /// first `depth` readings only seed the baseline, and the sliding window
    /// is seeded with the last `depth` raw readings.
    pub fn fit(&self, batch: &[f64]) -> SpotResult<DetectorState> {
        self.config.validate()?;
        check_batch(batch)?;

        let (series, window) = match self.config.detrend {
            Some(detrend) => {
                if batch.len() <= detrend.depth {
                    return Err(SpotError::InsufficientCalibrationData(format!(
                        "detrending with depth {} needs more than {} readings, got {}",
                        detrend.depth,
                        detrend.depth,
                        batch.len()
                    )));
                }
                let window = SlidingWindow::seed(batch, detrend.depth)?;
                (detrend_batch(batch, detrend.depth), Some(window))
            }
            None => (batch.to_vec(), None),
        };

        let n = series.len();
        if n < 2 {
            return Err(SpotError::InsufficientCalibrationData(format!(
                "calibration needs at least 2 working values, got {}",
                n
            )));
        }

        let init = initial_thresholds(&series);
        let policy = self.config.peak_policy;
        let peaks = PerSide::try_from_fn(|side| {
            let levels: Vec<f64> = series
                .iter()
                .copied()
                .filter(|&v| side.beyond(v, init[side]))
                .collect();
            if levels.is_empty() {
                return Err(SpotError::InsufficientCalibrationData(format!(
                    "no {} peaks beyond initial threshold {}",
                    side, init[side]
                )));
            }
            Ok(PeakSet::from_levels(side, levels, init[side], policy))
        })?;

        debug!(
            n,
            upper_init = init.upper,
            lower_init = init.lower,
            upper_peaks = peaks.upper.len(),
            lower_peaks = peaks.lower.len(),
            "initial thresholds placed"
        );

        let mut state = DetectorState {
            config: self.config.clone(),
            thresholds: init.map(|_, t| ThresholdState::unfitted(t)),
            peaks,
            observation_count: n as u64,
            window,
        };
        for side in Side::ALL {
            state.refit(side)?;
        }

        info!(
            n,
            risk = self.config.risk,
            upper = state.extreme_quantile(Side::Upper),
            lower = state.extreme_quantile(Side::Lower),
            "detector calibrated"
        );
        Ok(state)
    }
}

fn check_batch(batch: &[f64]) -> SpotResult<()> {
    if batch.is_empty() {
        return Err(SpotError::UnsupportedInputShape(
            "calibration batch is empty".into(),
        ));
    }
    if let Some(i) = batch.iter().position(|v| !v.is_finite()) {
        return Err(SpotError::UnsupportedInputShape(format!(
            "calibration batch has non-finite reading {} at index {}",
            batch[i], i
        )));
    }
    if batch.len() < 2 {
        return Err(SpotError::InsufficientCalibrationData(format!(
            "calibration needs at least 2 readings, got {}",
            batch.len()
        )));
    }
    Ok(())
}

/// Index of the `level` order statistic among `n` sorted values.
pub fn order_index(n: usize, level: f64) -> usize {
    ((level * n as f64) as usize).min(n.saturating_sub(1))
}

/// Upper and lower initial thresholds of `series` (at least one value).
pub fn initial_thresholds(series: &[f64]) -> PerSide<f64> {
    let mut sorted = series.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    PerSide::new(
        sorted[order_index(n, UPPER_INIT_LEVEL)],
        sorted[order_index(n, LOWER_INIT_LEVEL)],
    )
}
