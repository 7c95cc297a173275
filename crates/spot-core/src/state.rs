//! Detector state and its serialization contract.
//!
//! A [`DetectorState`] is created once by calibration and then mutated in
//! place by every ingested reading. It carries its own configuration, so a
//! state restored with [`deserialize`] resumes exactly where the serialized
//! one stopped.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::SpotConfig;
use crate::detrend::SlidingWindow;
use crate::error::{SpotError, SpotResult};
use crate::estimator::estimator_for;
use crate::peaks::PeakSet;
use crate::quantile::{quantile, QuantileInput};
use crate::side::{PerSide, Side};

/// Threshold model of one side.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThresholdState {
    /// Base of the GPD tail; moves only under the bounded peak policy.
    pub init_threshold: f64,
    /// Alarm bound: always the last value produced by the quantile model.
    pub extreme_quantile: f64,
    pub gamma: f64,
    pub sigma: f64,
    /// Nt: peaks currently in the side's peak set.
    pub peak_count: u64,
}

impl ThresholdState {
    /// Unfitted state sitting on `init_threshold`.
    pub(crate) fn unfitted(init_threshold: f64) -> Self {
        Self {
            init_threshold,
            extreme_quantile: init_threshold,
            gamma: 0.0,
            sigma: 0.0,
            peak_count: 0,
        }
    }
}

/// Complete state of one calibrated detector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorState {
    pub(crate) config: SpotConfig,
    pub(crate) thresholds: PerSide<ThresholdState>,
    pub(crate) peaks: PerSide<PeakSet>,
    /// n: readings accounted for by the quantile model, shared by both sides.
    pub(crate) observation_count: u64,
    /// Present iff the configuration enables detrending.
    pub(crate) window: Option<SlidingWindow>,
}

impl DetectorState {
    pub fn config(&self) -> &SpotConfig {
        &self.config
    }

    pub fn risk(&self) -> f64 {
        self.config.risk
    }

    pub fn threshold(&self, side: Side) -> &ThresholdState {
        &self.thresholds[side]
    }

    pub fn thresholds(&self) -> &PerSide<ThresholdState> {
        &self.thresholds
    }

    pub fn peaks(&self, side: Side) -> &PeakSet {
        &self.peaks[side]
    }

    pub fn observation_count(&self) -> u64 {
        self.observation_count
    }

    pub fn window(&self) -> Option<&SlidingWindow> {
        self.window.as_ref()
    }

    /// Current extreme quantile of `side`, in working (detrended) units.
    pub fn extreme_quantile(&self, side: Side) -> f64 {
        self.thresholds[side].extreme_quantile
    }

    /// Refit the GPD tail of `side` and recompute its extreme quantile.
    ///
    /// Nothing is written unless both the fit and the quantile succeed.
    pub(crate) fn refit(&mut self, side: Side) -> SpotResult<()> {
        let estimator = estimator_for(&self.config);
        let peaks = &self.peaks[side];
        let fit = estimator.estimate(peaks)?;
        let peak_count = peaks.len() as u64;

        let current = self.thresholds[side];
        let extreme_quantile = quantile(
            side,
            QuantileInput {
                gamma: fit.gamma,
                sigma: fit.sigma,
                observation_count: self.observation_count,
                peak_count,
                init_threshold: current.init_threshold,
                risk: self.config.risk,
            },
        )?;

        debug!(
            %side,
            estimator = estimator.name(),
            gamma = fit.gamma,
            sigma = fit.sigma,
            peaks = peak_count,
            n = self.observation_count,
            extreme_quantile,
            "tail refitted"
        );

        self.thresholds[side] = ThresholdState {
            extreme_quantile,
            gamma: fit.gamma,
            sigma: fit.sigma,
            peak_count,
            ..current
        };
        Ok(())
    }

    /// Structural checks for restored state.
    pub fn validate(&self) -> SpotResult<()> {
        self.config
            .validate()
            .map_err(|e| SpotError::CorruptState(e.to_string()))?;

        for side in Side::ALL {
            let th = &self.thresholds[side];
            let peaks = &self.peaks[side];
            if peaks.side() != side {
                return Err(SpotError::CorruptState(format!(
                    "{} slot holds the {} peak set",
                    side,
                    peaks.side()
                )));
            }
            peaks.validate()?;
            if th.peak_count != peaks.len() as u64 {
                return Err(SpotError::CorruptState(format!(
                    "{} peak count {} does not match {} stored peaks",
                    side,
                    th.peak_count,
                    peaks.len()
                )));
            }
            let fields = [th.init_threshold, th.extreme_quantile, th.gamma, th.sigma];
            if fields.iter().any(|v| !v.is_finite()) {
                return Err(SpotError::CorruptState(format!(
                    "{} threshold state has a non-finite field",
                    side
                )));
            }
        }

        match (&self.config.detrend, &self.window) {
            (None, None) => Ok(()),
            (Some(d), Some(w)) if d.depth == w.depth() => w.validate(),
            (Some(d), Some(w)) => Err(SpotError::CorruptState(format!(
                "window depth {} does not match configured depth {}",
                w.depth(),
                d.depth
            ))),
            (Some(_), None) => Err(SpotError::CorruptState(
                "detrending enabled but no sliding window stored".into(),
            )),
            (None, Some(_)) => Err(SpotError::CorruptState(
                "sliding window stored but detrending disabled".into(),
            )),
        }
    }
}

impl std::fmt::Display for DetectorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Streaming Peaks-Over-Threshold detector")?;
        writeln!(f, "Detection level q = {}", self.config.risk)?;
        if let Some(depth) = self.config.depth() {
            writeln!(f, "Detrending depth = {}", depth)?;
        }
        writeln!(f, "Observations n = {}", self.observation_count)?;
        for (side, th) in self.thresholds.iter() {
            writeln!(
                f,
                "  {:<5} initial threshold: {}  peaks: {}  gamma: {}  sigma: {}  extreme quantile: {}",
                side, th.init_threshold, th.peak_count, th.gamma, th.sigma, th.extreme_quantile
            )?;
        }
        Ok(())
    }
}

/// Encode a state as bytes (JSON) with exact float round-trip.
pub fn serialize(state: &DetectorState) -> SpotResult<Vec<u8>> {
    Ok(serde_json::to_vec(state)?)
}

/// Decode and validate a state produced by [`serialize`].
pub fn deserialize(bytes: &[u8]) -> SpotResult<DetectorState> {
    let state: DetectorState = serde_json::from_slice(bytes)?;
    state.validate()?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibrate::Calibrator;

    fn calibrated() -> DetectorState {
        let batch: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        Calibrator::new(SpotConfig::bispot(1e-4)).fit(&batch).unwrap()
    }

    #[test]
    fn round_trip_is_exact() {
        let state = calibrated();
        let bytes = serialize(&state).unwrap();
        let restored = deserialize(&bytes).unwrap();
        assert_eq!(restored, state);
        assert_eq!(
            restored.extreme_quantile(Side::Upper).to_bits(),
            state.extreme_quantile(Side::Upper).to_bits()
        );
    }

    #[test]
    fn garbage_bytes_rejected() {
        let err = deserialize(b"{not json").unwrap_err();
        assert!(matches!(err, SpotError::Serialization(_)));
    }

    #[test]
    fn tampered_peak_count_rejected() {
        let mut state = calibrated();
        state.thresholds[Side::Upper].peak_count += 1;
        let bytes = serialize(&state).unwrap();
        let err = deserialize(&bytes).unwrap_err();
        assert!(matches!(err, SpotError::CorruptState(_)));
    }

    #[test]
    fn missing_window_rejected() {
        let batch: Vec<f64> = (0..200).map(|i| (0.7 * i as f64).sin()).collect();
        let mut state = Calibrator::new(SpotConfig::espot(1e-3, 5)).fit(&batch).unwrap();
        assert!(state.validate().is_ok());
        state.window = None;
        assert!(matches!(state.validate(), Err(SpotError::CorruptState(_))));
    }

    #[test]
    fn refit_failure_leaves_side_untouched() {
        let mut state = calibrated();
        state.config = SpotConfig::mom_spot(1e-4);
        // A single upper peak has zero variance under the moment estimator.
        let before = *state.threshold(Side::Upper);
        let err = state.refit(Side::Upper).unwrap_err();
        assert!(matches!(err, SpotError::DegenerateVariance { count: 1 }));
        assert_eq!(*state.threshold(Side::Upper), before);
    }

    #[test]
    fn display_summarises_both_sides() {
        let text = calibrated().to_string();
        assert!(text.contains("q = 0.0001"));
        assert!(text.contains("upper"));
        assert!(text.contains("lower"));
        assert!(text.contains("initial threshold: 99"));
    }
}
