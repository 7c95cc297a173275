//! Detector configuration.
//!
//! A [`SpotConfig`] selects the variant of the detector: which GPD estimator
//! refits the tails, whether the peak sets are bounded, and whether readings
//! are detrended against a sliding-window baseline before thresholding. The
//! configuration travels with the [`DetectorState`](crate::DetectorState) so a
//! restored detector keeps behaving the way it was calibrated.

use serde::{Deserialize, Serialize};

use crate::error::{SpotError, SpotResult};

/// Default risk (target false-alarm probability).
pub const DEFAULT_RISK: f64 = 1e-4;

/// Default sliding-window depth for the detrended variant.
pub const DEFAULT_DEPTH: usize = 10;

/// Default EWMA smoothing factor for the detrended baseline.
pub const DEFAULT_EWMA_ALPHA: f64 = 0.1;

/// Default guard distance from the `t = -1/YM` singularity.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Default number of regularly spaced seeds per search interval.
pub const DEFAULT_SEED_POINTS: usize = 10;

/// Iteration cap for each seed refinement.
pub const DEFAULT_MAX_ITERATIONS: usize = 64;

/// Which estimator fits the generalized Pareto tail.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    /// Maximum likelihood via Grimshaw's reduction to 1-D root finding.
    #[default]
    Grimshaw,
    /// Closed-form method of moments.
    Moments,
}

/// How the per-side peak sets evolve during streaming.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeakPolicy {
    /// Every peak is appended; the initial threshold never moves.
    #[default]
    Unbounded,
    /// Capacity fixed at calibration; the least extreme peak is replaced and
    /// the initial threshold is reweighted around it.
    Bounded,
}

/// Local baseline computed over the sliding window.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BaselineKind {
    /// Exponentially weighted moving average seeded with the oldest reading.
    Ewma { alpha: f64 },
    /// Arithmetic mean of the window.
    MovingAverage,
}

impl Default for BaselineKind {
    fn default() -> Self {
        BaselineKind::Ewma {
            alpha: DEFAULT_EWMA_ALPHA,
        }
    }
}

/// Detrending parameters.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetrendConfig {
    /// Number of raw readings kept in the sliding window.
    pub depth: usize,
    #[serde(default)]
    pub baseline: BaselineKind,
}

impl Default for DetrendConfig {
    fn default() -> Self {
        Self {
            depth: DEFAULT_DEPTH,
            baseline: BaselineKind::default(),
        }
    }
}

/// Root-search settings for the Grimshaw estimator.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GrimshawConfig {
    pub epsilon: f64,
    pub n_points: usize,
    pub max_iterations: usize,
    /// Residual below which a seed counts as converged.
    pub tolerance: f64,
}

impl Default for GrimshawConfig {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            n_points: DEFAULT_SEED_POINTS,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            tolerance: 1e-12,
        }
    }
}

/// Full detector configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpotConfig {
    /// Detection level q: the extreme quantile sits at level `1 - q`.
    pub risk: f64,
    pub estimator: EstimatorKind,
    pub peak_policy: PeakPolicy,
    /// `None` runs on raw readings.
    pub detrend: Option<DetrendConfig>,
    pub grimshaw: GrimshawConfig,
}

impl Default for SpotConfig {
    fn default() -> Self {
        Self::bispot(DEFAULT_RISK)
    }
}

impl SpotConfig {
    /// Two-sided static SPOT with the maximum-likelihood estimator.
    pub fn bispot(risk: f64) -> Self {
        Self {
            risk,
            estimator: EstimatorKind::Grimshaw,
            peak_policy: PeakPolicy::Unbounded,
            detrend: None,
            grimshaw: GrimshawConfig::default(),
        }
    }

    /// Two-sided static SPOT with the method-of-moments estimator.
    pub fn mom_spot(risk: f64) -> Self {
        Self {
            estimator: EstimatorKind::Moments,
            ..Self::bispot(risk)
        }
    }

    /// Detrended, bounded-memory SPOT (EWMA baseline over `depth` readings).
    pub fn espot(risk: f64, depth: usize) -> Self {
        Self {
            risk,
            estimator: EstimatorKind::Grimshaw,
            peak_policy: PeakPolicy::Bounded,
            detrend: Some(DetrendConfig {
                depth,
                baseline: BaselineKind::default(),
            }),
            grimshaw: GrimshawConfig {
                n_points: 8,
                ..GrimshawConfig::default()
            },
        }
    }

    /// Window depth, if detrending is enabled.
    pub fn depth(&self) -> Option<usize> {
        self.detrend.map(|d| d.depth)
    }

    /// Reject configurations that cannot produce a meaningful detector.
    pub fn validate(&self) -> SpotResult<()> {
        if !(self.risk.is_finite() && self.risk > 0.0 && self.risk < 1.0) {
            return Err(SpotError::InvalidConfig(format!(
                "risk must lie in (0, 1), got {}",
                self.risk
            )));
        }
        if let Some(detrend) = &self.detrend {
            if detrend.depth == 0 {
                return Err(SpotError::InvalidConfig(
                    "detrend depth must be at least 1".into(),
                ));
            }
            if let BaselineKind::Ewma { alpha } = detrend.baseline {
                if !(alpha.is_finite() && alpha > 0.0 && alpha <= 1.0) {
                    return Err(SpotError::InvalidConfig(format!(
                        "ewma alpha must lie in (0, 1], got {}",
                        alpha
                    )));
                }
            }
        }
        let g = &self.grimshaw;
        if !(g.epsilon.is_finite() && g.epsilon > 0.0) {
            return Err(SpotError::InvalidConfig(format!(
                "grimshaw epsilon must be positive, got {}",
                g.epsilon
            )));
        }
        if g.n_points == 0 || g.max_iterations == 0 {
            return Err(SpotError::InvalidConfig(
                "grimshaw n_points and max_iterations must be at least 1".into(),
            ));
        }
        if !(g.tolerance.is_finite() && g.tolerance >= 0.0) {
            return Err(SpotError::InvalidConfig(format!(
                "grimshaw tolerance must be non-negative, got {}",
                g.tolerance
            )));
        }
        Ok(())
    }
}
