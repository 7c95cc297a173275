//! # spot-core
//!
//! Streaming Peaks-Over-Threshold (SPOT) extreme-value detection.
//!
//! A detector is calibrated once on a batch of readings, then ingests one
//! reading at a time. Each side (upper and lower) keeps a generalized Pareto
//! model of the excesses beyond an initial threshold and derives from it an
//! extreme quantile at level `1 - q`; a reading beyond that quantile raises
//! an alarm.
//!
//! ## Architecture
//!
//! ```text
//!   calibration batch
//!          │
//!          ▼
//!   ┌──────────────┐   init thresholds, peaks   ┌──────────────────┐
//!   │  Calibrator  │───────────────────────────►│  DetectorState   │
//!   └──────────────┘                            │  ┌────────────┐  │
//!                                               │  │ PerSide<.> │  │ ← thresholds + peak sets
//!   reading ──► [SlidingWindow baseline] ──────►│  └────────────┘  │
//!                                               │  ┌────────────┐  │
//!                                               │  │GpdEstimator│  │ ← Grimshaw / moments
//!                                               │  └────────────┘  │
//!                                               └────────┬─────────┘
//!                                                        │ Verdict
//!                                                        ▼
//!                                   StreamProcessor / MonitorSet (alarms)
//! ```
//!
//! ## Variants
//!
//! | preset                  | estimator | peak sets  | detrending |
//! |-------------------------|-----------|------------|------------|
//! | [`SpotConfig::bispot`]  | Grimshaw  | unbounded  | no         |
//! | [`SpotConfig::mom_spot`]| moments   | unbounded  | no         |
//! | [`SpotConfig::espot`]   | Grimshaw  | bounded    | EWMA       |
//!
//! ## Quick Start
//!
//! ```rust
//! use spot_core::{fit, Side};
//!
//! let batch: Vec<f64> = (1..=100).map(|i| i as f64).collect();
//! let mut state = fit(&batch, 1e-4).unwrap();
//! assert_eq!(state.threshold(Side::Upper).init_threshold, 99.0);
//!
//! let verdict = state.ingest(1_000.0, true).unwrap();
//! assert!(verdict.alarm);
//! ```

#![deny(unsafe_code)]

pub mod calibrate;
pub mod config;
pub mod detrend;
pub mod error;
pub mod estimator;
pub mod monitor;
pub mod peaks;
pub mod persistence;
pub mod quantile;
pub mod side;
pub mod state;
pub mod stream;

// Re-exports for convenience

// Errors
pub use error::{SpotError, SpotResult};

// Configuration
pub use config::{
    BaselineKind, DetrendConfig, EstimatorKind, GrimshawConfig, PeakPolicy, SpotConfig,
    DEFAULT_DEPTH, DEFAULT_RISK,
};

// Model
pub use calibrate::Calibrator;
pub use estimator::{
    estimator_for, GpdEstimator, GpdFit, GrimshawEstimator, MomentEstimator, ProjectedNewton,
    RootRefiner,
};
pub use peaks::{PeakSet, PeakUpdate};
pub use quantile::{quantile, QuantileInput};
pub use side::{PerSide, Side};
pub use state::{deserialize, serialize, DetectorState, ThresholdState};

// Streaming
pub use detrend::SlidingWindow;
pub use stream::{BatchPrediction, Decision, Phase, StreamProcessor, Verdict};

// Monitoring and persistence
pub use monitor::{AlarmEvent, MetricId, MonitorSet, MAX_ALARMS};
pub use persistence::{InMemoryStore, JsonFileStore, StatePersistence};

/// Calibrate a static two-sided detector (Grimshaw estimator) at risk `q`.
pub fn fit(batch: &[f64], risk: f64) -> SpotResult<DetectorState> {
    Calibrator::new(SpotConfig::bispot(risk)).fit(batch)
}

/// Ingest `values` into `state` in order; see [`DetectorState::predict_batch`].
pub fn predict_batch(
    state: &mut DetectorState,
    values: &[f64],
    with_alarm: bool,
) -> SpotResult<BatchPrediction> {
    state.predict_batch(values, with_alarm)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn detector_types_are_thread_safe() {
        assert_send_sync::<DetectorState>();
        assert_send_sync::<StreamProcessor>();
        assert_send_sync::<MonitorSet>();
    }

    #[test]
    fn fit_then_batch() {
        let batch: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let mut state = fit(&batch, 1e-4).unwrap();
        let out = predict_batch(&mut state, &[10.0, 20.0, 1e4], true).unwrap();
        assert_eq!(out.alarms, vec![2]);
        assert_eq!(state.observation_count(), 102);
    }

    #[test]
    fn serialized_state_resumes_identically() {
        let batch: Vec<f64> = (0..500).map(|i| (0.37 * i as f64).sin() * 5.0).collect();
        let mut a = Calibrator::new(SpotConfig::espot(1e-3, 8)).fit(&batch).unwrap();
        let mut b = deserialize(&serialize(&a).unwrap()).unwrap();

        let stream: Vec<f64> = (500..700).map(|i| (0.37 * i as f64).sin() * 5.0).collect();
        let pa = a.predict_batch(&stream, true).unwrap();
        let pb = b.predict_batch(&stream, true).unwrap();
        assert_eq!(pa, pb);
        assert_eq!(a, b);
    }
}
