//! Streaming ingestion.
//!
//! Every reading is classified against the two sides in a fixed order:
//! upper alarm, upper peak, lower alarm, lower peak, otherwise bulk. The
//! first branch that applies wins.
//!
//! ```text
//!   raw ──► minus baseline ──► classify ──┬─► Alarm(side)  (or peak when learning)
//!                                          ├─► Peak(side)   refit that side
//!                                          └─► Bulk
//!                        window.advance(raw) ◄─┘
//! ```

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};

use crate::calibrate::Calibrator;
use crate::config::{PeakPolicy, SpotConfig};
use crate::error::{SpotError, SpotResult};
use crate::peaks::PeakUpdate;
use crate::side::Side;
use crate::state::DetectorState;

/// How a reading was classified.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "side", rename_all = "lowercase")]
pub enum Decision {
    /// Beyond the side's extreme quantile.
    Alarm(Side),
    /// Beyond the side's initial threshold only (or an alarm-level value
    /// absorbed because alarms were disabled).
    Peak(Side),
    Bulk,
}

/// Result of ingesting one reading.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub alarm: bool,
    pub decision: Decision,
    /// Upper extreme quantile plus the current baseline.
    pub upper_threshold: f64,
    /// Lower extreme quantile plus the current baseline.
    pub lower_threshold: f64,
}

impl Verdict {
    pub fn alarm_side(&self) -> Option<Side> {
        match self.decision {
            Decision::Alarm(side) => Some(side),
            _ => None,
        }
    }

    /// Threshold of `side` as reported with this reading.
    pub fn threshold(&self, side: Side) -> f64 {
        match side {
            Side::Upper => self.upper_threshold,
            Side::Lower => self.lower_threshold,
        }
    }
}

/// Batch output: one threshold pair per reading plus the alarm positions.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchPrediction {
    /// Indices (into the batch) of the readings that raised an alarm.
    pub alarms: Vec<usize>,
    pub upper_thresholds: Vec<f64>,
    pub lower_thresholds: Vec<f64>,
}

impl BatchPrediction {
    fn with_capacity(n: usize) -> Self {
        Self {
            alarms: Vec::new(),
            upper_thresholds: Vec::with_capacity(n),
            lower_thresholds: Vec::with_capacity(n),
        }
    }

    fn push(&mut self, index: usize, verdict: &Verdict) {
        if verdict.alarm {
            self.alarms.push(index);
        }
        self.upper_thresholds.push(verdict.upper_threshold);
        self.lower_thresholds.push(verdict.lower_threshold);
    }

    pub fn len(&self) -> usize {
        self.upper_thresholds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.upper_thresholds.is_empty()
    }
}

impl DetectorState {
    /// Ingest one raw reading.
    ///
    /// With `with_alarm == false` an alarm-level reading is absorbed as a peak
    /// instead of being reported. Non-finite readings are rejected without
    /// touching the state; any error raised by a refit is fatal and leaves
    /// the state unusable.
    pub fn ingest(&mut self, raw: f64, with_alarm: bool) -> SpotResult<Verdict> {
        if !raw.is_finite() {
            return Err(SpotError::UnsupportedInputShape(format!(
                "non-finite reading {}",
                raw
            )));
        }

        let baseline = self.baseline();
        let value = raw - baseline;

        let decision = self.classify(value, with_alarm);
        if let Decision::Peak(side) = decision {
            self.absorb_peak(side, value)?;
        }

        // Bounded peak sets count every reading; unbounded ones count the
        // bulk here and peaks inside `absorb_peak`, alarms never.
        match (self.config.peak_policy, decision) {
            (PeakPolicy::Bounded, _) | (PeakPolicy::Unbounded, Decision::Bulk) => {
                self.observation_count += 1;
            }
            _ => {}
        }

        if let Some(window) = self.window.as_mut() {
            window.advance(raw);
        }

        trace!(raw, value, ?decision, n = self.observation_count, "reading ingested");

        Ok(Verdict {
            alarm: matches!(decision, Decision::Alarm(_)),
            decision,
            upper_threshold: self.extreme_quantile(Side::Upper) + baseline,
            lower_threshold: self.extreme_quantile(Side::Lower) + baseline,
        })
    }

    /// Ingest `values` in order.
    ///
    /// Stops at the first error; readings before it stay applied.
    pub fn predict_batch(&mut self, values: &[f64], with_alarm: bool) -> SpotResult<BatchPrediction> {
        let mut out = BatchPrediction::with_capacity(values.len());
        for (i, &raw) in values.iter().enumerate() {
            let verdict = self.ingest(raw, with_alarm)?;
            out.push(i, &verdict);
        }
        Ok(out)
    }

    /// Current baseline `M_i` (zero without detrending).
    pub fn baseline(&self) -> f64 {
        match (&self.window, &self.config.detrend) {
            (Some(window), Some(detrend)) => window.baseline(detrend.baseline),
            _ => 0.0,
        }
    }

    fn classify(&self, value: f64, with_alarm: bool) -> Decision {
        for side in Side::ALL {
            let th = &self.thresholds[side];
            if side.beyond(value, th.extreme_quantile) {
                return if with_alarm {
                    Decision::Alarm(side)
                } else {
                    Decision::Peak(side)
                };
            }
            if side.beyond(value, th.init_threshold) {
                return Decision::Peak(side);
            }
        }
        Decision::Bulk
    }

    fn absorb_peak(&mut self, side: Side, value: f64) -> SpotResult<()> {
        let threshold = self.thresholds[side].init_threshold;
        match self.peaks[side].admit(value, threshold) {
            PeakUpdate::Appended => {
                self.observation_count += 1;
                self.refit(side)
            }
            PeakUpdate::Replaced { threshold } => {
                self.thresholds[side].init_threshold = threshold;
                self.refit(side)
            }
            PeakUpdate::Unchanged => Ok(()),
        }
    }
}

/// Lifecycle of a streaming detector.
#[derive(Clone, Debug, PartialEq)]
pub enum Phase {
    Uncalibrated,
    Calibrated(DetectorState),
    /// A refit failed mid-stream; the state was discarded.
    Faulted(String),
}

/// Owns one detector through calibration, streaming, and failure.
#[derive(Clone, Debug)]
pub struct StreamProcessor {
    config: SpotConfig,
    phase: Phase,
}

impl StreamProcessor {
    pub fn new(config: SpotConfig) -> Self {
        Self {
            config,
            phase: Phase::Uncalibrated,
        }
    }

    /// Resume from a previously calibrated state.
    pub fn from_state(state: DetectorState) -> Self {
        Self {
            config: state.config().clone(),
            phase: Phase::Calibrated(state),
        }
    }

    pub fn config(&self) -> &SpotConfig {
        &self.config
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn is_calibrated(&self) -> bool {
        matches!(self.phase, Phase::Calibrated(_))
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self.phase, Phase::Faulted(_))
    }

    pub fn state(&self) -> Option<&DetectorState> {
        match &self.phase {
            Phase::Calibrated(state) => Some(state),
            _ => None,
        }
    }

    pub fn into_state(self) -> Option<DetectorState> {
        match self.phase {
            Phase::Calibrated(state) => Some(state),
            _ => None,
        }
    }

    /// (Re)calibrate on `batch`. Allowed from any phase; on failure the
    /// current phase is kept.
    pub fn fit(&mut self, batch: &[f64]) -> SpotResult<()> {
        let state = Calibrator::new(self.config.clone()).fit(batch)?;
        self.phase = Phase::Calibrated(state);
        Ok(())
    }

    pub fn ingest(&mut self, value: f64, with_alarm: bool) -> SpotResult<Verdict> {
        let state = match &mut self.phase {
            Phase::Calibrated(state) => state,
            Phase::Uncalibrated => return Err(SpotError::NotCalibrated),
            Phase::Faulted(reason) => return Err(SpotError::DetectorFaulted(reason.clone())),
        };
        match state.ingest(value, with_alarm) {
            Err(e) if e.is_fatal() => {
                warn!(error = %e, "detector faulted, recalibration required");
                self.phase = Phase::Faulted(e.to_string());
                Err(e)
            }
            other => other,
        }
    }

    /// Ingest `values` in order, stopping at the first error.
    pub fn predict_batch(&mut self, values: &[f64], with_alarm: bool) -> SpotResult<BatchPrediction> {
        let mut out = BatchPrediction::with_capacity(values.len());
        for (i, &raw) in values.iter().enumerate() {
            let verdict = self.ingest(raw, with_alarm)?;
            out.push(i, &verdict);
        }
        Ok(out)
    }
}
