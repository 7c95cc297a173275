//! Multi-metric monitoring.
//!
//! A [`MonitorSet`] keeps one [`StreamProcessor`] per metric and records the
//! alarms they raise as [`AlarmEvent`]s in a bounded history.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::SpotConfig;
use crate::error::{SpotError, SpotResult};
use crate::side::Side;
use crate::state::DetectorState;
use crate::stream::{BatchPrediction, StreamProcessor, Verdict};

/// Alarm events kept by default.
pub const MAX_ALARMS: usize = 256;

// ── Metric Identification ───────────────────────────────────────────────

/// Identifies a monitored series.
///
/// Format: `"{source}.{metric}"`, e.g. `"db-primary.latency_ms"`; bare names
/// are accepted too.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MetricId(pub String);

impl MetricId {
    pub fn new(source: &str, metric: &str) -> Self {
        Self(format!("{}.{}", source, metric))
    }

    /// Portion before the first dot.
    pub fn source(&self) -> &str {
        self.0.split('.').next().unwrap_or(&self.0)
    }

    /// Portion after the first dot, or the whole id when there is none.
    pub fn metric(&self) -> &str {
        self.0.split_once('.').map(|(_, m)| m).unwrap_or(&self.0)
    }
}

impl std::fmt::Display for MetricId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MetricId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

// ── Alarm Events ────────────────────────────────────────────────────────

/// One alarm raised by a monitored metric.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    pub id: uuid::Uuid,
    pub metric: MetricId,
    pub side: Side,
    /// Raw reading that crossed the threshold.
    pub value: f64,
    /// Threshold it crossed (baseline included).
    pub threshold: f64,
    /// Position of the reading among those this set has observed for the
    /// metric since it was last calibrated or restored (0-based).
    pub index: u64,
    pub raised_at: DateTime<Utc>,
}

// ── Monitor Set ─────────────────────────────────────────────────────────

#[derive(Clone, Debug)]
struct Monitored {
    processor: StreamProcessor,
    readings: u64,
}

impl Monitored {
    fn new(processor: StreamProcessor) -> Self {
        Self {
            processor,
            readings: 0,
        }
    }
}

/// Independent detectors keyed by metric.
#[derive(Debug)]
pub struct MonitorSet {
    config: SpotConfig,
    metrics: HashMap<MetricId, Monitored>,
    alarms: VecDeque<AlarmEvent>,
    max_alarms: usize,
}

impl MonitorSet {
    /// New set whose detectors default to `config`.
    pub fn new(config: SpotConfig) -> Self {
        Self::with_alarm_capacity(config, MAX_ALARMS)
    }

    pub fn with_alarm_capacity(config: SpotConfig, max_alarms: usize) -> Self {
        Self {
            config,
            metrics: HashMap::new(),
            alarms: VecDeque::new(),
            max_alarms,
        }
    }

    pub fn config(&self) -> &SpotConfig {
        &self.config
    }

    /// Calibrate (or recalibrate) `metric` with the set's default config.
    pub fn calibrate(&mut self, metric: MetricId, batch: &[f64]) -> SpotResult<()> {
        let config = self.config.clone();
        self.calibrate_with(metric, config, batch)
    }

    /// Calibrate `metric` with its own configuration.
    ///
    /// A failed calibration leaves any existing detector for `metric` as it was.
    pub fn calibrate_with(
        &mut self,
        metric: MetricId,
        config: SpotConfig,
        batch: &[f64],
    ) -> SpotResult<()> {
        let mut processor = StreamProcessor::new(config);
        processor.fit(batch)?;
        info!(%metric, readings = batch.len(), "metric calibrated");
        self.metrics.insert(metric, Monitored::new(processor));
        Ok(())
    }

    /// Feed one reading of `metric`.
    pub fn observe(&mut self, metric: &MetricId, value: f64, with_alarm: bool) -> SpotResult<Verdict> {
        let entry = self
            .metrics
            .get_mut(metric)
            .ok_or_else(|| SpotError::UnknownMetric(metric.to_string()))?;

        let verdict = match entry.processor.ingest(value, with_alarm) {
            Ok(v) => v,
            Err(e) => {
                if entry.processor.is_faulted() {
                    warn!(%metric, error = %e, "metric detector faulted");
                }
                return Err(e);
            }
        };
        let index = entry.readings;
        entry.readings += 1;

        if let Some(side) = verdict.alarm_side() {
            let event = AlarmEvent {
                id: uuid::Uuid::new_v4(),
                metric: metric.clone(),
                side,
                value,
                threshold: verdict.threshold(side),
                index,
                raised_at: Utc::now(),
            };
            info!(
                %metric,
                %side,
                value,
                threshold = event.threshold,
                index,
                "extreme value alarm"
            );
            self.push_alarm(event);
        }
        Ok(verdict)
    }

    /// Feed `values` of `metric` in order, stopping at the first error.
    pub fn observe_batch(
        &mut self,
        metric: &MetricId,
        values: &[f64],
        with_alarm: bool,
    ) -> SpotResult<BatchPrediction> {
        let mut out = BatchPrediction::default();
        for (i, &v) in values.iter().enumerate() {
            let verdict = self.observe(metric, v, with_alarm)?;
            if verdict.alarm {
                out.alarms.push(i);
            }
            out.upper_thresholds.push(verdict.upper_threshold);
            out.lower_thresholds.push(verdict.lower_threshold);
        }
        Ok(out)
    }

    fn push_alarm(&mut self, event: AlarmEvent) {
        self.alarms.push_back(event);
        while self.alarms.len() > self.max_alarms {
            self.alarms.pop_front();
        }
    }

    /// Most recent alarms, oldest first.
    pub fn recent_alarms(&self) -> impl Iterator<Item = &AlarmEvent> {
        self.alarms.iter()
    }

    pub fn alarm_count(&self) -> usize {
        self.alarms.len()
    }

    pub fn contains(&self, metric: &MetricId) -> bool {
        self.metrics.contains_key(metric)
    }

    pub fn metrics(&self) -> impl Iterator<Item = &MetricId> {
        self.metrics.keys()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn processor(&self, metric: &MetricId) -> Option<&StreamProcessor> {
        self.metrics.get(metric).map(|m| &m.processor)
    }

    pub fn state(&self, metric: &MetricId) -> Option<&DetectorState> {
        self.processor(metric).and_then(StreamProcessor::state)
    }

    pub fn remove(&mut self, metric: &MetricId) -> Option<StreamProcessor> {
        self.metrics.remove(metric).map(|m| m.processor)
    }

    /// Snapshot of every calibrated detector. Faulted ones are skipped.
    pub fn states(&self) -> HashMap<MetricId, DetectorState> {
        self.metrics
            .iter()
            .filter_map(|(id, m)| m.processor.state().map(|s| (id.clone(), s.clone())))
            .collect()
    }

    /// Install previously saved detectors, replacing same-named ones.
    ///
    /// Alarm indices of restored metrics count from 0 again.
    pub fn restore(&mut self, states: HashMap<MetricId, DetectorState>) -> SpotResult<()> {
        for state in states.values() {
            state.validate()?;
        }
        let count = states.len();
        for (id, state) in states {
            self.metrics
                .insert(id, Monitored::new(StreamProcessor::from_state(state)));
        }
        info!(count, "detectors restored");
        Ok(())
    }
}
