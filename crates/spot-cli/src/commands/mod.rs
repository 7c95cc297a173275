//! CLI command implementations

pub mod detect;
pub mod fit;
pub mod inspect;
pub mod run;

use serde::Serialize;
use spot_core::{DetectorState, MetricId, Side};
use tabled::Tabled;

use crate::output::fmt_f64;

/// One row per stored detector
#[derive(Serialize, Tabled)]
pub struct DetectorRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "q")]
    pub risk: f64,
    #[tabled(rename = "n")]
    pub observations: u64,
    #[tabled(rename = "Upper init")]
    pub upper_init: String,
    #[tabled(rename = "Upper quantile")]
    pub upper_quantile: String,
    #[tabled(rename = "Upper peaks")]
    pub upper_peaks: u64,
    #[tabled(rename = "Lower init")]
    pub lower_init: String,
    #[tabled(rename = "Lower quantile")]
    pub lower_quantile: String,
    #[tabled(rename = "Lower peaks")]
    pub lower_peaks: u64,
}

impl DetectorRow {
    pub fn new(metric: &MetricId, state: &DetectorState) -> Self {
        let up = state.threshold(Side::Upper);
        let down = state.threshold(Side::Lower);
        Self {
            metric: metric.to_string(),
            risk: state.risk(),
            observations: state.observation_count(),
            upper_init: fmt_f64(up.init_threshold),
            upper_quantile: fmt_f64(up.extreme_quantile),
            upper_peaks: up.peak_count,
            lower_init: fmt_f64(down.init_threshold),
            lower_quantile: fmt_f64(down.extreme_quantile),
            lower_peaks: down.peak_count,
        }
    }
}
