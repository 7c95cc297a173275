//! Detrending against a local baseline.
//!
//! Calibration removes a backward moving average from the batch; streaming
//! keeps the last `depth` raw readings in a [`SlidingWindow`] and recomputes
//! the baseline from the whole window on every reading (no running
//! accumulator survives between readings).

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::config::BaselineKind;
use crate::error::{SpotError, SpotResult};

/// Fixed-depth FIFO of the most recent raw readings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlidingWindow {
    depth: usize,
    values: VecDeque<f64>,
}

impl SlidingWindow {
    /// Seed the window with the trailing `depth` values of `history`.
    pub fn seed(history: &[f64], depth: usize) -> SpotResult<Self> {
        if depth == 0 || history.len() < depth {
            return Err(SpotError::InsufficientCalibrationData(format!(
                "window of depth {} needs at least {} readings, got {}",
                depth,
                depth,
                history.len()
            )));
        }
        let values = history[history.len() - depth..].iter().copied().collect();
        Ok(Self { depth, values })
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Readings from oldest to newest.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied()
    }

    /// Local baseline `M_i` over the current window.
    pub fn baseline(&self, kind: BaselineKind) -> f64 {
        match kind {
            BaselineKind::Ewma { alpha } => ewma(self.values(), alpha),
            BaselineKind::MovingAverage => {
                self.values.iter().sum::<f64>() / self.values.len() as f64
            }
        }
    }

    /// Drop the oldest reading and append `raw`.
    pub fn advance(&mut self, raw: f64) {
        self.values.pop_front();
        self.values.push_back(raw);
    }

    pub fn validate(&self) -> SpotResult<()> {
        if self.depth == 0 || self.values.len() != self.depth {
            return Err(SpotError::CorruptState(format!(
                "sliding window holds {} readings but has depth {}",
                self.values.len(),
                self.depth
            )));
        }
        if self.values.iter().any(|v| !v.is_finite()) {
            return Err(SpotError::CorruptState(
                "sliding window contains a non-finite reading".into(),
            ));
        }
        Ok(())
    }
}

/// EWMA of `values`, seeded with the first one; returns the last smoothed value.
pub fn ewma(values: impl IntoIterator<Item = f64>, alpha: f64) -> f64 {
    let mut iter = values.into_iter();
    let Some(first) = iter.next() else {
        return f64::NAN;
    };
    iter.fold(first, |s, x| alpha * x + (1.0 - alpha) * s)
}

/// Backward moving averages of window `depth`.
///
/// Element `i` is the mean of `x[i..i + depth]`; the output has
/// `x.len() - depth + 1` elements.
pub fn backward_means(x: &[f64], depth: usize) -> Vec<f64> {
    if depth == 0 || x.len() < depth {
        return Vec::new();
    }
    let d = depth as f64;
    let mut sum: f64 = x[..depth].iter().sum();
    let mut means = Vec::with_capacity(x.len() - depth + 1);
    means.push(sum / d);
    for i in depth..x.len() {
        sum = sum - x[i - depth] + x[i];
        means.push(sum / d);
    }
    means
}

/// Subtract from each sample the mean of the `depth` samples before it.
///
/// The first `depth` samples have no full window and are dropped.
pub fn detrend_batch(x: &[f64], depth: usize) -> Vec<f64> {
    let means = backward_means(x, depth);
    x.iter()
        .skip(depth)
        .zip(means.iter())
        .map(|(&xi, &m)| xi - m)
        .collect()
}
