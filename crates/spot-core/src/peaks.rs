//! Per-side peak sets: the excesses over the initial threshold that feed the
//! GPD fit.
//!
//! Each peak is stored twice: as the working-value `level` that crossed the
//! threshold, and as its positive `excess` past the threshold. The estimators
//! only read excesses; the bounded policy needs levels because it moves the
//! threshold and must re-derive every excess from them.

use serde::{Deserialize, Serialize};

use crate::config::PeakPolicy;
use crate::error::{SpotError, SpotResult};
use crate::side::Side;

/// Outcome of offering a new peak to a [`PeakSet`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PeakUpdate {
    /// The peak was appended (unbounded policy).
    Appended,
    /// The least extreme peak was replaced and the side's initial threshold
    /// moved to `threshold` (bounded policy).
    Replaced { threshold: f64 },
    /// The peak was less extreme than every tracked peak; nothing changed.
    Unchanged,
}

impl PeakUpdate {
    /// Whether the peak set changed and the tail must be refitted.
    pub fn changed(&self) -> bool {
        !matches!(self, PeakUpdate::Unchanged)
    }
}

/// Ordered collection of peaks for one side.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakSet {
    side: Side,
    levels: Vec<f64>,
    excesses: Vec<f64>,
    /// `Some` under the bounded policy: the size fixed at calibration.
    capacity: Option<usize>,
}

impl PeakSet {
    /// Build a peak set from the levels that crossed `threshold`.
    pub fn from_levels(side: Side, levels: Vec<f64>, threshold: f64, policy: PeakPolicy) -> Self {
        let excesses = levels.iter().map(|&l| side.excess(l, threshold)).collect();
        let capacity = match policy {
            PeakPolicy::Unbounded => None,
            PeakPolicy::Bounded => Some(levels.len()),
        };
        Self {
            side,
            levels,
            excesses,
            capacity,
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Excesses over the current initial threshold, in insertion order.
    pub fn excesses(&self) -> &[f64] {
        &self.excesses
    }

    /// Working values that produced each excess.
    pub fn levels(&self) -> &[f64] {
        &self.levels
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.excesses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.excesses.is_empty()
    }

    /// Offer `level`, which already lies beyond `threshold` on this side.
    pub fn admit(&mut self, level: f64, threshold: f64) -> PeakUpdate {
        match self.capacity {
            None => {
                self.levels.push(level);
                self.excesses.push(self.side.excess(level, threshold));
                PeakUpdate::Appended
            }
            Some(_) => self.replace_least_extreme(level),
        }
    }

    /// Index of the level closest to the bulk: the minimum for the upper side,
    /// the maximum for the lower side. Ties resolve to the first occurrence.
    pub fn least_extreme_index(&self) -> Option<usize> {
        let side = self.side;
        self.levels
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (i, &l)| match best {
                Some((_, b)) if !side.beyond(b, l) => best,
                _ => Some((i, l)),
            })
            .map(|(i, _)| i)
    }

    fn replace_least_extreme(&mut self, level: f64) -> PeakUpdate {
        let Some(idx) = self.least_extreme_index() else {
            return PeakUpdate::Unchanged;
        };
        let current = self.levels[idx];
        if !self.side.beyond(level, current) {
            return PeakUpdate::Unchanged;
        }

        let weight = match (self.side, current > 0.0) {
            (Side::Upper, true) | (Side::Lower, false) => 0.99,
            (Side::Upper, false) | (Side::Lower, true) => 1.01,
        };
        let threshold = weight * current;
        let side = self.side;

        self.levels[idx] = level;
        self.levels.retain(|&l| side.beyond(l, threshold));
        self.excesses = self
            .levels
            .iter()
            .map(|&l| side.excess(l, threshold))
            .collect();

        PeakUpdate::Replaced { threshold }
    }

    /// Structural checks applied to restored state.
    pub fn validate(&self) -> SpotResult<()> {
        if self.levels.len() != self.excesses.len() {
            return Err(SpotError::CorruptState(format!(
                "{} peak set has {} levels but {} excesses",
                self.side,
                self.levels.len(),
                self.excesses.len()
            )));
        }
        if let Some(cap) = self.capacity {
            if self.len() > cap {
                return Err(SpotError::CorruptState(format!(
                    "{} peak set holds {} peaks over capacity {}",
                    self.side,
                    self.len(),
                    cap
                )));
            }
        }
        if let Some(bad) = self
            .excesses
            .iter()
            .chain(self.levels.iter())
            .find(|v| !v.is_finite())
        {
            return Err(SpotError::CorruptState(format!(
                "{} peak set contains non-finite value {}",
                self.side, bad
            )));
        }
        if let Some(bad) = self.excesses.iter().find(|&&e| e <= 0.0) {
            return Err(SpotError::CorruptState(format!(
                "{} peak set contains non-positive excess {}",
                self.side, bad
            )));
        }
        Ok(())
    }
}
