//! Extreme quantile of a fitted tail.
//!
//! With `r = n * q / Nt`, the level-`1 - q` quantile of the GPD tail sitting
//! on `init_threshold` is
//!
//! ```text
//!   upper:  t + (σ/γ)(r^(-γ) - 1)      (γ = 0:  t - σ ln r)
//!   lower:  t - (σ/γ)(r^(-γ) - 1)      (γ = 0:  t + σ ln r)
//! ```

use crate::error::{SpotError, SpotResult};
use crate::side::Side;

/// Inputs of a quantile evaluation for one side.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuantileInput {
    pub gamma: f64,
    pub sigma: f64,
    /// Observations seen so far (n).
    pub observation_count: u64,
    /// Peaks in the side's set (Nt).
    pub peak_count: u64,
    pub init_threshold: f64,
    /// Risk q.
    pub risk: f64,
}

/// Compute the extreme quantile for `side`.
///
/// Fails with [`SpotError::ZeroPeakCount`] when `Nt == 0` and with
/// [`SpotError::NonFiniteThreshold`] when the formula does not produce a
/// finite number.
pub fn quantile(side: Side, input: QuantileInput) -> SpotResult<f64> {
    let QuantileInput {
        gamma,
        sigma,
        observation_count,
        peak_count,
        init_threshold,
        risk,
    } = input;

    if peak_count == 0 {
        return Err(SpotError::ZeroPeakCount { side });
    }

    let r = observation_count as f64 * risk / peak_count as f64;
    let offset = if gamma != 0.0 {
        (sigma / gamma) * (r.powf(-gamma) - 1.0)
    } else {
        -sigma * r.ln()
    };
    let value = match side {
        Side::Upper => init_threshold + offset,
        Side::Lower => init_threshold - offset,
    };

    if value.is_finite() {
        Ok(value)
    } else {
        Err(SpotError::NonFiniteThreshold { side, gamma, sigma })
    }
}
