//! Maximum-likelihood GPD fit via Grimshaw's reduction.
//!
//! The two-parameter likelihood maximisation reduces to finding the roots of
//! the scalar function
//!
//! ```text
//!   w(t) = u(1 + tY) * v(1 + tY) - 1
//!   u(s) = 1 + mean(ln s)        v(s) = mean(1 / s)
//! ```
//!
//! Every root `t` yields a candidate `gamma = u(1 + tY) - 1`,
//! `sigma = gamma / t`; the exponential solution `(0, mean)` is always a
//! candidate, and the best log-likelihood wins.

use tracing::trace;

use crate::config::GrimshawConfig;
use crate::error::SpotResult;

use super::refine::{ProjectedNewton, RootRefiner};
use super::{log_likelihood, mean, GpdEstimator, GpdFit};

/// Roots closer than this many decimals are treated as one candidate.
const ROOT_DEDUP_DECIMALS: i32 = 5;

/// Grimshaw estimator, generic over the root refiner.
#[derive(Clone, Debug)]
pub struct GrimshawEstimator<R = ProjectedNewton> {
    config: GrimshawConfig,
    refiner: R,
}

impl GrimshawEstimator<ProjectedNewton> {
    pub fn new(config: GrimshawConfig) -> Self {
        let refiner = ProjectedNewton::new(config.max_iterations, config.tolerance);
        Self { config, refiner }
    }
}

impl<R: RootRefiner> GrimshawEstimator<R> {
    /// Use a custom root refiner.
    pub fn with_refiner(config: GrimshawConfig, refiner: R) -> Self {
        Self { config, refiner }
    }

    /// Left and right search intervals for the roots of `w`.
    ///
    /// Either interval may come back empty (e.g. the right one when all
    /// excesses are equal); callers skip those.
    pub fn search_intervals(&self, y: &[f64]) -> [(f64, f64); 2] {
        let y_min = y.iter().copied().fold(f64::INFINITY, f64::min);
        let y_max = y.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let y_mean = mean(y);

        let mut epsilon = self.config.epsilon;
        let a = -1.0 / y_max;
        if a.abs() < 2.0 * epsilon {
            epsilon = a.abs() / self.config.n_points as f64;
        }
        let a = a + epsilon;
        let b = 2.0 * (y_mean - y_min) / (y_mean * y_min);
        let c = 2.0 * (y_mean - y_min) / (y_min * y_min);

        [(a + epsilon, -epsilon), (b, c)]
    }

    /// Candidate roots of `w`, deduplicated.
    fn roots(&self, y: &[f64]) -> Vec<f64> {
        let w = |t: f64| w_with_derivative(y, t);
        let n_points = self.config.n_points;
        let mut roots: Vec<f64> = Vec::with_capacity(2 * n_points);

        for (lo, hi) in self.search_intervals(y) {
            if !(lo.is_finite() && hi.is_finite() && lo < hi) {
                trace!(lo, hi, "skipping empty search interval");
                continue;
            }
            let step = (hi - lo) / (n_points + 1) as f64;
            for k in 1..=n_points {
                let seed = lo + step * k as f64;
                roots.push(self.refiner.refine(&w, (lo, hi), seed));
            }
        }

        let scale = 10f64.powi(ROOT_DEDUP_DECIMALS);
        let mut seen: Vec<i64> = Vec::with_capacity(roots.len());
        roots.retain(|&t| {
            let key = (t * scale).round() as i64;
            if seen.contains(&key) {
                false
            } else {
                seen.push(key);
                true
            }
        });
        roots
    }
}

impl<R: RootRefiner> GpdEstimator for GrimshawEstimator<R> {
    fn fit(&self, y: &[f64]) -> SpotResult<GpdFit> {
        let y_mean = mean(y);
        let mut best = GpdFit {
            gamma: 0.0,
            sigma: y_mean,
            log_likelihood: Some(log_likelihood(y, 0.0, y_mean)),
        };
        let mut best_ll = best.log_likelihood.unwrap_or(f64::NEG_INFINITY);

        for t in self.roots(y) {
            if t == 0.0 {
                continue;
            }
            let gamma = u(y, t) - 1.0;
            let sigma = gamma / t;
            if !(gamma.is_finite() && sigma.is_finite() && sigma > 0.0) {
                continue;
            }
            let ll = log_likelihood(y, gamma, sigma);
            if ll.is_finite() && ll > best_ll {
                best_ll = ll;
                best = GpdFit {
                    gamma,
                    sigma,
                    log_likelihood: Some(ll),
                };
            }
        }

        trace!(
            peaks = y.len(),
            gamma = best.gamma,
            sigma = best.sigma,
            ll = best_ll,
            "grimshaw fit"
        );
        Ok(best)
    }

    fn name(&self) -> &str {
        "grimshaw"
    }
}

/// `u(1 + tY) = 1 + mean(ln(1 + t*y))`.
fn u(y: &[f64], t: f64) -> f64 {
    1.0 + y.iter().map(|&yi| (1.0 + t * yi).ln()).sum::<f64>() / y.len() as f64
}

/// `w(t)` and `w'(t)` in a single pass over the excesses.
fn w_with_derivative(y: &[f64], t: f64) -> (f64, f64) {
    let n = y.len() as f64;
    let (mut sum_ln, mut sum_inv, mut sum_inv_sq) = (0.0, 0.0, 0.0);
    for &yi in y {
        let s = 1.0 + t * yi;
        let inv = 1.0 / s;
        sum_ln += s.ln();
        sum_inv += inv;
        sum_inv_sq += inv * inv;
    }
    let us = 1.0 + sum_ln / n;
    let vs = sum_inv / n;
    let jac_us = (1.0 - vs) / t;
    let jac_vs = (sum_inv_sq / n - vs) / t;
    (us * vs - 1.0, us * jac_vs + vs * jac_us)
}
