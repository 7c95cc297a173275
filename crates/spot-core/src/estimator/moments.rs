//! Method-of-moments GPD fit.
//!
//! Cheap closed form, biased for heavy tails:
//! `sigma = mean/2 * (mean²/var + 1)`, `gamma = (mean²/var - 1)/2`.

use crate::error::{SpotError, SpotResult};

use super::{mean, GpdEstimator, GpdFit};

#[derive(Clone, Copy, Debug, Default)]
pub struct MomentEstimator;

impl GpdEstimator for MomentEstimator {
    fn fit(&self, y: &[f64]) -> SpotResult<GpdFit> {
        let avg = mean(y);
        // population variance
        let var = y.iter().map(|&yi| (yi - avg) * (yi - avg)).sum::<f64>() / y.len() as f64;
        if var == 0.0 {
            return Err(SpotError::DegenerateVariance { count: y.len() });
        }

        let ratio = avg * avg / var;
        Ok(GpdFit {
            gamma: 0.5 * (ratio - 1.0),
            sigma: 0.5 * avg * (ratio + 1.0),
            log_likelihood: None,
        })
    }

    fn name(&self) -> &str {
        "moments"
    }
}
