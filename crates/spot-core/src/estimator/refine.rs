//! Bounded scalar root refinement.
//!
//! The Grimshaw search seeds a regular grid over an interval and refines each
//! seed independently. Any refiner that stays inside the interval and does a
//! bounded amount of work per seed fits the contract.

/// Refines a seed toward a root of `f` inside `[lo, hi]`.
pub trait RootRefiner {
    /// `f` returns the function value and its derivative at a point.
    ///
    /// Must return a point inside `bounds` after a bounded number of
    /// evaluations, converged or not.
    fn refine(&self, f: &dyn Fn(f64) -> (f64, f64), bounds: (f64, f64), seed: f64) -> f64;
}

/// Step halvings tried before a Newton step is given up.
const MAX_HALVINGS: usize = 30;

/// Damped Newton iteration projected onto the search interval.
///
/// Each accepted step strictly reduces `|f|`, so this is also a descent
/// method on `f²` (Gauss-Newton). Worst case per seed:
/// `max_iterations * (MAX_HALVINGS + 1)` evaluations.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ProjectedNewton {
    pub max_iterations: usize,
    /// Residual `|f|` at which iteration stops.
    pub tolerance: f64,
}

impl ProjectedNewton {
    pub fn new(max_iterations: usize, tolerance: f64) -> Self {
        Self {
            max_iterations,
            tolerance,
        }
    }
}

impl RootRefiner for ProjectedNewton {
    fn refine(&self, f: &dyn Fn(f64) -> (f64, f64), bounds: (f64, f64), seed: f64) -> f64 {
        let (lo, hi) = bounds;
        let mut x = seed.clamp(lo, hi);
        let (mut fx, mut dfx) = f(x);

        for _ in 0..self.max_iterations {
            if !fx.is_finite() || fx.abs() <= self.tolerance {
                break;
            }
            if !dfx.is_finite() || dfx.abs() < f64::MIN_POSITIVE {
                break; // flat: no Newton direction
            }

            let mut step = fx / dfx;
            let mut accepted = false;
            for _ in 0..=MAX_HALVINGS {
                let candidate = (x - step).clamp(lo, hi);
                let (fc, dfc) = f(candidate);
                if fc.is_finite() && fc.abs() < fx.abs() {
                    x = candidate;
                    fx = fc;
                    dfx = dfc;
                    accepted = true;
                    break;
                }
                step *= 0.5;
            }
            if !accepted {
                break;
            }
        }

        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_interior_root() {
        let newton = ProjectedNewton::new(50, 1e-14);
        let f = |x: f64| (x * x - 2.0, 2.0 * x);
        let root = newton.refine(&f, (0.0, 5.0), 4.0);
        assert!((root - 2.0_f64.sqrt()).abs() < 1e-10);
    }

    #[test]
    fn stays_inside_bounds() {
        let newton = ProjectedNewton::new(50, 1e-14);
        // Root at 3 lies outside [0, 1]: the best point is the upper bound.
        let f = |x: f64| (x - 3.0, 1.0);
        let x = newton.refine(&f, (0.0, 1.0), 0.5);
        assert!((0.0..=1.0).contains(&x));
        assert_eq!(x, 1.0);
    }

    #[test]
    fn flat_function_returns_seed() {
        let newton = ProjectedNewton::new(50, 1e-14);
        let f = |_: f64| (1.0, 0.0);
        assert_eq!(newton.refine(&f, (-1.0, 1.0), 0.25), 0.25);
    }

    #[test]
    fn evaluation_count_is_bounded() {
        use std::cell::Cell;
        let calls = Cell::new(0usize);
        let newton = ProjectedNewton::new(10, 0.0);
        // Oscillating function: Newton keeps failing to improve.
        let f = |x: f64| {
            calls.set(calls.get() + 1);
            ((10.0 * x).sin() + 2.0, 10.0 * (10.0 * x).cos())
        };
        newton.refine(&f, (-1.0, 1.0), 0.3);
        assert!(calls.get() <= 1 + 10 * (MAX_HALVINGS + 1));
    }
}
