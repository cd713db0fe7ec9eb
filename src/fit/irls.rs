//! Pieces shared by both MUPE fitters.
//!
//! MUPE is an iteratively reweighted least-squares scheme in which every
//! observation is weighted by the inverse square of its previous fitted value:
//!
//! ```text
//! w_i = 1 / fitted_i^2
//! ```
//!
//! Iteration stops once the largest relative parameter change drops to the
//! tolerance, or when the iteration cap is reached.

use serde::{Deserialize, Serialize};

use crate::domain::{ParameterVector, WeightVector};
use crate::error::MupeError;
use crate::solver::SolverFailure;

pub const DEFAULT_TOLERANCE: f64 = 1e-5;
pub const DEFAULT_MAX_ITERATIONS: usize = 200;
pub const DEFAULT_MAX_INNER_ITERATIONS: usize = 10;

/// Outer-loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MupeOptions {
    /// Stop once `max_j |(new_j - old_j) / new_j|` is at or below this.
    pub tolerance: f64,
    /// Cap on outer iterations (solver passes).
    pub max_iterations: usize,
    /// Cap on inner iterations per nonlinear solve.
    pub max_inner_iterations: usize,
}

impl Default for MupeOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            max_inner_iterations: DEFAULT_MAX_INNER_ITERATIONS,
        }
    }
}

impl MupeOptions {
    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_max_inner_iterations(mut self, max_inner_iterations: usize) -> Self {
        self.max_inner_iterations = max_inner_iterations;
        self
    }

    pub fn validate(&self) -> Result<(), MupeError> {
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(MupeError::InvalidOption {
                name: "tolerance",
                reason: format!("must be a positive number, got {}", self.tolerance),
            });
        }
        if self.max_iterations == 0 {
            return Err(MupeError::InvalidOption {
                name: "max_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.max_inner_iterations == 0 {
            return Err(MupeError::InvalidOption {
                name: "max_inner_iterations",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// `max_j |(new_j - old_j) / new_j|`.
///
/// An unchanged component contributes zero (including `0 -> 0`); a component
/// that moves to exactly zero, or is not finite on either side, contributes
/// infinity.
pub fn relative_change(old: &[f64], new: &[f64]) -> f64 {
    debug_assert_eq!(old.len(), new.len());
    old.iter()
        .zip(new)
        .map(|(o, n)| {
            if !(o.is_finite() && n.is_finite()) {
                f64::INFINITY
            } else if o == n {
                0.0
            } else if *n == 0.0 {
                f64::INFINITY
            } else {
                ((n - o) / n).abs()
            }
        })
        .fold(0.0, f64::max)
}

/// Reject a solver result with a non-finite parameter.
pub(crate) fn ensure_finite(params: &ParameterVector) -> Result<(), MupeError> {
    if params.values().iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(SolverFailure::NonFiniteSolution.into())
    }
}

/// MUPE weights `1 / fitted_i^2`.
pub fn inverse_square_weights(fitted: &[f64]) -> Result<WeightVector, MupeError> {
    let mut weights = Vec::with_capacity(fitted.len());
    for (observation, &f) in fitted.iter().enumerate() {
        if !f.is_finite() {
            return Err(MupeError::NonFiniteFittedValue { observation, value: f });
        }
        let f2 = f * f;
        // f^2 can underflow to zero for tiny fitted values.
        if f2 == 0.0 {
            return Err(MupeError::DivisionByZeroInWeighting { observation });
        }
        weights.push(1.0 / f2);
    }
    Ok(WeightVector::from_vec(weights))
}
