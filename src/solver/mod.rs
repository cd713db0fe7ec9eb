//! Inner least-squares solvers used by the MUPE outer loop.
//!
//! The outer loop only needs two capabilities:
//! - solve a weighted linear least-squares problem (`LinearSolver`)
//! - run a bounded number of weighted nonlinear least-squares iterations from a
//!   starting point (`NonlinearSolver`)
//!
//! Both are traits so the fitters can be driven by alternative solvers (and by
//! recording solvers in tests).

use nalgebra::DVector;
use thiserror::Error;

use crate::domain::{ParameterVector, WeightVector};
use crate::formula::Design;

pub mod levmar;
pub mod linear;
pub mod problem;

pub use levmar::LevenbergMarquardt;
pub use linear::SvdSolver;
pub use problem::NonlinearProblem;

/// Fatal inner solver failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverFailure {
    #[error("design matrix is rank deficient (rank {rank} < {columns} columns)")]
    RankDeficient { rank: usize, columns: usize },

    #[error("least-squares solve produced non-finite coefficients")]
    NonFiniteSolution,

    #[error("singular gradient: parameter '{parameter}' has no influence on the model at the current estimate")]
    SingularGradient { parameter: String },

    #[error("model or its gradient is not finite at observation {observation}")]
    NonFiniteModel { observation: usize },

    #[error("no further reduction of the weighted residual sum of squares is possible ({0})")]
    NoImprovement(String),

    #[error("numerical failure in the nonlinear solver ({0})")]
    Numerical(String),

    #[error("dimension mismatch: {0}")]
    Dimension(String),
}

/// How a nonlinear inner solve ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerStatus {
    Converged,
    /// Stopped at the iteration cap; the estimate is still usable.
    IterationLimit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearSolution {
    pub coefficients: ParameterVector,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    pub std_errors: Option<Vec<f64>>,
    pub weighted_sse: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NonlinearSolution {
    pub params: ParameterVector,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    pub std_errors: Option<Vec<f64>>,
    pub weighted_sse: f64,
    pub status: InnerStatus,
    pub iterations: usize,
}

pub trait LinearSolver {
    /// Solve `min Σ w_i (y_i - x_i'β)^2`; `None` means unit weights.
    fn solve_wls(&self, design: &Design, weights: Option<&WeightVector>) -> Result<LinearSolution, SolverFailure>;
}

pub trait NonlinearSolver {
    /// Minimize `Σ w_i (y_i - f(x_i, θ))^2` starting from `guess`, using at most
    /// `max_iterations` iterations.
    fn solve_nls(
        &self,
        problem: &NonlinearProblem<'_>,
        guess: &ParameterVector,
        weights: &WeightVector,
        max_iterations: usize,
    ) -> Result<NonlinearSolution, SolverFailure>;
}

/// `sqrt(s^2 * diag(cov))` with `s^2 = sse / (n - p)`; `None` without residual degrees of freedom.
pub(crate) fn standard_errors(unscaled_variance: &DVector<f64>, weighted_sse: f64, n: usize) -> Option<Vec<f64>> {
    let p = unscaled_variance.len();
    if n <= p {
        return None;
    }
    let s2 = weighted_sse / (n - p) as f64;
    Some(unscaled_variance.iter().map(|v| (s2 * v).sqrt()).collect())
}
