//! Weighted nonlinear least squares on the `levenberg-marquardt` crate.
//!
//! The crate minimizes `||r(θ)||^2` for residuals `r = sqrt(W)(y - f(θ))`; this
//! module only adapts a [`NonlinearProblem`] to its `LeastSquaresProblem` trait
//! and translates its termination reasons into [`InnerStatus`] / [`SolverFailure`].
//!
//! The inner iteration cap becomes the crate's patience, which bounds the
//! number of model evaluations to `max_iterations * (p + 1)`.

use std::cell::RefCell;

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt as Minimizer, TerminationReason};
use log::trace;
use nalgebra::storage::Owned;
use nalgebra::{DMatrix, DVector, Dyn};

use crate::domain::{ParameterVector, WeightVector};
use crate::solver::{InnerStatus, NonlinearProblem, NonlinearSolution, NonlinearSolver, SolverFailure, standard_errors};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevenbergMarquardt {
    /// Relative reduction of the weighted SSE below which the solve has converged.
    pub ftol: f64,
    /// Relative step size below which the solve has converged.
    pub xtol: f64,
    /// Largest cosine between residuals and a Jacobian column at a stationary point.
    pub gtol: f64,
}

impl Default for LevenbergMarquardt {
    fn default() -> Self {
        Self {
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-12,
        }
    }
}

/// A `NonlinearProblem` at fixed weights, holding the crate's current parameters.
struct WeightedProblem<'p, 'a> {
    problem: &'p NonlinearProblem<'a>,
    sqrt_w: Vec<f64>,
    params: DVector<f64>,
    failure: RefCell<Option<SolverFailure>>,
}

impl WeightedProblem<'_, '_> {
    fn record<T>(&self, result: Result<T, SolverFailure>) -> Option<T> {
        result.map_err(|e| *self.failure.borrow_mut() = Some(e)).ok()
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for WeightedProblem<'_, '_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, params: &DVector<f64>) {
        self.params = params.clone();
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.record(self.problem.weighted_residuals(self.params.as_slice(), &self.sqrt_w))
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        self.record(self.problem.weighted_jacobian(self.params.as_slice(), &self.sqrt_w))
    }
}

impl NonlinearSolver for LevenbergMarquardt {
    fn solve_nls(
        &self,
        problem: &NonlinearProblem<'_>,
        guess: &ParameterVector,
        weights: &WeightVector,
        max_iterations: usize,
    ) -> Result<NonlinearSolution, SolverFailure> {
        let n = problem.n_obs();
        if guess.names() != problem.param_names() {
            return Err(SolverFailure::Dimension(format!(
                "guess names [{}] do not match problem parameters [{}]",
                guess.names().join(", "),
                problem.param_names().join(", ")
            )));
        }
        if weights.len() != n {
            return Err(SolverFailure::Dimension(format!(
                "{} weights for {n} observations",
                weights.len()
            )));
        }

        let sqrt_w: Vec<f64> = weights.iter().map(f64::sqrt).collect();

        // A parameter the model does not respond to leaves J'WJ singular.
        let jac = problem.weighted_jacobian(guess.values(), &sqrt_w)?;
        if let Some(j) = (0..jac.ncols()).find(|&j| jac.column(j).iter().all(|v| *v == 0.0)) {
            return Err(SolverFailure::SingularGradient {
                parameter: problem.param_names()[j].clone(),
            });
        }

        let target = WeightedProblem {
            problem,
            sqrt_w,
            params: DVector::from_column_slice(guess.values()),
            failure: RefCell::new(None),
        };
        let (target, report) = Minimizer::new()
            .with_ftol(self.ftol)
            .with_xtol(self.xtol)
            .with_gtol(self.gtol)
            .with_patience(max_iterations)
            .minimize(target);
        trace!(
            "levenberg-marquardt: {:?} after {} evaluations",
            report.termination, report.number_of_evaluations
        );

        let status = match report.termination {
            TerminationReason::Converged { .. } | TerminationReason::ResidualsZero | TerminationReason::Orthogonal => {
                InnerStatus::Converged
            }
            TerminationReason::LostPatience => InnerStatus::IterationLimit,
            TerminationReason::User(what) => {
                return Err(target
                    .failure
                    .into_inner()
                    .unwrap_or_else(|| SolverFailure::Numerical(format!("{what} could not be evaluated"))));
            }
            TerminationReason::Numerical(what) => return Err(SolverFailure::Numerical(what.to_string())),
            TerminationReason::NoImprovementPossible(what) => {
                return Err(SolverFailure::NoImprovement(what.to_string()));
            }
            TerminationReason::NoParameters | TerminationReason::NoResiduals => {
                return Err(SolverFailure::Dimension(format!(
                    "{} parameters for {n} observations",
                    problem.n_params()
                )));
            }
            TerminationReason::WrongDimensions(what) => return Err(SolverFailure::Dimension(what.to_string())),
        };

        let values: Vec<f64> = target.params.iter().copied().collect();
        if values.iter().any(|v| !v.is_finite()) {
            return Err(SolverFailure::NonFiniteSolution);
        }
        let sse = problem.weighted_residuals(&values, &target.sqrt_w)?.norm_squared();
        let fitted = problem.predict(&values);
        let residuals: Vec<f64> = problem
            .response()
            .iter()
            .zip(&fitted)
            .map(|(y, f)| y - f)
            .collect();

        let std_errors = problem
            .weighted_jacobian(&values, &target.sqrt_w)
            .ok()
            .and_then(|jac| (jac.transpose() * &jac).cholesky())
            .and_then(|chol| standard_errors(&chol.inverse().diagonal(), sse, n));

        Ok(NonlinearSolution {
            params: guess.with_values(values),
            fitted,
            residuals,
            std_errors,
            weighted_sse: sse,
            status,
            iterations: report.number_of_evaluations,
        })
    }
}
