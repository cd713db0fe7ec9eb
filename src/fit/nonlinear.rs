//! Nonlinear MUPE fitter.
//!
//! The first pass solves the unweighted problem from the user's starting values.
//! Every later pass starts from the previous estimate with weights
//! `1 / fitted^2` taken from that estimate.
//!
//! Each pass runs the inner solver for at most `max_inner_iterations`; an inner
//! solve that stops at that cap is logged and counted, not treated as failure.

use log::{debug, info, warn};

use crate::data::DataTable;
use crate::domain::{FitKind, FitResult, ParameterVector, WeightVector};
use crate::error::MupeError;
use crate::fit::irls::{MupeOptions, ensure_finite, inverse_square_weights, relative_change};
use crate::formula::ModelSpec;
use crate::solver::{InnerStatus, LevenbergMarquardt, NonlinearProblem, NonlinearSolver};

#[derive(Debug, Clone, Default)]
pub struct NonlinearMupe<S = LevenbergMarquardt> {
    solver: S,
    options: MupeOptions,
}

impl NonlinearMupe<LevenbergMarquardt> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: NonlinearSolver> NonlinearMupe<S> {
    pub fn with_solver(solver: S) -> Self {
        Self {
            solver,
            options: MupeOptions::default(),
        }
    }

    pub fn with_options(mut self, options: MupeOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &MupeOptions {
        &self.options
    }

    pub fn solver(&self) -> &S {
        &self.solver
    }

    pub fn fit(&self, spec: &ModelSpec, data: &DataTable, guess: &ParameterVector) -> Result<FitResult, MupeError> {
        self.options.validate()?;
        let problem = NonlinearProblem::new(spec, data, guess)?;
        info!(
            "nonlinear MUPE: '{spec}' on {} observations from {guess}",
            problem.n_obs()
        );

        let mut weights = WeightVector::unit(problem.n_obs());
        let mut previous = guess.clone();
        let mut iterations = 0;
        let mut inner_warnings = 0;

        let (solution, weights, change) = loop {
            let solution = self
                .solver
                .solve_nls(&problem, &previous, &weights, self.options.max_inner_iterations)?;
            ensure_finite(&solution.params)?;
            iterations += 1;
            if solution.status == InnerStatus::IterationLimit {
                inner_warnings += 1;
                warn!(
                    "nonlinear MUPE iteration {iterations}: inner solver stopped at its cap of {} iterations",
                    self.options.max_inner_iterations
                );
            }

            // Reweight before the convergence check: a zero fitted value is
            // fatal even on the pass that would otherwise converge.
            let next_weights = inverse_square_weights(&solution.fitted)?;
            let change = relative_change(previous.values(), solution.params.values());
            debug!("nonlinear MUPE iteration {iterations}: relative change {change:.3e}");

            if change <= self.options.tolerance || iterations >= self.options.max_iterations {
                break (solution, weights, change);
            }

            previous = solution.params;
            weights = next_weights;
        };
        let converged = change <= self.options.tolerance;

        if converged {
            info!("nonlinear MUPE converged after {iterations} iterations");
        } else {
            warn!(
                "nonlinear MUPE stopped at the iteration cap ({}) without converging",
                self.options.max_iterations
            );
        }

        Ok(FitResult {
            kind: FitKind::Nonlinear,
            model: spec.clone(),
            params: solution.params,
            std_errors: solution.std_errors,
            fitted: solution.fitted,
            residuals: solution.residuals,
            weights,
            iterations,
            convergence: Some(change),
            converged,
            inner_warnings,
            initial_guess: Some(guess.clone()),
        })
    }
}

/// Fit a nonlinear MUPE model with the default solver and options.
pub fn fit_nonlinear(spec: &ModelSpec, data: &DataTable, guess: &ParameterVector) -> Result<FitResult, MupeError> {
    NonlinearMupe::new().fit(spec, data, guess)
}
