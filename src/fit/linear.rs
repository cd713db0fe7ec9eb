//! Linear MUPE fitter.
//!
//! Loop:
//! - iteration 1 is the unweighted least-squares fit
//! - reweight with `1 / fitted^2` from the current fit and refit
//! - stop once the relative coefficient change is within tolerance
//!
//! Hitting the iteration cap is not an error: the last fit is returned with
//! `converged = false`.

use log::{debug, info, warn};

use crate::data::DataTable;
use crate::domain::{FitKind, FitResult, WeightVector};
use crate::error::MupeError;
use crate::fit::irls::{MupeOptions, ensure_finite, inverse_square_weights, relative_change};
use crate::formula::ModelSpec;
use crate::solver::{LinearSolver, SvdSolver};

#[derive(Debug, Clone, Default)]
pub struct LinearMupe<S = SvdSolver> {
    solver: S,
    options: MupeOptions,
}

impl LinearMupe<SvdSolver> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<S: LinearSolver> LinearMupe<S> {
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

    pub fn fit(&self, spec: &ModelSpec, data: &DataTable) -> Result<FitResult, MupeError> {
        self.options.validate()?;
        let design = spec.linear_design(data)?;
        if design.n_rows() < design.n_columns() {
            return Err(MupeError::TooFewObservations {
                required: design.n_columns(),
                available: design.n_rows(),
            });
        }
        info!(
            "linear MUPE: '{spec}' on {} observations, {} coefficients",
            design.n_rows(),
            design.n_columns()
        );

        let mut current = self.solver.solve_wls(&design, None)?;
        ensure_finite(&current.coefficients)?;
        let mut weights = WeightVector::unit(design.n_rows());
        let mut iterations = 1;
        let mut convergence = None;
        let mut converged = false;

        while iterations < self.options.max_iterations {
            let next_weights = inverse_square_weights(&current.fitted)?;
            let next = self.solver.solve_wls(&design, Some(&next_weights))?;
            ensure_finite(&next.coefficients)?;
            let change = relative_change(current.coefficients.values(), next.coefficients.values());
            iterations += 1;
            debug!("linear MUPE iteration {iterations}: relative change {change:.3e}");

            current = next;
            weights = next_weights;
            convergence = Some(change);
            if change <= self.options.tolerance {
                converged = true;
                break;
            }
        }

        if converged {
            info!("linear MUPE converged after {iterations} iterations");
        } else {
            warn!(
                "linear MUPE stopped at the iteration cap ({}) without converging",
                self.options.max_iterations
            );
        }

        Ok(FitResult {
            kind: FitKind::Linear,
            model: spec.clone(),
            params: current.coefficients,
            std_errors: current.std_errors,
            fitted: current.fitted,
            residuals: current.residuals,
            weights,
            iterations,
            convergence,
            converged,
            inner_warnings: 0,
            initial_guess: None,
        })
    }
}

/// Fit a linear MUPE model with the default solver and options.
pub fn fit_linear(spec: &ModelSpec, data: &DataTable) -> Result<FitResult, MupeError> {
    LinearMupe::new().fit(spec, data)
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::formula::Design;
    use crate::solver::{LinearSolution, SolverFailure};

    /// Delegates to `SvdSolver` and records every call.
    #[derive(Default)]
    struct Recording {
        calls: RefCell<Vec<(Option<WeightVector>, LinearSolution)>>,
    }

    impl LinearSolver for Recording {
        fn solve_wls(&self, design: &Design, weights: Option<&WeightVector>) -> Result<LinearSolution, SolverFailure> {
            let sol = SvdSolver.solve_wls(design, weights)?;
            self.calls.borrow_mut().push((weights.cloned(), sol.clone()));
            Ok(sol)
        }
    }

    fn exact_table() -> DataTable {
        let x: Vec<f64> = (1..=10).map(f64::from).collect();
        let y: Vec<f64> = x.iter().map(|v| 2.0 + 3.0 * v).collect();
        DataTable::from_columns([("x1", x), ("y", y)]).unwrap()
    }

    fn noisy_table() -> DataTable {
        let x: Vec<f64> = (1..=12).map(f64::from).collect();
        let noise = [1.05, 0.93, 1.1, 0.97, 1.02, 0.88, 1.15, 0.95, 1.04, 0.9, 1.08, 0.99];
        let y: Vec<f64> = x.iter().zip(noise).map(|(v, e)| (50.0 + 10.0 * v) * e).collect();
        DataTable::from_columns([("x1", x), ("y", y)]).unwrap()
    }

    fn spec(text: &str) -> ModelSpec {
        ModelSpec::parse(text).unwrap()
    }

    #[test]
    fn exact_data_converges_after_one_reweighting() {
        let fit = fit_linear(&spec("y ~ x1"), &exact_table()).unwrap();
        assert!(fit.converged);
        assert_eq!(fit.iterations, 2);
        assert!((fit.params.get("(Intercept)").unwrap() - 2.0).abs() < 1e-8);
        assert!((fit.params.get("x1").unwrap() - 3.0).abs() < 1e-8);
    }

    #[test]
    fn each_refit_uses_inverse_square_of_previous_fit() {
        let fitter = LinearMupe::with_solver(Recording::default());
        let fit = fitter.fit(&spec("y ~ x1"), &noisy_table()).unwrap();

        let calls = fitter.solver().calls.borrow();
        assert_eq!(calls.len(), fit.iterations);
        assert!(calls[0].0.is_none());
        for pair in calls.windows(2) {
            let previous = &pair[0].1;
            let weights = pair[1].0.as_ref().unwrap();
            for (w, f) in weights.iter().zip(&previous.fitted) {
                assert!((w - 1.0 / (f * f)).abs() <= 1e-15 * w);
            }
        }
        assert_eq!(calls.last().unwrap().0.as_ref(), Some(&fit.weights));
    }

    #[test]
    fn converged_fit_is_a_fixed_point() {
        let fit = fit_linear(&spec("y ~ x1"), &noisy_table()).unwrap();
        assert!(fit.converged);

        let design = spec("y ~ x1").linear_design(&noisy_table()).unwrap();
        let weights = inverse_square_weights(&fit.fitted).unwrap();
        let again = SvdSolver.solve_wls(&design, Some(&weights)).unwrap();
        for (a, b) in fit.params.values().iter().zip(again.coefficients.values()) {
            assert!((a - b).abs() <= 1e-4 * b.abs());
        }
    }

    #[test]
    fn percent_errors_average_to_zero_with_intercept() {
        let fit = fit_linear(&spec("y ~ x1"), &noisy_table()).unwrap();
        assert!(fit.mean_percent_error().abs() < 1e-8);
    }

    #[test]
    fn iteration_cap_returns_last_fit() {
        let fitter = LinearMupe::new().with_options(MupeOptions::default().with_max_iterations(1));
        let fit = fitter.fit(&spec("y ~ x1"), &noisy_table()).unwrap();
        assert!(!fit.converged);
        assert_eq!(fit.iterations, 1);
        assert_eq!(fit.convergence, None);
        assert_eq!(fit.weights, WeightVector::unit(12));
        assert!(fit.hit_iteration_cap(1));
    }

    #[test]
    fn zero_fitted_value_fails() {
        let x: Vec<f64> = (1..=5).map(f64::from).collect();
        let data = DataTable::from_columns([("x1", x), ("y", vec![0.0; 5])]).unwrap();
        assert_eq!(
            fit_linear(&spec("y ~ x1"), &data).unwrap_err(),
            MupeError::DivisionByZeroInWeighting { observation: 0 }
        );
    }

    #[test]
    fn collinear_design_is_an_inner_failure() {
        let mut data = exact_table();
        let doubled: Vec<f64> = data.column("x1").unwrap().iter().map(|v| 2.0 * v).collect();
        data.push_column("x2", doubled).unwrap();
        assert!(matches!(
            fit_linear(&spec("y ~ x1 + x2"), &data),
            Err(MupeError::InnerSolverFailure(SolverFailure::RankDeficient { .. }))
        ));
    }

    /// Returns a NaN intercept from the second solve on, with finite fitted values.
    #[derive(Default)]
    struct Poisoned {
        calls: RefCell<usize>,
    }

    impl LinearSolver for Poisoned {
        fn solve_wls(&self, design: &Design, weights: Option<&WeightVector>) -> Result<LinearSolution, SolverFailure> {
            let mut sol = SvdSolver.solve_wls(design, weights)?;
            *self.calls.borrow_mut() += 1;
            if *self.calls.borrow() > 1 {
                let mut values = sol.coefficients.values().to_vec();
                values[0] = f64::NAN;
                sol.coefficients = sol.coefficients.with_values(values);
            }
            Ok(sol)
        }
    }

    #[test]
    fn nan_coefficient_from_solver_is_not_converged() {
        let fitter = LinearMupe::with_solver(Poisoned::default());
        assert_eq!(
            fitter.fit(&spec("y ~ x1"), &noisy_table()).unwrap_err(),
            MupeError::InnerSolverFailure(SolverFailure::NonFiniteSolution)
        );
        assert_eq!(*fitter.solver().calls.borrow(), 2);
    }

    #[test]
    fn too_few_observations() {
        let data = DataTable::from_columns([("x1", vec![1.0]), ("y", vec![2.0])]).unwrap();
        assert!(matches!(
            fit_linear(&spec("y ~ x1"), &data),
            Err(MupeError::TooFewObservations { required: 2, available: 1 })
        ));
    }
}
