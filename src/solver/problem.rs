//! A nonlinear least-squares problem: response, bound model and parameter names.

use std::collections::BTreeSet;

use log::debug;
use nalgebra::{DMatrix, DVector};

use crate::data::DataTable;
use crate::domain::ParameterVector;
use crate::error::MupeError;
use crate::formula::{BoundExpr, ModelSpec};
use crate::solver::SolverFailure;

#[derive(Debug, Clone)]
pub struct NonlinearProblem<'a> {
    data: &'a DataTable,
    model: BoundExpr,
    y: Vec<f64>,
    param_names: Vec<String>,
}

impl<'a> NonlinearProblem<'a> {
    /// Check parameter naming and bind the model.
    ///
    /// Naming rules:
    /// - the guess names at least one parameter
    /// - no parameter shares a name with a data column
    /// - every guessed parameter appears in the predictor
    /// - every other predictor symbol is a data column
    /// - the response refers to data columns only
    pub fn new(spec: &ModelSpec, data: &'a DataTable, guess: &ParameterVector) -> Result<Self, MupeError> {
        if guess.is_empty() {
            return Err(MupeError::InvalidParameterNaming(
                "the initial guess names no parameters".to_string(),
            ));
        }
        for (name, value) in guess.iter() {
            if data.has_column(name) {
                return Err(MupeError::InvalidParameterNaming(format!(
                    "parameter '{name}' has the same name as a data column"
                )));
            }
            if !value.is_finite() {
                return Err(MupeError::InvalidOption {
                    name: "initial guess",
                    reason: format!("starting value for '{name}' is not finite"),
                });
            }
        }

        let symbols = spec.predictor_symbols();
        let guessed: BTreeSet<&str> = guess.names().iter().map(String::as_str).collect();
        for name in &guessed {
            if !symbols.contains(*name) {
                return Err(MupeError::InvalidParameterNaming(format!(
                    "parameter '{name}' does not appear in the model '{}'",
                    spec.predictor()
                )));
            }
        }
        for symbol in &symbols {
            if !guessed.contains(symbol.as_str()) && !data.has_column(symbol) {
                return Err(MupeError::InvalidParameterNaming(format!(
                    "'{symbol}' is neither a data column nor a parameter with a starting value"
                )));
            }
        }
        if let Some(param) = spec.response().symbols().iter().find(|s| guessed.contains(s.as_str())) {
            return Err(MupeError::InvalidParameterNaming(format!(
                "the response may not depend on parameter '{param}'"
            )));
        }

        let y = spec.response_values(data)?;
        if y.len() < guess.len() {
            return Err(MupeError::TooFewObservations {
                required: guess.len(),
                available: y.len(),
            });
        }

        let model = BoundExpr::bind(spec.predictor(), data, guess.names())?;
        debug!(
            "nonlinear problem: {} observations, parameters [{}]",
            y.len(),
            guess.names().join(", ")
        );
        Ok(Self {
            data,
            model,
            y,
            param_names: guess.names().to_vec(),
        })
    }

    pub fn n_obs(&self) -> usize {
        self.y.len()
    }

    pub fn n_params(&self) -> usize {
        self.param_names.len()
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    pub fn response(&self) -> &[f64] {
        &self.y
    }

    /// Model values on the original scale.
    pub fn predict(&self, params: &[f64]) -> Vec<f64> {
        (0..self.n_obs())
            .map(|row| self.model.eval(self.data, row, params))
            .collect()
    }

    /// `sqrt(w_i) (y_i - f_i)`; a non-finite model value is an error.
    pub fn weighted_residuals(&self, params: &[f64], sqrt_w: &[f64]) -> Result<DVector<f64>, SolverFailure> {
        let mut out = DVector::zeros(self.n_obs());
        for row in 0..self.n_obs() {
            let f = self.model.eval(self.data, row, params);
            if !f.is_finite() {
                return Err(SolverFailure::NonFiniteModel { observation: row });
            }
            out[row] = sqrt_w[row] * (self.y[row] - f);
        }
        Ok(out)
    }

    /// Jacobian of `weighted_residuals`: `-sqrt(w_i) df_i/dθ_j`.
    pub fn weighted_jacobian(&self, params: &[f64], sqrt_w: &[f64]) -> Result<DMatrix<f64>, SolverFailure> {
        let p = self.n_params();
        let mut jac = DMatrix::zeros(self.n_obs(), p);
        let mut grad = vec![0.0; p];
        for row in 0..self.n_obs() {
            self.model.eval_gradient(self.data, row, params, &mut grad);
            for (j, g) in grad.iter().enumerate() {
                let v = -sqrt_w[row] * g;
                if !v.is_finite() {
                    return Err(SolverFailure::NonFiniteModel { observation: row });
                }
                jac[(row, j)] = v;
            }
        }
        Ok(jac)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> DataTable {
        DataTable::from_columns([("x1", vec![1.0, 2.0, 3.0]), ("y", vec![2.0, 3.0, 5.0])]).unwrap()
    }

    fn guess(text: &str) -> ParameterVector {
        text.parse().unwrap()
    }

    fn naming_error(formula: &str, start: &str) -> bool {
        let spec = ModelSpec::parse(formula).unwrap();
        matches!(
            NonlinearProblem::new(&spec, &data(), &guess(start)),
            Err(MupeError::InvalidParameterNaming(_))
        )
    }

    #[test]
    fn accepts_consistent_naming() {
        let spec = ModelSpec::parse("y ~ b0 * x1^b1").unwrap();
        let table = data();
        let problem = NonlinearProblem::new(&spec, &table, &guess("b0=1,b1=1")).unwrap();
        assert_eq!(problem.n_obs(), 3);
        assert_eq!(problem.predict(&[2.0, 1.0]), vec![2.0, 4.0, 6.0]);
    }

    #[test]
    fn rejects_inconsistent_naming() {
        assert!(naming_error("y ~ b0 * x1^b1", ""));
        assert!(naming_error("y ~ b0 * x1", "b0=1,x1=2"));
        assert!(naming_error("y ~ b0 * x1", "b0=1,b1=2"));
        assert!(naming_error("y ~ b0 * x1^b1", "b0=1"));
        assert!(naming_error("y * b0 ~ b0 * x1", "b0=1"));
    }

    #[test]
    fn jacobian_is_negated_weighted_gradient() {
        let spec = ModelSpec::parse("y ~ b0 * x1").unwrap();
        let table = data();
        let problem = NonlinearProblem::new(&spec, &table, &guess("b0=1")).unwrap();
        let sqrt_w = [1.0, 2.0, 0.5];
        let jac = problem.weighted_jacobian(&[1.5], &sqrt_w).unwrap();
        assert_eq!(jac[(1, 0)], -4.0);
        let r = problem.weighted_residuals(&[1.5], &sqrt_w).unwrap();
        assert!((r[2] - 0.5 * (5.0 - 4.5)).abs() < 1e-15);
    }
}
