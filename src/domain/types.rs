//! Shared domain types.
//!
//! These types are kept lightweight and serializable so they can be:
//!
//! - passed between the outer MUPE loop and the inner solvers
//! - exported to JSON/CSV
//! - reloaded later for prediction or comparison

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::data::DataTable;
use crate::error::MupeError;
use crate::formula::ModelSpec;

/// Ordered, named parameter values.
///
/// Linear fits name coefficients after their design terms (`(Intercept)`, `x1`, ...);
/// nonlinear fits use the names of the initial guess.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterVector {
    names: Vec<String>,
    values: Vec<f64>,
}

impl ParameterVector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `(name, value)` pairs; names must be unique.
    pub fn from_pairs<I, S>(pairs: I) -> Result<Self, MupeError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut params = Self::new();
        for (name, value) in pairs {
            let name = name.into();
            if params.get(&name).is_some() {
                return Err(MupeError::InvalidParameterNaming(format!(
                    "parameter '{name}' is given more than once"
                )));
            }
            params.names.push(name);
            params.values.push(value);
        }
        Ok(params)
    }

    /// Callers guarantee `names.len() == values.len()` and unique names.
    pub(crate) fn from_parts(names: Vec<String>, values: Vec<f64>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self { names, values }
    }

    /// Same names, new values.
    pub(crate) fn with_values(&self, values: Vec<f64>) -> Self {
        Self::from_parts(self.names.clone(), values)
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.values[idx])
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> + '_ {
        self.names
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }
}

impl fmt::Display for ParameterVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{name}={value}")?;
        }
        Ok(())
    }
}

/// Parses `b0=10,b1=1` (whitespace around tokens is ignored).
impl FromStr for ParameterVector {
    type Err = MupeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut pairs = Vec::new();
        for item in s.split(',').map(str::trim).filter(|item| !item.is_empty()) {
            let Some((name, value)) = item.split_once('=') else {
                return Err(MupeError::InvalidOption {
                    name: "start",
                    reason: format!("expected name=value, got '{item}'"),
                });
            };
            let name = name.trim();
            if name.is_empty() {
                return Err(MupeError::InvalidOption {
                    name: "start",
                    reason: format!("missing parameter name in '{item}'"),
                });
            }
            let value: f64 = value.trim().parse().map_err(|_| MupeError::InvalidOption {
                name: "start",
                reason: format!("'{}' is not a number", value.trim()),
            })?;
            pairs.push((name.to_string(), value));
        }
        Self::from_pairs(pairs)
    }
}

/// Per-observation weights used by a weighted least-squares solve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector(Vec<f64>);

impl WeightVector {
    /// All ones (the unweighted fit).
    pub fn unit(n: usize) -> Self {
        Self(vec![1.0; n])
    }

    pub(crate) fn from_vec(weights: Vec<f64>) -> Self {
        Self(weights)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        self.0.iter().copied()
    }
}

/// Which fitter produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitKind {
    Linear,
    Nonlinear,
}

impl FitKind {
    pub fn display_name(self) -> &'static str {
        match self {
            FitKind::Linear => "linear MUPE",
            FitKind::Nonlinear => "nonlinear MUPE",
        }
    }
}

/// Final estimate of a MUPE fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub kind: FitKind,
    pub model: ModelSpec,
    pub params: ParameterVector,
    /// `sqrt(diag(s^2 (J'WJ)^-1))` at the final weights, when the solver could compute it.
    pub std_errors: Option<Vec<f64>>,
    pub fitted: Vec<f64>,
    /// `y - fitted` on the original (unweighted) scale.
    pub residuals: Vec<f64>,
    /// Weights that produced this fit (all ones for an unweighted fit).
    pub weights: WeightVector,
    /// Number of solver passes. For linear fits the unweighted fit counts as the first.
    pub iterations: usize,
    /// Last relative parameter change; `None` if no comparison was made.
    pub convergence: Option<f64>,
    pub converged: bool,
    /// Inner solves that stopped at their iteration cap (nonlinear only).
    pub inner_warnings: usize,
    pub initial_guess: Option<ParameterVector>,
}

impl FitResult {
    pub fn n_obs(&self) -> usize {
        self.fitted.len()
    }

    /// True when the outer loop stopped because it hit `cap` iterations without converging.
    pub fn hit_iteration_cap(&self, cap: usize) -> bool {
        !self.converged && self.iterations >= cap
    }

    /// Mean of `(y - fitted) / fitted`; close to zero for a converged MUPE fit.
    pub fn mean_percent_error(&self) -> f64 {
        if self.fitted.is_empty() {
            return f64::NAN;
        }
        let sum: f64 = self
            .residuals
            .iter()
            .zip(&self.fitted)
            .map(|(r, f)| r / f)
            .sum();
        sum / self.fitted.len() as f64
    }

    /// Evaluate the fitted model on new data.
    pub fn predict(&self, data: &DataTable) -> Result<Vec<f64>, MupeError> {
        match self.kind {
            FitKind::Linear => {
                let terms = self.model.linear_terms()?;
                let x = terms.design_matrix(data)?;
                let beta = nalgebra::DVector::from_column_slice(self.params.values());
                Ok((x * beta).iter().copied().collect())
            }
            FitKind::Nonlinear => self.model.evaluate_nonlinear(data, &self.params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_start_values() {
        let params: ParameterVector = "b0=10, b1 = 1.5".parse().unwrap();
        assert_eq!(params.names(), &["b0".to_string(), "b1".to_string()]);
        assert_eq!(params.values(), &[10.0, 1.5]);
        assert_eq!(params.to_string(), "b0=10,b1=1.5");
    }

    #[test]
    fn rejects_malformed_start_values() {
        assert!("b0".parse::<ParameterVector>().is_err());
        assert!("b0=abc".parse::<ParameterVector>().is_err());
        assert!("=1".parse::<ParameterVector>().is_err());
        assert!(matches!(
            "b0=1,b0=2".parse::<ParameterVector>(),
            Err(MupeError::InvalidParameterNaming(_))
        ));
    }

    #[test]
    fn mean_percent_error_uses_fitted_scale() {
        let fit = FitResult {
            kind: FitKind::Linear,
            model: "y ~ x1".parse().unwrap(),
            params: ParameterVector::from_parts(vec!["(Intercept)".into()], vec![1.0]),
            std_errors: None,
            fitted: vec![100.0, 10.0],
            residuals: vec![10.0, -1.0],
            weights: WeightVector::unit(2),
            iterations: 1,
            convergence: None,
            converged: false,
            inner_warnings: 0,
            initial_guess: None,
        };
        assert!(fit.mean_percent_error().abs() < 1e-15);
        assert!(fit.hit_iteration_cap(1));
        assert!(!fit.hit_iteration_cap(2));
    }
}
