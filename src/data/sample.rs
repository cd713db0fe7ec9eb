//! Synthetic data with multiplicative log-normal error.
//!
//! Each observation is generated as:
//!
//! ```text
//! x_i   ~ Uniform[x_min, x_max)
//! eps_i ~ LogNormal with mean 1 and coefficient of variation `cv`
//! y_i   = truth(x_i) * eps_i
//! ```
//!
//! This is exactly the error structure MUPE targets: the error is proportional
//! to the size of the prediction.

use clap::ValueEnum;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::LogNormal;
use serde::{Deserialize, Serialize};

use crate::data::DataTable;
use crate::domain::ParameterVector;
use crate::error::MupeError;

/// How many observations and how noisy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationDesign {
    pub n: usize,
    pub x_min: f64,
    pub x_max: f64,
    /// Coefficient of variation of the multiplicative error.
    pub cv: f64,
    pub seed: u64,
}

/// Generate a two-column table (`x1`, `y`) from `truth` and `design`.
pub fn simulate_multiplicative<F>(truth: F, design: &SimulationDesign) -> Result<DataTable, MupeError>
where
    F: Fn(f64) -> f64,
{
    if design.n == 0 {
        return Err(MupeError::InvalidOption {
            name: "n",
            reason: "sample size must be > 0".to_string(),
        });
    }
    if !(design.x_min.is_finite() && design.x_max.is_finite() && design.x_max > design.x_min) {
        return Err(MupeError::InvalidOption {
            name: "x range",
            reason: format!("[{}, {}) is not a valid range", design.x_min, design.x_max),
        });
    }
    if !(design.cv.is_finite() && design.cv >= 0.0) {
        return Err(MupeError::InvalidOption {
            name: "cv",
            reason: format!("{} is not a valid coefficient of variation", design.cv),
        });
    }

    let noise = LogNormal::from_mean_cv(1.0, design.cv).map_err(|e| MupeError::InvalidOption {
        name: "cv",
        reason: e.to_string(),
    })?;
    let mut rng = StdRng::seed_from_u64(design.seed);

    let mut xs = Vec::with_capacity(design.n);
    let mut ys = Vec::with_capacity(design.n);
    for _ in 0..design.n {
        let x = rng.gen_range(design.x_min..design.x_max);
        let eps: f64 = noise.sample(&mut rng);
        xs.push(x);
        ys.push(truth(x) * eps);
    }

    DataTable::from_columns([("x1", xs), ("y", ys)])
}

/// Built-in demonstration problems.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Scenario {
    /// `y = 180 + 6 x1`, fitted with `y ~ x1`.
    Linear,
    /// `y = 90 x1^0.8`, fitted with `y ~ b0 * x1^b1`.
    Nonlinear,
}

impl Scenario {
    pub fn formula(self) -> &'static str {
        match self {
            Scenario::Linear => "y ~ x1",
            Scenario::Nonlinear => "y ~ b0 * x1^b1",
        }
    }

    pub fn truth(self, x: f64) -> f64 {
        match self {
            Scenario::Linear => 180.0 + 6.0 * x,
            Scenario::Nonlinear => 90.0 * x.powf(0.8),
        }
    }

    /// Parameters the data were generated with, named as in the fit output.
    pub fn true_params(self) -> ParameterVector {
        match self {
            Scenario::Linear => ParameterVector::from_parts(
                vec!["(Intercept)".to_string(), "x1".to_string()],
                vec![180.0, 6.0],
            ),
            Scenario::Nonlinear => ParameterVector::from_parts(
                vec!["b0".to_string(), "b1".to_string()],
                vec![90.0, 0.8],
            ),
        }
    }

    /// Starting values for the nonlinear fit; `None` for linear models.
    pub fn initial_guess(self) -> Option<ParameterVector> {
        match self {
            Scenario::Linear => None,
            Scenario::Nonlinear => Some(ParameterVector::from_parts(
                vec!["b0".to_string(), "b1".to_string()],
                vec![10.0, 1.0],
            )),
        }
    }

    pub fn default_cv(self) -> f64 {
        match self {
            Scenario::Linear => 0.3,
            Scenario::Nonlinear => 0.4,
        }
    }

    pub fn design(self, seed: u64, n: usize, cv: Option<f64>) -> SimulationDesign {
        // The power law needs x > 0.
        let x_min = match self {
            Scenario::Linear => 0.0,
            Scenario::Nonlinear => 1.0,
        };
        SimulationDesign {
            n,
            x_min,
            x_max: 100.0,
            cv: cv.unwrap_or(self.default_cv()),
            seed,
        }
    }

    pub fn generate(self, seed: u64, n: usize, cv: Option<f64>) -> Result<DataTable, MupeError> {
        simulate_multiplicative(|x| self.truth(x), &self.design(seed, n, cv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_data() {
        let a = Scenario::Linear.generate(7, 20, None).unwrap();
        let b = Scenario::Linear.generate(7, 20, None).unwrap();
        assert_eq!(a, b);

        let c = Scenario::Linear.generate(8, 20, None).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn zero_cv_reproduces_truth() {
        let table = Scenario::Nonlinear.generate(3, 10, Some(0.0)).unwrap();
        let x = table.column("x1").unwrap();
        let y = table.column("y").unwrap();
        for (xi, yi) in x.iter().zip(y) {
            assert!((1.0..100.0).contains(xi));
            assert!((yi - 90.0 * xi.powf(0.8)).abs() < 1e-9 * yi.abs());
        }
    }

    #[test]
    fn multiplicative_error_has_unit_mean() {
        let design = SimulationDesign {
            n: 20_000,
            x_min: 1.0,
            x_max: 2.0,
            cv: 0.3,
            seed: 11,
        };
        let table = simulate_multiplicative(|_| 1.0, &design).unwrap();
        let y = table.column("y").unwrap();
        let mean = y.iter().sum::<f64>() / y.len() as f64;
        assert!((mean - 1.0).abs() < 0.02, "mean = {mean}");
        assert!(y.iter().all(|v| *v > 0.0));
    }

    #[test]
    fn rejects_bad_designs() {
        let mut design = Scenario::Linear.design(1, 0, None);
        assert!(simulate_multiplicative(|x| x, &design).is_err());
        design.n = 5;
        design.cv = -1.0;
        assert!(simulate_multiplicative(|x| x, &design).is_err());
    }
}
