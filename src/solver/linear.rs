//! Linear inner solver: weighted least squares via SVD.

use crate::domain::{ParameterVector, WeightVector};
use crate::formula::Design;
use crate::math::solve_least_squares;
use crate::solver::{LinearSolution, LinearSolver, SolverFailure, standard_errors};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SvdSolver;

impl LinearSolver for SvdSolver {
    fn solve_wls(&self, design: &Design, weights: Option<&WeightVector>) -> Result<LinearSolution, SolverFailure> {
        let w = weights.map(WeightVector::as_slice);
        let ls = solve_least_squares(&design.x, &design.y, w)?;

        let fitted_v = &design.x * &ls.beta;
        let fitted: Vec<f64> = fitted_v.iter().copied().collect();
        let residuals: Vec<f64> = design.y.iter().zip(&fitted).map(|(y, f)| y - f).collect();
        let weighted_sse = match w {
            Some(w) => residuals.iter().zip(w).map(|(r, wi)| wi * r * r).sum(),
            None => residuals.iter().map(|r| r * r).sum(),
        };

        Ok(LinearSolution {
            coefficients: ParameterVector::from_parts(design.names.clone(), ls.beta.iter().copied().collect()),
            std_errors: standard_errors(&ls.unscaled_variance, weighted_sse, design.n_rows()),
            fitted,
            residuals,
            weighted_sse,
        })
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{DMatrix, DVector};

    use super::*;

    fn design() -> Design {
        Design {
            names: vec!["(Intercept)".to_string(), "x1".to_string()],
            x: DMatrix::from_row_slice(4, 2, &[1.0, 1.0, 1.0, 2.0, 1.0, 3.0, 1.0, 4.0]),
            y: DVector::from_row_slice(&[3.1, 4.9, 7.2, 8.8]),
        }
    }

    #[test]
    fn names_coefficients_after_design_terms() {
        let sol = SvdSolver.solve_wls(&design(), None).unwrap();
        assert_eq!(sol.coefficients.names(), &["(Intercept)".to_string(), "x1".to_string()]);
        assert_eq!(sol.fitted.len(), 4);
        for i in 0..4 {
            assert!((sol.fitted[i] + sol.residuals[i] - design().y[i]).abs() < 1e-12);
        }
        let se = sol.std_errors.unwrap();
        assert!(se.iter().all(|s| s.is_finite() && *s > 0.0));
    }

    #[test]
    fn unit_weights_match_unweighted_fit() {
        let d = design();
        let plain = SvdSolver.solve_wls(&d, None).unwrap();
        let unit = SvdSolver.solve_wls(&d, Some(&WeightVector::unit(4))).unwrap();
        for (a, b) in plain.coefficients.values().iter().zip(unit.coefficients.values()) {
            assert!((a - b).abs() < 1e-12);
        }
        assert!((plain.weighted_sse - unit.weighted_sse).abs() < 1e-12);
    }
}
