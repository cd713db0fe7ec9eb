//! Weighted least squares solver.
//!
//! Every linear MUPE iteration solves a problem of the form:
//!
//! ```text
//! minimize Σ w_i (y_i - x_i^T β)^2
//! ```
//!
//! Implementation choices:
//! - Rows are scaled by `sqrt(w_i)` and the result is solved as ordinary least squares.
//! - SVD handles tall design matrices and exposes the rank directly.
//!   (Nalgebra's `QR::solve` is intended for square systems.)
//! - The same decomposition gives `diag((X'WX)^-1)` for standard errors.

use nalgebra::{DMatrix, DVector};

use crate::solver::SolverFailure;

/// Singular values below `RANK_TOL * s_max` count as zero.
const RANK_TOL: f64 = 1e-10;

#[derive(Debug, Clone)]
pub struct LeastSquares {
    pub beta: DVector<f64>,
    /// `diag((X'WX)^-1)`; multiply by `s^2` for coefficient variances.
    pub unscaled_variance: DVector<f64>,
}

/// Solve a (weighted) least squares problem using SVD.
///
/// Rank-deficient designs are an error rather than a minimum-norm solution:
/// the coefficients of a MUPE fit must be identified.
pub fn solve_least_squares(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    weights: Option<&[f64]>,
) -> Result<LeastSquares, SolverFailure> {
    let (n, p) = x.shape();
    if y.len() != n {
        return Err(SolverFailure::Dimension(format!(
            "design has {n} rows but response has {}",
            y.len()
        )));
    }
    if p == 0 {
        return Err(SolverFailure::Dimension("design has no columns".to_string()));
    }

    let mut xw = x.clone();
    let mut yw = y.clone();
    if let Some(w) = weights {
        if w.len() != n {
            return Err(SolverFailure::Dimension(format!(
                "design has {n} rows but {} weights were given",
                w.len()
            )));
        }
        for (i, wi) in w.iter().enumerate() {
            let sw = wi.sqrt();
            xw.row_mut(i).scale_mut(sw);
            yw[i] *= sw;
        }
    }

    let svd = xw.svd(true, true);
    let s_max = svd.singular_values.max();
    let tol = RANK_TOL * s_max;
    let rank = if s_max.is_finite() { svd.rank(tol) } else { 0 };
    if rank < p {
        return Err(SolverFailure::RankDeficient { rank, columns: p });
    }

    let beta = svd
        .solve(&yw, tol)
        .map_err(|_| SolverFailure::NonFiniteSolution)?;
    if !beta.iter().all(|v| v.is_finite()) {
        return Err(SolverFailure::NonFiniteSolution);
    }

    // (X'WX)^-1 = V diag(1/s^2) V^T, so its diagonal is Σ_k (V_jk / s_k)^2.
    let v_t = svd.v_t.as_ref().ok_or(SolverFailure::NonFiniteSolution)?;
    let unscaled_variance = DVector::from_fn(p, |j, _| {
        svd.singular_values
            .iter()
            .enumerate()
            .map(|(k, s)| (v_t[(k, j)] / s).powi(2))
            .sum()
    });

    Ok(LeastSquares {
        beta,
        unscaled_variance,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn least_squares_solves_simple_system() {
        // Fit y = 2 + 3x on x = [0,1,2]
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0]);
        let y = DVector::from_row_slice(&[2.0, 5.0, 8.0]);

        let fit = solve_least_squares(&x, &y, None).unwrap();
        assert!((fit.beta[0] - 2.0).abs() < 1e-10);
        assert!((fit.beta[1] - 3.0).abs() < 1e-10);
    }

    #[test]
    fn weights_pull_the_fit_toward_heavy_rows() {
        // Intercept-only model: the weighted mean.
        let x = DMatrix::from_element(3, 1, 1.0);
        let y = DVector::from_row_slice(&[1.0, 2.0, 10.0]);
        let w = [1.0, 1.0, 8.0];

        let fit = solve_least_squares(&x, &y, Some(&w)).unwrap();
        assert!((fit.beta[0] - 83.0 / 10.0).abs() < 1e-10);
        // (X'WX)^-1 = 1 / Σw
        assert!((fit.unscaled_variance[0] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn unscaled_variance_matches_normal_equations() {
        let x = DMatrix::from_row_slice(4, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 1.0, 4.0]);
        let y = DVector::from_row_slice(&[1.0, 3.0, 4.0, 9.0]);
        let w = [1.0, 0.5, 2.0, 0.25];

        let fit = solve_least_squares(&x, &y, Some(&w)).unwrap();
        let wm = DMatrix::from_diagonal(&DVector::from_row_slice(&w));
        let inv = (x.transpose() * wm * &x).try_inverse().unwrap();
        for j in 0..2 {
            assert!((fit.unscaled_variance[j] - inv[(j, j)]).abs() < 1e-10);
        }
    }

    #[test]
    fn collinear_columns_are_rank_deficient() {
        let x = DMatrix::from_row_slice(3, 2, &[1.0, 2.0, 2.0, 4.0, 3.0, 6.0]);
        let y = DVector::from_row_slice(&[1.0, 2.0, 3.0]);
        assert_eq!(
            solve_least_squares(&x, &y, None).unwrap_err(),
            SolverFailure::RankDeficient { rank: 1, columns: 2 }
        );
    }
}
