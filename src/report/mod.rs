//! Reporting utilities: per-observation percent errors and formatted terminal output.

use crate::domain::FitResult;

pub mod format;

pub use format::*;

/// One observation's fit on the percent scale.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationError {
    /// 1-based row number.
    pub row: usize,
    pub observed: f64,
    pub fitted: f64,
    /// `(observed - fitted) / fitted`
    pub percent_error: f64,
}

pub fn observation_errors(fit: &FitResult) -> Vec<ObservationError> {
    fit.fitted
        .iter()
        .zip(&fit.residuals)
        .enumerate()
        .map(|(i, (&fitted, &residual))| ObservationError {
            row: i + 1,
            observed: fitted + residual,
            fitted,
            percent_error: residual / fitted,
        })
        .collect()
}

/// The `top_n` observations with the largest absolute percent error.
pub fn largest_percent_errors(fit: &FitResult, top_n: usize) -> Vec<ObservationError> {
    let mut errors = observation_errors(fit);
    errors.sort_by(|a, b| {
        b.percent_error
            .abs()
            .partial_cmp(&a.percent_error.abs())
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    errors.truncate(top_n);
    errors
}
