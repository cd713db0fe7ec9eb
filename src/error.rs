//! Error types.
//!
//! - `MupeError` is the typed error returned by the library (parsing, data
//!   validation, reweighting, inner solver failures).
//! - `AppError` is what the binary reports: a message plus a process exit code.
//!
//! Exit codes:
//! - `2` input problems (bad CSV, bad formula, unknown column, bad options)
//! - `4` numerical failures (zero fitted value, inner solver failure)

use thiserror::Error;

use crate::formula::FormulaError;
use crate::solver::SolverFailure;

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}

impl From<MupeError> for AppError {
    fn from(err: MupeError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

/// Errors produced while fitting a MUPE model.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MupeError {
    #[error("Invalid formula: {0}")]
    Formula(#[from] FormulaError),

    #[error("Column '{0}' is not present in the data table.")]
    MissingColumn(String),

    #[error("Column '{0}' appears more than once in the data table.")]
    DuplicateColumn(String),

    #[error("Column '{name}' has {found} rows, expected {expected}.")]
    ColumnLength {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Term '{term}' is not finite at observation {observation}.")]
    NonFiniteData { term: String, observation: usize },

    #[error("Need at least {required} observations to fit, got {available}.")]
    TooFewObservations { required: usize, available: usize },

    #[error("Invalid option '{name}': {reason}")]
    InvalidOption { name: &'static str, reason: String },

    #[error("Invalid parameter naming: {0}")]
    InvalidParameterNaming(String),

    /// The MUPE weight `1/fitted^2` is undefined at this observation.
    #[error(
        "Fitted value at observation {observation} is zero; the weight 1/fitted^2 is undefined."
    )]
    DivisionByZeroInWeighting { observation: usize },

    #[error("Fitted value at observation {observation} is not finite ({value}).")]
    NonFiniteFittedValue { observation: usize, value: f64 },

    #[error("Inner solver failed: {0}")]
    InnerSolverFailure(#[from] SolverFailure),
}

impl MupeError {
    /// Process exit code used when this error reaches the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            MupeError::DivisionByZeroInWeighting { .. }
            | MupeError::NonFiniteFittedValue { .. }
            | MupeError::InnerSolverFailure(_) => 4,
            _ => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numerical_failures_map_to_exit_code_four() {
        let err: AppError = MupeError::DivisionByZeroInWeighting { observation: 3 }.into();
        assert_eq!(err.exit_code(), 4);
        assert!(err.to_string().contains("observation 3"));
    }

    #[test]
    fn input_problems_map_to_exit_code_two() {
        let err: AppError = MupeError::MissingColumn("x9".to_string()).into();
        assert_eq!(err.exit_code(), 2);
    }
}
