//! `mupe` library crate: Minimum Unbiased Percent Error regression.
//!
//! MUPE fits multiplicative-error models (error proportional to the prediction)
//! by iteratively reweighted least squares with weights `1 / fitted^2`.
//!
//! The binary (`mupe`) is a thin wrapper around this library so that:
//!
//! - core logic is testable without spawning processes
//! - the fitters are reusable from other crates

pub mod app;
pub mod cli;
pub mod data;
pub mod domain;
pub mod error;
pub mod fit;
pub mod formula;
pub mod io;
pub mod math;
pub mod report;
pub mod solver;

pub use data::DataTable;
pub use domain::{FitKind, FitResult, ParameterVector, WeightVector};
pub use error::{AppError, MupeError};
pub use fit::{LinearMupe, MupeOptions, NonlinearMupe, fit_linear, fit_nonlinear};
pub use formula::ModelSpec;
