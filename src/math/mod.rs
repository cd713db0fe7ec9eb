//! Numerical building blocks.

pub mod ols;

pub use ols::{LeastSquares, solve_least_squares};
