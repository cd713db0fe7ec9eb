//! Domain types used throughout the fitters.
//!
//! This module defines:
//!
//! - named parameter vectors (`ParameterVector`)
//! - observation weights (`WeightVector`)
//! - fit outputs (`FitResult`, `FitKind`)

pub mod types;

pub use types::*;
