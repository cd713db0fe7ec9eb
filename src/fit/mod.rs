//! MUPE fitting.
//!
//! Responsibilities:
//!
//! - shared reweighting and convergence logic (`irls`)
//! - linear fitter driven by a weighted linear solver (`linear`)
//! - nonlinear fitter driven by a bounded nonlinear solver (`nonlinear`)

pub mod irls;
pub mod linear;
pub mod nonlinear;

pub use irls::*;
pub use linear::*;
pub use nonlinear::*;
