//! Input data for fitting.
//!
//! - `DataTable`: named numeric columns referenced by formulas
//! - synthetic multiplicative-error samples for demos and simulation studies

pub mod sample;
pub mod table;

pub use sample::{Scenario, SimulationDesign, simulate_multiplicative};
pub use table::DataTable;
