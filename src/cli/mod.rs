//! Command-line parsing for the MUPE fitter.
//!
//! The goal of this module is to keep **argument parsing** separate from the
//! fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::data::Scenario;
use crate::domain::ParameterVector;
use crate::fit::{DEFAULT_MAX_INNER_ITERATIONS, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE, MupeOptions};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "mupe", version, about = "Minimum Unbiased Percent Error (MUPE) regression")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit a formula to a CSV file.
    ///
    /// Without `--start` the formula is fitted as a linear model; with it, as a
    /// nonlinear model whose parameters are the names given in `--start`.
    Fit(FitArgs),
    /// Fit a built-in scenario on seeded synthetic data.
    Demo(DemoArgs),
    /// Repeat a scenario over many seeds and summarize the estimates.
    Study(StudyArgs),
    /// Re-print a fit saved with `--export-json`, optionally predicting new data.
    Report(ReportArgs),
}

/// Outer/inner iteration settings shared by all subcommands.
#[derive(Debug, Args, Clone)]
pub struct IterationArgs {
    /// Convergence tolerance on the largest relative parameter change.
    #[arg(long, default_value_t = DEFAULT_TOLERANCE)]
    pub tolerance: f64,

    /// Maximum number of outer (reweighting) iterations.
    #[arg(long, default_value_t = DEFAULT_MAX_ITERATIONS)]
    pub max_iterations: usize,

    /// Maximum inner solver iterations per outer iteration (nonlinear only).
    #[arg(long, default_value_t = DEFAULT_MAX_INNER_ITERATIONS)]
    pub max_inner_iterations: usize,
}

impl IterationArgs {
    pub fn options(&self) -> MupeOptions {
        MupeOptions::default()
            .with_tolerance(self.tolerance)
            .with_max_iterations(self.max_iterations)
            .with_max_inner_iterations(self.max_inner_iterations)
    }
}

#[derive(Debug, Parser, Clone)]
pub struct FitArgs {
    /// Input CSV with a header row.
    #[arg(long, value_name = "CSV")]
    pub data: PathBuf,

    /// Model formula, e.g. `y ~ x1 + x2` or `y ~ b0 * x1^b1`.
    #[arg(short = 'f', long)]
    pub formula: String,

    /// Starting values for a nonlinear fit, e.g. `b0=10,b1=1`.
    #[arg(long, value_name = "NAME=VALUE,...")]
    pub start: Option<ParameterVector>,

    #[command(flatten)]
    pub iteration: IterationArgs,

    /// Show the N observations with the largest percent errors.
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    /// Export the fit (model, parameters, diagnostics) to JSON.
    #[arg(long = "export-json")]
    pub export_json: Option<PathBuf>,

    /// Export per-observation fitted values and percent errors to CSV.
    #[arg(long = "export-csv")]
    pub export_csv: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct DemoArgs {
    /// Which scenario to run.
    #[arg(value_enum)]
    pub scenario: Scenario,

    /// Random seed for data generation.
    #[arg(long, default_value_t = 18)]
    pub seed: u64,

    /// Number of observations.
    #[arg(short = 'n', long, default_value_t = 20)]
    pub n: usize,

    /// Coefficient of variation of the multiplicative error (scenario default if omitted).
    #[arg(long)]
    pub cv: Option<f64>,

    #[command(flatten)]
    pub iteration: IterationArgs,

    /// Show the N observations with the largest percent errors.
    #[arg(long, default_value_t = 5)]
    pub top: usize,

    /// Export the fit to JSON.
    #[arg(long = "export-json")]
    pub export_json: Option<PathBuf>,
}

#[derive(Debug, Parser, Clone)]
pub struct StudyArgs {
    /// Which scenario to repeat.
    #[arg(value_enum)]
    pub scenario: Scenario,

    /// Number of independent replicates.
    #[arg(short = 'r', long, default_value_t = 200)]
    pub replicates: usize,

    /// Seed of the first replicate; replicate `i` uses `seed + i`.
    #[arg(long, default_value_t = 1)]
    pub seed: u64,

    /// Observations per replicate.
    #[arg(short = 'n', long, default_value_t = 20)]
    pub n: usize,

    /// Coefficient of variation of the multiplicative error (scenario default if omitted).
    #[arg(long)]
    pub cv: Option<f64>,

    #[command(flatten)]
    pub iteration: IterationArgs,
}

#[derive(Debug, Parser, Clone)]
pub struct ReportArgs {
    /// Fit JSON written by `fit --export-json` or `demo --export-json`.
    #[arg(value_name = "JSON")]
    pub fit: PathBuf,

    /// Evaluate the fitted model on the rows of this CSV.
    #[arg(long, value_name = "CSV")]
    pub predict: Option<PathBuf>,

    /// Settings the fit was run with; only used to label the outcome.
    #[command(flatten)]
    pub iteration: IterationArgs,

    /// Show the N observations with the largest percent errors.
    #[arg(long, default_value_t = 5)]
    pub top: usize,
}
