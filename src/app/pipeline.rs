//! Shared "fit pipeline" logic used by the subcommands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! data (CSV or synthetic) -> formula -> linear or nonlinear MUPE fit
//!
//! The command handlers can then focus on presentation and exports.

use log::{info, warn};
use rayon::prelude::*;

use crate::data::{DataTable, Scenario};
use crate::domain::{FitResult, ParameterVector};
use crate::error::{AppError, MupeError};
use crate::fit::{LinearMupe, MupeOptions, NonlinearMupe};
use crate::formula::ModelSpec;

/// Data plus the fit computed on it.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub data: DataTable,
    pub fit: FitResult,
}

/// Fit `spec` to `data`: nonlinear when a starting guess is given, linear otherwise.
pub fn fit_table(
    spec: &ModelSpec,
    data: &DataTable,
    start: Option<&ParameterVector>,
    options: MupeOptions,
) -> Result<FitResult, MupeError> {
    match start {
        Some(guess) => NonlinearMupe::new().with_options(options).fit(spec, data, guess),
        None => LinearMupe::new().with_options(options).fit(spec, data),
    }
}

/// Generate a scenario's data and fit it.
pub fn run_demo(
    scenario: Scenario,
    seed: u64,
    n: usize,
    cv: Option<f64>,
    options: MupeOptions,
) -> Result<RunOutput, AppError> {
    let data = scenario.generate(seed, n, cv)?;
    let spec = ModelSpec::parse(scenario.formula()).map_err(MupeError::from)?;
    let fit = fit_table(&spec, &data, scenario.initial_guess().as_ref(), options)?;
    Ok(RunOutput { data, fit })
}

/// Aggregated results of a simulation study.
#[derive(Debug, Clone)]
pub struct StudySummary {
    pub scenario: Scenario,
    pub replicates: usize,
    pub n: usize,
    pub cv: f64,
    /// Replicates that produced a fit (converged or capped).
    pub fitted: usize,
    /// `(seed, error)` for replicates whose fit failed.
    pub failures: Vec<(u64, String)>,
    /// Fits that stopped at the iteration cap.
    pub capped: usize,
    pub truth: ParameterVector,
    pub mean_params: ParameterVector,
    pub sd_params: Vec<f64>,
    pub mean_iterations: f64,
    pub max_iterations: usize,
    pub mean_percent_error: f64,
}

/// Fit `replicates` independent data sets in parallel.
///
/// Replicates share nothing, so they run on the rayon pool; each individual fit
/// is still strictly sequential.
pub fn run_study(
    scenario: Scenario,
    seed: u64,
    replicates: usize,
    n: usize,
    cv: Option<f64>,
    options: MupeOptions,
) -> Result<StudySummary, AppError> {
    if replicates == 0 {
        return Err(AppError::new(2, "Replicate count must be > 0."));
    }
    options.validate()?;
    let spec = ModelSpec::parse(scenario.formula()).map_err(MupeError::from)?;
    let guess = scenario.initial_guess();

    let outcomes: Vec<(u64, Result<FitResult, MupeError>)> = (0..replicates as u64)
        .into_par_iter()
        .map(|i| {
            let seed = seed.wrapping_add(i);
            let data = scenario.generate(seed, n, cv)?;
            Ok((seed, fit_table(&spec, &data, guess.as_ref(), options)))
        })
        .collect::<Result<_, MupeError>>()?;

    let mut fits = Vec::with_capacity(outcomes.len());
    let mut failures = Vec::new();
    for (seed, outcome) in outcomes {
        match outcome {
            Ok(fit) => fits.push(fit),
            Err(e) => {
                warn!("replicate with seed {seed} failed: {e}");
                failures.push((seed, e.to_string()));
            }
        }
    }
    info!(
        "study: {} of {replicates} replicates fitted",
        fits.len()
    );

    let truth = scenario.true_params();
    let names = fits
        .first()
        .map(|f| f.params.names().to_vec())
        .unwrap_or_else(|| truth.names().to_vec());
    let k = fits.len();
    let p = names.len();

    let mut mean = vec![0.0; p];
    for fit in &fits {
        for (m, v) in mean.iter_mut().zip(fit.params.values()) {
            *m += v / k as f64;
        }
    }
    let mut sd = vec![0.0; p];
    if k > 1 {
        for fit in &fits {
            for (j, v) in fit.params.values().iter().enumerate() {
                sd[j] += (v - mean[j]).powi(2) / (k - 1) as f64;
            }
        }
        sd.iter_mut().for_each(|s| *s = s.sqrt());
    }

    let (mean_iterations, mean_percent_error) = if k > 0 {
        (
            fits.iter().map(|f| f.iterations as f64).sum::<f64>() / k as f64,
            fits.iter().map(FitResult::mean_percent_error).sum::<f64>() / k as f64,
        )
    } else {
        (f64::NAN, f64::NAN)
    };

    Ok(StudySummary {
        scenario,
        replicates,
        n,
        cv: cv.unwrap_or(scenario.default_cv()),
        fitted: k,
        capped: fits
            .iter()
            .filter(|f| f.hit_iteration_cap(options.max_iterations))
            .count(),
        failures,
        truth,
        mean_params: ParameterVector::from_parts(names, mean),
        sd_params: sd,
        mean_iterations,
        max_iterations: fits.iter().map(|f| f.iterations).max().unwrap_or(0),
        mean_percent_error,
    })
}
