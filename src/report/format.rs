//! Formatted terminal output.
//!
//! Formatting lives in one place so the fitting code stays free of presentation
//! concerns and output changes stay localized.

use crate::app::pipeline::StudySummary;
use crate::domain::FitResult;
use crate::fit::MupeOptions;
use crate::report::ObservationError;

/// Fit summary: model, convergence diagnostics and the parameter table.
pub fn format_fit_summary(fit: &FitResult, options: &MupeOptions) -> String {
    let mut out = String::new();

    out.push_str(&format!("=== mupe - {} fit ===\n", fit.kind.display_name()));
    out.push_str(&format!("Model: {}\n", fit.model));
    out.push_str(&format!("Observations: {}\n", fit.n_obs()));
    if let Some(guess) = &fit.initial_guess {
        out.push_str(&format!("Start: {guess}\n"));
    }

    let status = if fit.converged {
        "converged".to_string()
    } else if fit.hit_iteration_cap(options.max_iterations) {
        format!("NOT converged (hit cap of {} iterations)", options.max_iterations)
    } else {
        "NOT converged".to_string()
    };
    out.push_str(&format!("Iterations: {} ({status})\n", fit.iterations));
    match fit.convergence {
        Some(change) => out.push_str(&format!(
            "Last relative change: {change:.3e} (tolerance {:.1e})\n",
            options.tolerance
        )),
        None => out.push_str("Last relative change: n/a\n"),
    }
    if fit.inner_warnings > 0 {
        out.push_str(&format!(
            "Inner solver hit its {}-iteration cap on {} pass(es)\n",
            options.max_inner_iterations, fit.inner_warnings
        ));
    }

    out.push_str("\nParameters:\n");
    out.push_str(&format!("{:<20} {:>16} {:>14}\n", "name", "estimate", "std. error"));
    out.push_str(&format!("{:-<20} {:-<16} {:-<14}\n", "", "", ""));
    for (i, (name, value)) in fit.params.iter().enumerate() {
        let se = fit
            .std_errors
            .as_ref()
            .and_then(|se| se.get(i))
            .map(|s| format!("{s:.6}"))
            .unwrap_or_else(|| "-".to_string());
        out.push_str(format!("{:<20} {value:>16.6} {se:>14}\n", truncate(name, 20)).as_str());
    }

    out.push_str(&format!(
        "\nMean percent error: {:.4e}\n",
        fit.mean_percent_error()
    ));

    out
}

/// Table of per-observation percent errors.
pub fn format_observation_errors(rows: &[ObservationError]) -> String {
    let mut out = String::new();
    out.push_str("Largest percent errors:\n");
    out.push_str(&format!(
        "{:>6} {:>14} {:>14} {:>10}\n",
        "row", "observed", "fitted", "pct_err"
    ));
    out.push_str(&format!("{:-<6} {:-<14} {:-<14} {:-<10}\n", "", "", "", ""));
    for r in rows {
        out.push_str(&format!(
            "{:>6} {:>14.4} {:>14.4} {:>9.2}%\n",
            r.row,
            r.observed,
            r.fitted,
            100.0 * r.percent_error
        ));
    }
    out
}

/// Model predictions, one line per input row.
pub fn format_predictions(predicted: &[f64]) -> String {
    let mut out = String::new();
    out.push_str("Predictions:\n");
    out.push_str(&format!("{:>6} {:>16}\n", "row", "predicted"));
    out.push_str(&format!("{:-<6} {:-<16}\n", "", ""));
    for (i, p) in predicted.iter().enumerate() {
        out.push_str(&format!("{:>6} {p:>16.6}\n", i + 1));
    }
    out
}

/// Monte Carlo study summary: estimates against the generating parameters.
pub fn format_study_summary(study: &StudySummary) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "=== mupe - {:?} simulation study ===\n",
        study.scenario
    ));
    out.push_str(&format!(
        "Replicates: {} | n={} | cv={:.2}\n",
        study.replicates, study.n, study.cv
    ));
    out.push_str(&format!(
        "Fitted: {} | failed: {} | hit iteration cap: {}\n",
        study.fitted,
        study.failures.len(),
        study.capped
    ));

    if study.fitted > 0 {
        out.push_str(&format!(
            "\n{:<20} {:>12} {:>14} {:>12}\n",
            "parameter", "truth", "mean est.", "sd"
        ));
        out.push_str(&format!("{:-<20} {:-<12} {:-<14} {:-<12}\n", "", "", "", ""));
        for (i, (name, mean)) in study.mean_params.iter().enumerate() {
            let truth = study
                .truth
                .get(name)
                .map(|t| format!("{t:.4}"))
                .unwrap_or_else(|| "-".to_string());
            out.push_str(&format!(
                "{:<20} {truth:>12} {mean:>14.4} {:>12.4}\n",
                truncate(name, 20),
                study.sd_params[i]
            ));
        }
        out.push_str(&format!(
            "\nMean iterations: {:.2} (max {})\n",
            study.mean_iterations, study.max_iterations
        ));
        out.push_str(&format!(
            "Mean percent error (avg over replicates): {:.4e}\n",
            study.mean_percent_error
        ));
    }

    for (seed, message) in study.failures.iter().take(5) {
        out.push_str(&format!("  (seed {seed}) {message}\n"));
    }

    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('.');
    out
}
