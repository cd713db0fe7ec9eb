//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads CSV data or generates synthetic samples
//! - runs the linear or nonlinear MUPE fit
//! - prints reports
//! - writes optional exports
//! - reloads exported fits for reporting and prediction

use clap::Parser;

use crate::cli::{Command, DemoArgs, FitArgs, ReportArgs, StudyArgs};
use crate::error::{AppError, MupeError};
use crate::fit::MupeOptions;
use crate::formula::ModelSpec;

pub mod pipeline;

/// Entry point for the `mupe` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Demo(args) => handle_demo(args),
        Command::Study(args) => handle_study(args),
        Command::Report(args) => handle_report(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let options = args.iteration.options();
    options.validate()?;
    let spec = ModelSpec::parse(&args.formula).map_err(MupeError::from)?;
    let ingested = crate::io::load_table(&args.data)?;
    if !ingested.row_errors.is_empty() {
        eprintln!(
            "Skipped {} of {} CSV rows (run with RUST_LOG=warn for details).",
            ingested.row_errors.len(),
            ingested.rows_read
        );
    }

    let fit = pipeline::fit_table(&spec, &ingested.table, args.start.as_ref(), options)?;
    print_fit(&fit, &options, args.top);

    if let Some(path) = &args.export_json {
        crate::io::write_fit_json(path, &fit)?;
    }
    if let Some(path) = &args.export_csv {
        crate::io::write_observations_csv(path, &ingested.table, &fit)?;
    }
    Ok(())
}

fn handle_demo(args: DemoArgs) -> Result<(), AppError> {
    let options = args.iteration.options();
    let run = pipeline::run_demo(args.scenario, args.seed, args.n, args.cv, options)?;

    println!(
        "Generated {} observations (seed {}) from {}",
        run.data.n_rows(),
        args.seed,
        args.scenario.true_params()
    );
    print_fit(&run.fit, &options, args.top);

    if let Some(path) = &args.export_json {
        crate::io::write_fit_json(path, &run.fit)?;
    }
    Ok(())
}

fn handle_study(args: StudyArgs) -> Result<(), AppError> {
    let options = args.iteration.options();
    let study = pipeline::run_study(args.scenario, args.seed, args.replicates, args.n, args.cv, options)?;
    println!("{}", crate::report::format_study_summary(&study));
    Ok(())
}

fn handle_report(args: ReportArgs) -> Result<(), AppError> {
    let fit = crate::io::read_fit_json(&args.fit)?;
    print_fit(&fit, &args.iteration.options(), args.top);

    if let Some(path) = &args.predict {
        let ingested = crate::io::load_table(path)?;
        let predicted = fit.predict(&ingested.table)?;
        println!("{}", crate::report::format_predictions(&predicted));
    }
    Ok(())
}

fn print_fit(fit: &crate::domain::FitResult, options: &MupeOptions, top: usize) {
    println!("{}", crate::report::format_fit_summary(fit, options));
    if top > 0 {
        let rows = crate::report::largest_percent_errors(fit, top);
        println!("{}", crate::report::format_observation_errors(&rows));
    }
}
