use mupe::data::Scenario;
use mupe::fit::{LinearMupe, MupeOptions, NonlinearMupe, fit_linear, fit_nonlinear};
use mupe::{DataTable, FitKind, ModelSpec, MupeError, ParameterVector};

const SEED: u64 = 18;
const N: usize = 20;

fn linear_data() -> DataTable {
    // y = (180 + 6 x1) * eps, eps ~ LogNormal(mean 1, cv 0.3)
    Scenario::Linear.generate(SEED, N, Some(0.3)).expect("linear data")
}

fn nonlinear_data() -> DataTable {
    // y = 90 x1^0.8 * eps, eps ~ LogNormal(mean 1, cv 0.4)
    Scenario::Nonlinear.generate(SEED, N, Some(0.4)).expect("nonlinear data")
}

fn start() -> ParameterVector {
    ParameterVector::from_pairs([("b0", 10.0), ("b1", 1.0)]).expect("guess")
}

#[test]
fn linear_scenario_recovers_generating_line() {
    let spec = ModelSpec::parse("y ~ x1").unwrap();
    let fit = fit_linear(&spec, &linear_data()).unwrap();

    assert_eq!(fit.kind, FitKind::Linear);
    assert!(fit.converged);
    assert!((2..=10).contains(&fit.iterations), "iterations = {}", fit.iterations);
    assert!(fit.convergence.unwrap() <= 1e-5);

    let b0 = fit.params.get("(Intercept)").unwrap();
    let b1 = fit.params.get("x1").unwrap();
    assert!((b0 - 180.0).abs() < 40.0, "b0 = {b0}");
    assert!((b1 - 6.0).abs() < 1.0, "b1 = {b1}");
}

#[test]
fn nonlinear_scenario_recovers_power_law() {
    let spec = ModelSpec::parse("y ~ b0 * x1^b1").unwrap();
    let fit = fit_nonlinear(&spec, &nonlinear_data(), &start()).unwrap();

    assert_eq!(fit.kind, FitKind::Nonlinear);
    assert!(fit.converged);
    assert!(fit.iterations < 200);
    assert!(fit.convergence.unwrap() <= 1e-5);
    assert_eq!(fit.initial_guess, Some(start()));

    let b0 = fit.params.get("b0").unwrap();
    let b1 = fit.params.get("b1").unwrap();
    assert!((60.0..=130.0).contains(&b0), "b0 = {b0}");
    assert!((0.65..=0.95).contains(&b1), "b1 = {b1}");
}

#[test]
fn mupe_centers_percent_errors_where_ols_does_not() {
    let spec = ModelSpec::parse("y ~ x1").unwrap();
    let data = linear_data();

    let ols = LinearMupe::new()
        .with_options(MupeOptions::default().with_max_iterations(1))
        .fit(&spec, &data)
        .unwrap();
    let mupe = fit_linear(&spec, &data).unwrap();

    assert!(mupe.mean_percent_error().abs() < 1e-8);
    assert!(mupe.mean_percent_error().abs() < ols.mean_percent_error().abs());
}

#[test]
fn nonlinear_percent_errors_are_centered() {
    let spec = ModelSpec::parse("y ~ b0 * x1^b1").unwrap();
    let fit = fit_nonlinear(&spec, &nonlinear_data(), &start()).unwrap();
    assert!(fit.mean_percent_error().abs() < 0.05);
}

#[test]
fn outer_cap_returns_last_estimate() {
    let spec = ModelSpec::parse("y ~ b0 * x1^b1").unwrap();
    let fit = NonlinearMupe::new()
        .with_options(MupeOptions::default().with_max_iterations(2))
        .fit(&spec, &nonlinear_data(), &start())
        .unwrap();

    assert!(!fit.converged);
    assert_eq!(fit.iterations, 2);
    assert!(fit.hit_iteration_cap(2));
    assert!(fit.params.values().iter().all(|v| v.is_finite()));
}

#[test]
fn predictions_follow_the_final_parameters() {
    let grid = DataTable::from_columns([("x1", vec![1.0, 10.0, 50.0])]).unwrap();

    let spec = ModelSpec::parse("y ~ b0 * x1^b1").unwrap();
    let fit = fit_nonlinear(&spec, &nonlinear_data(), &start()).unwrap();
    let b0 = fit.params.get("b0").unwrap();
    let b1 = fit.params.get("b1").unwrap();
    let predicted = fit.predict(&grid).unwrap();
    for (x, p) in [1.0_f64, 10.0, 50.0].iter().zip(&predicted) {
        assert!((p - b0 * x.powf(b1)).abs() < 1e-9 * p.abs());
    }

    let spec = ModelSpec::parse("y ~ x1").unwrap();
    let fit = fit_linear(&spec, &linear_data()).unwrap();
    let predicted = fit.predict(&grid).unwrap();
    let b0 = fit.params.get("(Intercept)").unwrap();
    let b1 = fit.params.get("x1").unwrap();
    assert!((predicted[1] - (b0 + 10.0 * b1)).abs() < 1e-9);
}

#[test]
fn degenerate_zero_fit_fails_on_first_reweighting() {
    let x: Vec<f64> = (1..=8).map(f64::from).collect();
    let data = DataTable::from_columns([("x1", x), ("y", vec![0.0; 8])]).unwrap();

    let linear = fit_linear(&ModelSpec::parse("y ~ x1").unwrap(), &data);
    assert!(matches!(linear, Err(MupeError::DivisionByZeroInWeighting { .. })));

    let guess = ParameterVector::from_pairs([("b0", 0.0)]).unwrap();
    let nonlinear = fit_nonlinear(&ModelSpec::parse("y ~ b0 * x1").unwrap(), &data, &guess);
    assert!(matches!(nonlinear, Err(MupeError::DivisionByZeroInWeighting { .. })));
}

#[test]
fn mismatched_guess_is_rejected_up_front() {
    let spec = ModelSpec::parse("y ~ b0 * x1^b1").unwrap();
    let guess = ParameterVector::from_pairs([("a", 10.0), ("b1", 1.0)]).unwrap();
    assert!(matches!(
        fit_nonlinear(&spec, &nonlinear_data(), &guess),
        Err(MupeError::InvalidParameterNaming(_))
    ));
}
