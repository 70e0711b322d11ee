//! Integration tests driving contributions from an optimizer loop
//!
//! The library does not ship an optimizer; these tests run a small
//! Gauss-Newton iteration over [`FitProblem`] to check that residuals and
//! finite-difference Jacobians behave the way an optimizer expects.

use approx::assert_relative_eq;
use ndarray::{Array1, Array2};
use srfit_rs::{ChangeTracker, FitContribution, FitProblem, Problem, Profile};

/// Solve `(J^T J) delta = -J^T r` for two parameters.
fn gauss_newton_step(jac: &Array2<f64>, residual: &Array1<f64>) -> Array1<f64> {
    let jtj = jac.t().dot(jac);
    let jtr = jac.t().dot(residual);
    let det = jtj[[0, 0]] * jtj[[1, 1]] - jtj[[0, 1]] * jtj[[1, 0]];
    Array1::from(vec![
        -(jtj[[1, 1]] * jtr[0] - jtj[[0, 1]] * jtr[1]) / det,
        -(jtj[[0, 0]] * jtr[1] - jtj[[1, 0]] * jtr[0]) / det,
    ])
}

fn line_contribution(tracker: &ChangeTracker) -> FitContribution {
    let x = Array1::linspace(0.0, 4.0, 9);
    let y = x.mapv(|x| 2.5 * x - 1.0);
    let profile = Profile::new(tracker).into_shared();
    profile
        .borrow_mut()
        .set_observed_profile(x, y, None)
        .unwrap();

    let mut contribution = FitContribution::new(tracker, "line");
    contribution.set_profile(profile).unwrap();
    contribution.set_equation("m * x + b").unwrap();
    contribution
}

#[test]
fn test_gauss_newton_recovers_line() {
    let tracker = ChangeTracker::new();
    let contribution = line_contribution(&tracker);
    let problem = FitProblem::new(&contribution, &["m", "b"]).unwrap();

    let mut params = problem.values();
    for _ in 0..5 {
        let residual = problem.eval(&params).unwrap();
        let jac = problem.jacobian(&params).unwrap();
        params = &params + &gauss_newton_step(&jac, &residual);
    }
    problem.apply(&params).unwrap();

    assert_relative_eq!(params[0], 2.5, epsilon = 1e-6);
    assert_relative_eq!(params[1], -1.0, epsilon = 1e-6);
    assert!(contribution.chi2().unwrap() < 1e-10);
    assert_relative_eq!(contribution.value("m").unwrap().sum(), params[0]);
}

#[test]
fn test_constrained_parameter_follows_fit() {
    let tracker = ChangeTracker::new();
    let mut contribution = line_contribution(&tracker);
    let b = contribution.parameter("b").unwrap();
    contribution.new_parameter("c", -1.0).unwrap();
    contribution.constrain(&b, "c").unwrap();

    let problem = FitProblem::new(&contribution, &["m", "c"]).unwrap();
    let mut params = array_of(&[0.0, 0.0]);
    for _ in 0..5 {
        let residual = problem.eval(&params).unwrap();
        let jac = problem.jacobian(&params).unwrap();
        params = &params + &gauss_newton_step(&jac, &residual);
    }

    assert_relative_eq!(params[0], 2.5, epsilon = 1e-6);
    assert_relative_eq!(contribution.value("b").unwrap().sum(), -1.0, epsilon = 1e-6);
}

#[test]
fn test_cost_includes_only_residuals() {
    let tracker = ChangeTracker::new();
    let mut contribution = line_contribution(&tracker);
    contribution
        .restrain("m", 0.0, 1.0, 1.0, false)
        .unwrap();
    let problem = FitProblem::new(&contribution, &["m", "b"]).unwrap();

    let cost = problem.eval_cost(&array_of(&[2.5, -1.0])).unwrap();
    assert_relative_eq!(cost, 0.0, epsilon = 1e-20);
    // (2.5 - 1)^2
    assert_relative_eq!(contribution.penalty(1.0).unwrap(), 2.25, epsilon = 1e-12);
}

fn array_of(values: &[f64]) -> Array1<f64> {
    Array1::from(values.to_vec())
}
