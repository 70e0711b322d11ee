//! Integration tests for fit contributions

use std::rc::Rc;

use approx::assert_relative_eq;
use ndarray::array;
use srfit_rs::contribution::ContributionState;
use srfit_rs::{
    ChangeTracker, FitContribution, FitError, Parameter, ParameterProxy, ParameterRef, Profile,
    Value,
};

use crate::test_helpers::{array_approx_eq, bound_contribution};

#[test]
fn test_exact_quadratic_fit() {
    let tracker = ChangeTracker::new();
    let (mut contribution, profile) = bound_contribution(&tracker, "quadratic");
    contribution.set_equation("x**2").unwrap();

    assert_eq!(contribution.residual().unwrap(), array![0.0, 0.0, 0.0]);
    assert_eq!(profile.borrow().ycalc(), Some(&array![0.0, 1.0, 4.0]));
    assert_relative_eq!(contribution.chi2().unwrap(), 0.0);
    assert_relative_eq!(contribution.rw().unwrap(), 0.0);
}

#[test]
fn test_builtin_residual_forms() {
    let tracker = ChangeTracker::new();
    let (mut contribution, _) = bound_contribution(&tracker, "linear");
    contribution.set_equation("x").unwrap();

    assert_eq!(contribution.residual().unwrap(), array![0.0, 0.0, -2.0]);
    assert_relative_eq!(contribution.chi2().unwrap(), 4.0);

    contribution.set_residual_equation(Some("resv")).unwrap();
    assert_eq!(contribution.state(), ContributionState::ResidualBound);
    let expected = array![0.0, 0.0, -2.0 / 17f64.sqrt()];
    assert!(array_approx_eq(
        &contribution.residual().unwrap(),
        &expected,
        1e-12
    ));
    assert_relative_eq!(
        contribution.rw().unwrap(),
        2.0 / 17f64.sqrt(),
        epsilon = 1e-12
    );
}

#[test]
fn test_residual_choice_is_idempotent() {
    let tracker = ChangeTracker::new();
    let (mut contribution, _) = bound_contribution(&tracker, "c");
    contribution.set_equation("x").unwrap();

    contribution.set_residual_equation(Some("chiv")).unwrap();
    let first = contribution.residual_equation().unwrap();
    contribution.set_residual_equation(Some("chiv")).unwrap();
    let second = contribution.residual_equation().unwrap();

    assert_eq!(first.source(), second.source());
    assert!(Rc::ptr_eq(&first, &second));
}

#[test]
fn test_custom_residual_sees_parameters() {
    let tracker = ChangeTracker::new();
    let (mut contribution, _) = bound_contribution(&tracker, "c");
    contribution.set_equation("x").unwrap();
    contribution.new_parameter("w", 2.0).unwrap();

    contribution
        .set_residual_equation(Some("w * (eq - y)"))
        .unwrap();
    assert_eq!(contribution.residual().unwrap(), array![0.0, 0.0, -4.0]);
}

#[test]
fn test_profile_rebinding_frees_names() {
    let tracker = ChangeTracker::new();
    let (mut contribution, profile) = bound_contribution(&tracker, "c");
    contribution.set_equation("x**2").unwrap();
    assert!(matches!(
        contribution.new_parameter("y", 1.0),
        Err(FitError::NameCollision(_))
    ));

    contribution
        .set_profile_named(profile, None, Some("gobs"), None)
        .unwrap();
    assert_eq!(contribution.profile_names(), Some(["x", "gobs", "dy"]));
    assert_eq!(contribution.residual_source(), Some("(eq - gobs) / dy"));
    assert_eq!(contribution.residual().unwrap(), array![0.0, 0.0, 0.0]);

    contribution.new_parameter("y", 1.0).unwrap();
    assert_eq!(contribution.value("y").unwrap(), Value::Scalar(1.0));
}

#[test]
fn test_unresolved_names_without_new_vars() {
    let tracker = ChangeTracker::new();
    let (mut contribution, _) = bound_contribution(&tracker, "c");

    match contribution.set_equation_with("a + b", false, &[]) {
        Err(FitError::UnresolvedVariable { names }) => assert_eq!(names, vec!["a", "b"]),
        other => panic!("unexpected {:?}", other),
    }
    assert!(contribution.equation().is_none());
    assert!(!contribution.registry().contains("a"));

    // Allowed, the same names become parameters with the default value.
    contribution.set_equation("a + b").unwrap();
    assert_eq!(contribution.value("a").unwrap(), Value::Scalar(1.0));
    assert_eq!(contribution.residual().unwrap(), array![2.0, 1.0, -2.0]);
}

#[test]
fn test_failed_equation_keeps_previous() {
    let tracker = ChangeTracker::new();
    let (mut contribution, _) = bound_contribution(&tracker, "c");
    contribution.set_equation("x").unwrap();

    assert!(matches!(
        contribution.set_equation("x +"),
        Err(FitError::Parse { .. })
    ));
    assert!(matches!(
        contribution.set_equation("nosuch(x)"),
        Err(FitError::UnresolvedVariable { .. })
    ));
    assert_eq!(contribution.equation_source(), Some("x"));
    assert_eq!(contribution.residual().unwrap(), array![0.0, 0.0, -2.0]);
}

#[test]
fn test_residual_errors_before_setup() {
    let tracker = ChangeTracker::new();
    let mut contribution = FitContribution::new(&tracker, "c");
    assert!(matches!(
        contribution.residual(),
        Err(FitError::ProfileNotSet)
    ));
    assert!(matches!(
        contribution.set_residual_equation(Some("chiv")),
        Err(FitError::ProfileNotSet)
    ));

    let profile = Profile::new(&tracker).into_shared();
    contribution.set_profile(profile).unwrap();
    assert!(matches!(
        contribution.residual(),
        Err(FitError::EquationNotSet)
    ));
}

#[test]
fn test_proxied_namespace_parameter() {
    let tracker = ChangeTracker::new();
    let (mut contribution, _) = bound_contribution(&tracker, "c");
    let mut other = FitContribution::new(&tracker, "other");
    let offset = other.new_parameter("offset", 1.0).unwrap();

    let namespace = [ParameterRef::from(ParameterProxy::new("shift", &offset))];
    contribution
        .set_equation_with("x**2 + shift", false, &namespace)
        .unwrap();
    assert!(!contribution.registry().contains("shift"));
    assert_eq!(contribution.residual().unwrap(), array![1.0, 1.0, 1.0]);

    offset.set_value(0.0);
    assert_eq!(contribution.residual().unwrap(), array![0.0, 0.0, 0.0]);
}

#[test]
fn test_summary_json() {
    let tracker = ChangeTracker::new();
    let (mut contribution, _) = bound_contribution(&tracker, "c");
    contribution.set_equation("scale * x").unwrap();

    let summary = contribution.summary();
    assert_eq!(summary.state, ContributionState::EquationBound);
    assert_eq!(summary.equation.as_deref(), Some("scale * x"));
    assert!(summary.parameters.iter().any(|p| p.name == "x" && p.proxy));

    let json: serde_json::Value = serde_json::from_str(&contribution.to_json().unwrap()).unwrap();
    assert_eq!(json["name"], "c");
    assert_eq!(json["state"], "equation_bound");
    assert_eq!(json["profile"]["points"], 3);
}

#[test]
fn test_default_residual_choice_is_idempotent() {
    let tracker = ChangeTracker::new();
    let (mut contribution, _) = bound_contribution(&tracker, "c");
    contribution.set_equation("x").unwrap();

    contribution.set_residual_equation(None).unwrap();
    let first = contribution.residual_equation().unwrap();
    contribution.set_residual_equation(None).unwrap();
    let second = contribution.residual_equation().unwrap();
    assert_eq!(first.source(), "(eq - y) / dy");
    assert_eq!(first.source(), second.source());
    assert!(Rc::ptr_eq(&first, &second));

    // None keeps the last explicit choice.
    contribution
        .set_residual_equation(Some("(eq - y) * 2"))
        .unwrap();
    contribution.set_residual_equation(None).unwrap();
    let first = contribution.residual_equation().unwrap();
    contribution.set_residual_equation(None).unwrap();
    let second = contribution.residual_equation().unwrap();
    assert_eq!(first.source(), "(eq - y) * 2");
    assert_eq!(first.source(), second.source());
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(contribution.residual().unwrap(), array![0.0, 0.0, -4.0]);
}

#[test]
fn test_namespace_from_other_tracker_rejected() {
    let tracker = ChangeTracker::new();
    let (mut contribution, _) = bound_contribution(&tracker, "c");
    contribution.set_equation("x").unwrap();

    let elsewhere = ChangeTracker::new();
    let shift = Parameter::new(&elsewhere, "shift", 1.0);
    assert!(matches!(
        contribution.set_equation_with("x + shift", false, &[ParameterRef::from(&shift)]),
        Err(FitError::TrackerMismatch(name)) if name == "shift"
    ));
    assert_eq!(contribution.equation_source(), Some("x"));

    let local = Parameter::new(&tracker, "shift", 1.0);
    contribution
        .set_equation_with("x + shift", false, &[ParameterRef::from(&local)])
        .unwrap();
    local.set_value(0.0);
    assert_eq!(contribution.residual().unwrap(), array![0.0, 0.0, -2.0]);
}

#[test]
fn test_profile_names_cannot_shadow_namespace() {
    let tracker = ChangeTracker::new();
    let (mut contribution, profile) = bound_contribution(&tracker, "c");
    let r = Parameter::new(&tracker, "r", 10.0);
    contribution
        .set_equation_with("r", false, &[ParameterRef::from(&r)])
        .unwrap();
    assert_eq!(contribution.residual().unwrap(), array![10.0, 9.0, 6.0]);

    assert!(matches!(
        contribution.set_profile_named(profile.clone(), Some("r"), None, None),
        Err(FitError::NameCollision(name)) if name == "r"
    ));
    assert_eq!(contribution.profile_names(), Some(["x", "y", "dy"]));
    assert_eq!(contribution.residual().unwrap(), array![10.0, 9.0, 6.0]);

    contribution
        .set_profile_named(profile, Some("t"), None, None)
        .unwrap();
    assert_eq!(contribution.residual().unwrap(), array![10.0, 9.0, 6.0]);
}
