//! Tests for registries, constraints and restraints

use approx::assert_relative_eq;
use srfit_rs::{ChangeTracker, FitError, Parameter, ParameterProxy, Registry, Value};

#[test]
fn test_distinct_names_then_collision() {
    let tracker = ChangeTracker::new();
    let mut registry = Registry::new(&tracker, "r");
    registry.add_parameter(Parameter::new(&tracker, "p", 1.0)).unwrap();
    registry.add_parameter(Parameter::new(&tracker, "q", 2.0)).unwrap();

    for name in ["p", "q"] {
        assert!(matches!(
            registry.add_parameter(Parameter::new(&tracker, name, 0.0)),
            Err(FitError::NameCollision(n)) if n == name
        ));
    }

    let child = Registry::new(&tracker, "p").into_shared();
    assert!(matches!(
        registry.add_organizer(child, false),
        Err(FitError::NameCollision(_))
    ));
    assert_eq!(registry.len(), 2);
}

#[test]
fn test_constraint_round_trip() {
    let tracker = ChangeTracker::new();
    let mut registry = Registry::new(&tracker, "r");
    let p = registry.new_parameter("p", 100.0).unwrap();
    let q = registry.new_parameter("q", 0.0).unwrap();

    registry.constrain(&p, "2*q").unwrap();
    q.set_value(3.0);
    assert_eq!(p.logical_value().unwrap(), Value::Scalar(6.0));
    assert_eq!(p.value(), Value::Scalar(100.0));

    // Writing the stored value does not change the logical one.
    p.set_value(-1.0);
    assert_eq!(registry.value("p").unwrap(), Value::Scalar(6.0));
}

#[test]
fn test_registry_cycles_rejected() {
    let tracker = ChangeTracker::new();
    let a = Registry::new(&tracker, "a").into_shared();
    let b = Registry::new(&tracker, "b").into_shared();
    let c = Registry::new(&tracker, "c").into_shared();
    a.borrow_mut().add_organizer(b.clone(), false).unwrap();
    b.borrow_mut().add_organizer(c.clone(), false).unwrap();

    assert!(matches!(
        c.borrow_mut().add_organizer(a.clone(), false),
        Err(FitError::CycleDetected(_))
    ));

    // Changes deep in the hierarchy still reach the top.
    let p = c.borrow_mut().new_parameter("p", 1.0).unwrap();
    let before = a.borrow().stamp();
    p.set_value(2.0);
    assert!(a.borrow().stamp() > before);
}

#[test]
fn test_removed_organizer_stops_propagating() {
    let tracker = ChangeTracker::new();
    let mut parent = Registry::new(&tracker, "parent");
    let mut child = Registry::new(&tracker, "child");
    let p = child.new_parameter("p", 1.0).unwrap();
    parent.add_organizer(child.into_shared(), true).unwrap();

    let removed = parent.remove_organizer("child").unwrap();
    assert_eq!(removed.borrow().name(), "child");
    let before = parent.stamp();
    p.set_value(3.0);
    assert_eq!(parent.stamp(), before);
    assert!(matches!(
        parent.remove_organizer("child"),
        Err(FitError::NotFound(_))
    ));
}

#[test]
fn test_restraint_penalty_is_separate_from_values() {
    let tracker = ChangeTracker::new();
    let mut registry = Registry::new(&tracker, "r");
    let a = registry.new_parameter("a", 2.0).unwrap();
    let b = registry.new_parameter("b", 1.0).unwrap();
    let restraint = registry.restrain("a - b", 0.0, 0.5, 0.1, false).unwrap();

    // (1 - 0.5)^2 / 0.1^2
    assert_relative_eq!(registry.penalty(1.0).unwrap(), 25.0, epsilon = 1e-9);
    assert_eq!(a.value(), Value::Scalar(2.0));

    b.set_value(1.75);
    assert_relative_eq!(registry.penalty(1.0).unwrap(), 0.0);

    registry.unrestrain(&restraint).unwrap();
    assert!(matches!(
        registry.unrestrain(&restraint),
        Err(FitError::NotFound(_))
    ));
}

#[test]
fn test_proxy_with_dropped_target() {
    let tracker = ChangeTracker::new();
    let mut registry = Registry::new(&tracker, "r");
    let proxy = {
        let temp = Parameter::new(&tracker, "temp", 1.0);
        let proxy = ParameterProxy::new("alias", &temp);
        registry.add_parameter(proxy.clone()).unwrap();
        proxy
    };
    assert!(matches!(proxy.value(), Err(FitError::NotFound(_))));
    assert!(matches!(registry.value("alias"), Err(FitError::NotFound(_))));
    registry.remove_parameter("alias").unwrap();
}
