//! Integration tests for incremental recomputation
//!
//! Each test counts node recomputations or closure calls to check that only
//! the parts of a model whose inputs changed are evaluated again.

use std::cell::Cell;
use std::rc::Rc;

use ndarray::array;
use srfit_rs::{
    Calculator, ChangeTracker, FitContribution, FnCalculator, FnGenerator, ParameterProxy,
    ProfileGenerator, Value,
};

use crate::test_helpers::bound_contribution;

#[test]
fn test_generator_runs_only_when_its_inputs_change() {
    let tracker = ChangeTracker::new();
    let (mut contribution, profile) = bound_contribution(&tracker, "c");

    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let mut gen = FnGenerator::new(&tracker, "line", move |reg, x| {
        counter.set(counter.get() + 1);
        let slope = reg.value("slope")?.sum();
        Ok(x.mapv(|x| slope * x))
    });
    gen.registry_mut().new_parameter("slope", 2.0).unwrap();
    let gen = gen.into_shared();

    contribution.add_generator(gen.clone(), None).unwrap();
    assert_eq!(contribution.equation_source(), Some("line"));
    contribution.set_equation("line + bkg").unwrap();
    let main = contribution.equation().unwrap();

    assert_eq!(contribution.residual().unwrap(), array![1.0, 2.0, 1.0]);
    assert_eq!(calls.get(), 1);
    assert_eq!(main.recomputations(), 2);

    // Nothing changed.
    contribution.residual().unwrap();
    assert_eq!(calls.get(), 1);
    assert_eq!(main.recomputations(), 2);

    // A parameter outside the generator.
    contribution.set_value("bkg", 0.0).unwrap();
    assert_eq!(contribution.residual().unwrap(), array![0.0, 1.0, 0.0]);
    assert_eq!(calls.get(), 1);
    assert_eq!(main.recomputations(), 3);

    // A parameter of the generator.
    gen.borrow().registry().set_value("slope", 1.0).unwrap();
    assert_eq!(contribution.residual().unwrap(), array![0.0, 0.0, -2.0]);
    assert_eq!(calls.get(), 2);

    // New observed grid.
    profile
        .borrow_mut()
        .set_observed_profile(array![0.0, 1.0], array![0.0, 1.0], None)
        .unwrap();
    assert_eq!(contribution.residual().unwrap(), array![0.0, 0.0]);
    assert_eq!(calls.get(), 3);
}

#[test]
fn test_calculator_parameters_invalidate_callers() {
    let tracker = ChangeTracker::new();
    let (mut contribution, _) = bound_contribution(&tracker, "c");

    let calls = Rc::new(Cell::new(0));
    let counter = calls.clone();
    let mut calc = FnCalculator::new(&tracker, "shift", move |reg, args| {
        counter.set(counter.get() + 1);
        let offset = reg.value("offset")?.sum();
        Ok(args[0].map(|v| v + offset))
    });
    calc.registry_mut().new_parameter("offset", 1.0).unwrap();
    let calc = calc.into_shared();

    contribution.add_calculator(calc.clone(), None).unwrap();
    contribution.set_equation("shift(x**2)").unwrap();

    assert_eq!(contribution.residual().unwrap(), array![1.0, 1.0, 1.0]);
    contribution.residual().unwrap();
    assert_eq!(calls.get(), 1);

    calc.borrow().registry().set_value("offset", 0.0).unwrap();
    assert_eq!(contribution.residual().unwrap(), array![0.0, 0.0, 0.0]);
    assert_eq!(calls.get(), 2);
}

#[test]
fn test_constraint_inputs_invalidate_equations() {
    let tracker = ChangeTracker::new();
    let (mut contribution, _) = bound_contribution(&tracker, "c");
    contribution.set_equation("a * x**2").unwrap();
    contribution.new_parameter("b", 1.0).unwrap();
    let a = contribution.parameter("a").unwrap();
    contribution.constrain(&a, "b / 2").unwrap();

    assert_eq!(contribution.evaluate().unwrap(), Value::from(array![0.0, 0.5, 2.0]));
    contribution.set_value("b", 2.0).unwrap();
    assert_eq!(contribution.evaluate().unwrap(), Value::from(array![0.0, 1.0, 4.0]));

    contribution.unconstrain(&a).unwrap();
    a.set_value(3.0);
    assert_eq!(contribution.evaluate().unwrap(), Value::from(array![0.0, 3.0, 12.0]));
}

#[test]
fn test_proxy_shares_parameter_across_contributions() {
    let tracker = ChangeTracker::new();
    let (mut first, _) = bound_contribution(&tracker, "first");
    let (mut second, _) = bound_contribution(&tracker, "second");

    let scale = first.new_parameter("scale", 1.0).unwrap();
    first.set_equation("scale * x**2").unwrap();
    second
        .add_parameter(ParameterProxy::new("s", &scale))
        .unwrap();
    second.set_equation("s * x**2").unwrap();
    assert_eq!(first.residual().unwrap(), second.residual().unwrap());

    let before = second.equation().unwrap().recomputations();
    second.residual().unwrap();
    assert_eq!(second.equation().unwrap().recomputations(), before);

    first.set_value("scale", 2.0).unwrap();
    assert_eq!(second.value("s").unwrap(), Value::Scalar(2.0));
    assert_eq!(second.residual().unwrap(), array![0.0, 1.0, 4.0]);
    assert!(second.equation().unwrap().recomputations() > before);
    assert_eq!(first.residual().unwrap(), second.residual().unwrap());
}

#[test]
fn test_shared_subexpression_evaluated_once() {
    let tracker = ChangeTracker::new();
    let mut contribution = FitContribution::new(&tracker, "c");
    contribution.set_equation("(a + 1) * (a + 1)").unwrap();
    let main = contribution.equation().unwrap();

    assert_eq!(contribution.evaluate().unwrap(), Value::Scalar(4.0));
    let first = main.recomputations();
    contribution.evaluate().unwrap();
    assert_eq!(main.recomputations(), first);
}
