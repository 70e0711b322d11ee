//! Tests for expression parsing and compilation

use approx::assert_relative_eq;
use ndarray::array;
use srfit_rs::equation::{BinaryOp, Expression};
use srfit_rs::{compile, ChangeTracker, FitError, Parameter, Symbol, SymbolTable, Value};

#[test]
fn test_expression_parsing() {
    let expr = Expression::parse("a * exp(-(x - x0)**2 / w) + bkg").unwrap();
    assert_eq!(expr.variables(), vec!["a", "bkg", "w", "x", "x0"]);
    assert_eq!(expr.functions(), vec!["exp"]);

    match Expression::parse("1 - 2 - 3").unwrap() {
        Expression::Binary(BinaryOp::Sub, lhs, _) => {
            assert!(matches!(*lhs, Expression::Binary(BinaryOp::Sub, _, _)));
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_parse_errors_carry_token() {
    match Expression::parse("a + * b") {
        Err(FitError::Parse { token, .. }) => assert_eq!(token, "*"),
        other => panic!("unexpected {:?}", other),
    }
    match Expression::parse("a b") {
        Err(FitError::Parse { token, .. }) => assert_eq!(token, "b"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn test_operator_semantics() {
    let tracker = ChangeTracker::new();
    let mut table = SymbolTable::new(&tracker);
    let eval = |table: &mut SymbolTable, source: &str| {
        compile("t", source, table, false)
            .unwrap()
            .equation
            .evaluate()
            .unwrap()
    };
    assert_eq!(eval(&mut table, "2 ** 3 ** 2"), Value::Scalar(512.0));
    assert_eq!(eval(&mut table, "-2 ^ 2"), Value::Scalar(-4.0));
    assert_eq!(eval(&mut table, "8 / 2 / 2"), Value::Scalar(2.0));
    assert_eq!(eval(&mut table, "1 / 0"), Value::Scalar(f64::INFINITY));
    assert_relative_eq!(eval(&mut table, "log(exp(2))").sum(), 2.0);
}

#[test]
fn test_array_arithmetic() {
    let tracker = ChangeTracker::new();
    let mut table = SymbolTable::new(&tracker);
    let x = Parameter::new(&tracker, "x", array![1.0, 2.0, 3.0]);
    let short = Parameter::new(&tracker, "short", array![1.0, 2.0]);
    table.insert("x", Symbol::Parameter(x.into()));
    table.insert("short", Symbol::Parameter(short.into()));

    let eq = compile("t", "2 * x + sum(x)", &mut table, false)
        .unwrap()
        .equation;
    assert_eq!(eq.evaluate().unwrap(), Value::from(array![8.0, 10.0, 12.0]));

    let bad = compile("t", "x + short", &mut table, false).unwrap().equation;
    assert!(matches!(
        bad.evaluate(),
        Err(FitError::ShapeMismatch {
            expected: 3,
            found: 2
        })
    ));
}
