//! Constraints and restraints
//!
//! A [`Constraint`] ties a parameter's logical value to an equation. A
//! [`Restraint`] leaves values free but reports a penalty when an equation
//! leaves the interval `[lb, ub]`.

use std::rc::Rc;

use crate::equation::Equation;
use crate::error::Result;
use crate::parameters::ParameterRef;
use crate::value::Value;

/// A parameter whose value is computed by an equation
#[derive(Debug, Clone)]
pub struct Constraint {
    parameter: ParameterRef,
    equation: Rc<Equation>,
}

impl Constraint {
    pub(crate) fn new(parameter: ParameterRef, equation: Rc<Equation>) -> Self {
        Self {
            parameter,
            equation,
        }
    }

    /// The constrained parameter
    pub fn parameter(&self) -> &ParameterRef {
        &self.parameter
    }

    /// The equation computing the parameter's logical value
    pub fn equation(&self) -> &Rc<Equation> {
        &self.equation
    }

    /// Current value of the constraint equation
    pub fn value(&self) -> Result<Value> {
        self.equation.evaluate()
    }

    /// Whether this constraint still determines its parameter. A constraint
    /// installed later by another registry supersedes this one.
    pub fn is_active(&self) -> bool {
        self.parameter
            .target()
            .ok()
            .and_then(|p| p.constraint())
            .map_or(false, |eq| Rc::ptr_eq(&eq, &self.equation))
    }
}

/// Soft bounds on the value of an equation
///
/// The penalty of a value `v` is
/// `(max(0, lb - v) + max(0, v - ub))^2 / sig^2`, summed over the elements of
/// array values and multiplied by the caller's weight when `scaled` is set.
#[derive(Debug)]
pub struct Restraint {
    equation: Rc<Equation>,
    lb: f64,
    ub: f64,
    sig: f64,
    scaled: bool,
}

impl Restraint {
    pub fn new(equation: Rc<Equation>, lb: f64, ub: f64, sig: f64, scaled: bool) -> Self {
        Self {
            equation,
            lb,
            ub,
            sig,
            scaled,
        }
    }

    pub fn equation(&self) -> &Rc<Equation> {
        &self.equation
    }

    /// Lower and upper bound
    pub fn bounds(&self) -> (f64, f64) {
        (self.lb, self.ub)
    }

    pub fn sig(&self) -> f64 {
        self.sig
    }

    pub fn is_scaled(&self) -> bool {
        self.scaled
    }

    /// Penalty of the current equation value; `w` applies only when scaled.
    pub fn penalty(&self, w: f64) -> Result<f64> {
        let value = self.equation.evaluate()?;
        let (lb, ub, sig) = (self.lb, self.ub, self.sig);
        let penalty = value.fold(0.0, |acc, v| {
            let excess = (lb - v).max(0.0) + (v - ub).max(0.0);
            acc + excess * excess / (sig * sig)
        });
        Ok(if self.scaled { penalty * w } else { penalty })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::equation::{compile, Symbol, SymbolTable};
    use crate::parameters::Parameter;
    use crate::tracker::ChangeTracker;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn equation_of(tracker: &ChangeTracker, param: &Parameter, source: &str) -> Rc<Equation> {
        let mut table = SymbolTable::new(tracker);
        table.insert(param.name(), Symbol::Parameter(param.into()));
        compile("r", source, &mut table, false).unwrap().equation
    }

    #[test]
    fn test_restraint_penalty() {
        let tracker = ChangeTracker::new();
        let a = Parameter::new(&tracker, "a", 5.0);
        let restraint = Restraint::new(equation_of(&tracker, &a, "a"), 0.0, 3.0, 2.0, false);

        // (5 - 3)^2 / 2^2
        assert_relative_eq!(restraint.penalty(10.0).unwrap(), 1.0);

        a.set_value(1.0);
        assert_relative_eq!(restraint.penalty(10.0).unwrap(), 0.0);

        a.set_value(-1.0);
        let scaled = Restraint::new(equation_of(&tracker, &a, "a"), 0.0, 3.0, 1.0, true);
        assert_relative_eq!(scaled.penalty(0.5).unwrap(), 0.5);
    }

    #[test]
    fn test_restraint_penalty_sums_arrays() {
        let tracker = ChangeTracker::new();
        let a = Parameter::new(&tracker, "a", array![-1.0, 0.5, 2.0]);
        let restraint = Restraint::new(equation_of(&tracker, &a, "a"), 0.0, 1.0, 1.0, false);
        assert_relative_eq!(restraint.penalty(1.0).unwrap(), 2.0);
    }

    #[test]
    fn test_constraint_activity() {
        let tracker = ChangeTracker::new();
        let p = Parameter::new(&tracker, "p", 0.0);
        let q = Parameter::new(&tracker, "q", 3.0);
        let eq = equation_of(&tracker, &q, "2 * q");
        let constraint = Constraint::new(ParameterRef::from(&p), eq.clone());
        assert!(!constraint.is_active());

        p.set_constraint(Some(eq));
        assert!(constraint.is_active());
        assert_relative_eq!(constraint.value().unwrap().sum(), 6.0);
    }
}
