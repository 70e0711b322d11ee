//! Parameter definition and implementation
//!
//! A [`Parameter`] is a named value with its own change tracker. Handles are
//! cheap to clone and clones refer to the same parameter, so a parameter can
//! be shared between registries, proxies and equation leaves. Every mutation
//! clicks the tracker before returning.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::equation::Equation;
use crate::error::Result;
use crate::tracker::{ChangeTracker, TrackerId};
use crate::value::Value;

pub(crate) struct ParameterCell {
    name: String,
    value: RefCell<Value>,
    constraint: RefCell<Option<Rc<Equation>>>,
    tracker: ChangeTracker,
    id: TrackerId,
}

impl Drop for ParameterCell {
    fn drop(&mut self) {
        self.tracker.release(self.id);
    }
}

/// A named, change-tracked value
///
/// Parameters are the leaves of every equation. A parameter may carry a
/// constraint, in which case its *logical* value is the value of the
/// constraint equation; the stored value is left untouched.
#[derive(Clone)]
pub struct Parameter {
    cell: Rc<ParameterCell>,
}

impl fmt::Debug for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Parameter")
            .field("name", &self.cell.name)
            .field("value", &*self.cell.value.borrow())
            .field("constrained", &self.is_constrained())
            .finish()
    }
}

impl Parameter {
    /// Create a new parameter with the given name and value
    ///
    /// # Examples
    ///
    /// ```
    /// use srfit_rs::{ChangeTracker, Parameter, Value};
    ///
    /// let tracker = ChangeTracker::new();
    /// let param = Parameter::new(&tracker, "amplitude", 10.0);
    /// assert_eq!(param.name(), "amplitude");
    /// assert_eq!(param.value(), Value::Scalar(10.0));
    /// ```
    pub fn new(tracker: &ChangeTracker, name: &str, value: impl Into<Value>) -> Self {
        let id = tracker.register();
        Self {
            cell: Rc::new(ParameterCell {
                name: name.to_string(),
                value: RefCell::new(value.into()),
                constraint: RefCell::new(None),
                tracker: tracker.clone(),
                id,
            }),
        }
    }

    /// Get the name of the parameter
    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// Get the stored value of the parameter, ignoring any constraint
    pub fn value(&self) -> Value {
        self.cell.value.borrow().clone()
    }

    /// Get the stored value if it is a scalar
    pub fn scalar(&self) -> Option<f64> {
        self.cell.value.borrow().as_scalar()
    }

    /// Set the value of the parameter and mark it as changed
    ///
    /// ```
    /// use srfit_rs::{ChangeTracker, Parameter};
    ///
    /// let tracker = ChangeTracker::new();
    /// let param = Parameter::new(&tracker, "center", 1.0);
    /// let before = param.stamp();
    /// param.set_value(2.0);
    /// assert!(param.stamp() > before);
    /// ```
    pub fn set_value(&self, value: impl Into<Value>) {
        *self.cell.value.borrow_mut() = value.into();
        self.cell.tracker.click(self.cell.id);
    }

    /// Get the value seen by constraint-aware consumers
    ///
    /// For a constrained parameter this evaluates the constraint equation.
    pub fn logical_value(&self) -> Result<Value> {
        self.logical_stamped().map(|(value, _)| value)
    }

    /// Logical value together with the stamp it depends on.
    pub(crate) fn logical_stamped(&self) -> Result<(Value, u64)> {
        let own = self.stamp();
        let constraint = self.cell.constraint.borrow().clone();
        match constraint {
            Some(eq) => {
                let (value, stamp) = eq.evaluate_stamped()?;
                Ok((value, stamp.max(own)))
            }
            None => Ok((self.value(), own)),
        }
    }

    /// Whether a constraint currently determines this parameter's value
    pub fn is_constrained(&self) -> bool {
        self.cell.constraint.borrow().is_some()
    }

    /// The equation constraining this parameter, if any
    pub fn constraint(&self) -> Option<Rc<Equation>> {
        self.cell.constraint.borrow().clone()
    }

    pub(crate) fn set_constraint(&self, equation: Option<Rc<Equation>>) {
        *self.cell.constraint.borrow_mut() = equation;
        self.cell.tracker.click(self.cell.id);
    }

    /// Tracker slot of this parameter
    pub fn tracker_id(&self) -> TrackerId {
        self.cell.id
    }

    /// Tracker arena this parameter lives in
    pub fn tracker(&self) -> &ChangeTracker {
        &self.cell.tracker
    }

    /// Version stamp of the last change
    pub fn stamp(&self) -> u64 {
        self.cell.tracker.stamp(self.cell.id)
    }

    /// Whether both handles refer to the same parameter
    pub fn ptr_eq(&self, other: &Parameter) -> bool {
        Rc::ptr_eq(&self.cell, &other.cell)
    }

    pub(crate) fn downgrade(&self) -> Weak<ParameterCell> {
        Rc::downgrade(&self.cell)
    }

    pub(crate) fn from_cell(cell: Rc<ParameterCell>) -> Self {
        Self { cell }
    }
}
