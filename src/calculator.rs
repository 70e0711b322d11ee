//! Calculators: registry-backed functions callable from equations.
//!
//! A calculator owns a [`Registry`] of its own parameters and is invoked as
//! `name(arg, ...)` inside an equation. Its parameters propagate changes into
//! every registry it is registered with.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::error::Result;
use crate::parameters::Registry;
use crate::tracker::ChangeTracker;
use crate::value::Value;

/// Calculator shared between registries and equation nodes
pub type SharedCalculator = Rc<RefCell<dyn Calculator>>;

/// A function of its arguments and of its own parameters
pub trait Calculator {
    /// Parameters of the calculator
    fn registry(&self) -> &Registry;

    fn registry_mut(&mut self) -> &mut Registry;

    /// Default name used when registering the calculator
    fn name(&self) -> &str {
        self.registry().name()
    }

    /// Compute the output for already evaluated arguments.
    fn calculate(&self, args: &[Value]) -> Result<Value>;
}

type CalculatorFn = dyn Fn(&Registry, &[Value]) -> Result<Value>;

/// Calculator backed by a closure
pub struct FnCalculator {
    registry: Registry,
    func: Box<CalculatorFn>,
}

impl fmt::Debug for FnCalculator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCalculator")
            .field("registry", &self.registry)
            .finish()
    }
}

impl FnCalculator {
    /// Create a calculator named `name`
    ///
    /// The closure receives the calculator's registry, so it can read its own
    /// parameters with [`Registry::value`].
    pub fn new<F>(tracker: &ChangeTracker, name: &str, func: F) -> Self
    where
        F: Fn(&Registry, &[Value]) -> Result<Value> + 'static,
    {
        Self {
            registry: Registry::new(tracker, name),
            func: Box::new(func),
        }
    }

    pub fn into_shared(self) -> SharedCalculator {
        Rc::new(RefCell::new(self))
    }
}

impl Calculator for FnCalculator {
    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    fn calculate(&self, args: &[Value]) -> Result<Value> {
        (self.func)(&self.registry, args)
    }
}
