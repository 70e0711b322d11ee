//! Profile generators: registry-backed producers of a calculated signal.
//!
//! A generator evaluates its model over the `x` grid of the profile it is
//! bound to. Inside an equation it is referenced by bare name, and its node
//! is stale whenever the generator's parameters or the profile grid change.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use ndarray::Array1;

use crate::error::{FitError, Result};
use crate::parameters::Registry;
use crate::profile::SharedProfile;
use crate::tracker::ChangeTracker;
use crate::value::Value;

/// Generator shared between a contribution and equation nodes
pub type SharedGenerator = Rc<RefCell<dyn ProfileGenerator>>;

/// Something that computes a signal over a profile's `x` values
pub trait ProfileGenerator {
    /// Parameters of the generator
    fn registry(&self) -> &Registry;

    fn registry_mut(&mut self) -> &mut Registry;

    /// Default name used when the generator is added to a contribution
    fn name(&self) -> &str {
        self.registry().name()
    }

    /// Bind the generator to a profile
    fn set_profile(&mut self, profile: SharedProfile);

    fn profile(&self) -> Option<&SharedProfile>;

    /// Compute the signal on the grid `x`.
    fn generate(&self, x: &Array1<f64>) -> Result<Array1<f64>>;
}

impl fmt::Debug for dyn ProfileGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProfileGenerator({})", self.name())
    }
}

/// Stamp covering the generator's parameters and its profile grid.
pub(crate) fn stamp(gen: &dyn ProfileGenerator) -> Result<u64> {
    let profile = gen.profile().ok_or(FitError::ProfileNotSet)?;
    let grid = profile.borrow().xpar().stamp();
    Ok(gen.registry().logical_stamp()?.max(grid))
}

/// Evaluate the generator over its profile grid.
pub(crate) fn signal(gen: &dyn ProfileGenerator) -> Result<Value> {
    let profile = gen.profile().ok_or(FitError::ProfileNotSet)?;
    let x = profile.borrow().x();
    Ok(Value::Array(gen.generate(&x)?))
}

type GeneratorFn = dyn Fn(&Registry, &Array1<f64>) -> Result<Array1<f64>>;

/// Generator backed by a closure
pub struct FnGenerator {
    registry: Registry,
    profile: Option<SharedProfile>,
    func: Box<GeneratorFn>,
}

impl fmt::Debug for FnGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnGenerator")
            .field("registry", &self.registry)
            .field("bound", &self.profile.is_some())
            .finish()
    }
}

impl FnGenerator {
    /// Create a generator named `name`
    ///
    /// # Examples
    ///
    /// ```
    /// use ndarray::array;
    /// use srfit_rs::{ChangeTracker, FnGenerator, ProfileGenerator};
    ///
    /// let tracker = ChangeTracker::new();
    /// let mut line = FnGenerator::new(&tracker, "line", |reg, x| {
    ///     let slope = reg.value("slope")?.sum();
    ///     Ok(x.mapv(|x| slope * x))
    /// });
    /// line.registry_mut().new_parameter("slope", 2.0).unwrap();
    ///
    /// let y = line.generate(&array![0.0, 1.0, 2.0]).unwrap();
    /// assert_eq!(y, array![0.0, 2.0, 4.0]);
    /// ```
    pub fn new<F>(tracker: &ChangeTracker, name: &str, func: F) -> Self
    where
        F: Fn(&Registry, &Array1<f64>) -> Result<Array1<f64>> + 'static,
    {
        Self {
            registry: Registry::new(tracker, name),
            profile: None,
            func: Box::new(func),
        }
    }

    pub fn into_shared(self) -> SharedGenerator {
        Rc::new(RefCell::new(self))
    }
}

impl ProfileGenerator for FnGenerator {
    fn registry(&self) -> &Registry {
        &self.registry
    }

    fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    fn set_profile(&mut self, profile: SharedProfile) {
        self.profile = Some(profile);
    }

    fn profile(&self) -> Option<&SharedProfile> {
        self.profile.as_ref()
    }

    fn generate(&self, x: &Array1<f64>) -> Result<Array1<f64>> {
        (self.func)(&self.registry, x)
    }
}
