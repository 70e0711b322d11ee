//! Observed data and the calculated signal.

use std::cell::RefCell;
use std::rc::Rc;

use ndarray::Array1;
use tracing::debug;

use crate::error::{FitError, Result};
use crate::parameters::Parameter;
use crate::tracker::ChangeTracker;
use crate::value::Value;

/// Profile shared between a contribution and its generators
pub type SharedProfile = Rc<RefCell<Profile>>;

/// Observed `x`, `y` and `dy` arrays plus the last calculated signal
///
/// The observed columns are parameters, so contributions can expose them as
/// proxies and equations can refer to them by name.
#[derive(Debug)]
pub struct Profile {
    xpar: Parameter,
    ypar: Parameter,
    dypar: Parameter,
    ycalc: Option<Array1<f64>>,
}

impl Profile {
    /// Create an empty profile with columns named `x`, `y` and `dy`.
    pub fn new(tracker: &ChangeTracker) -> Self {
        Self::with_names(tracker, "x", "y", "dy")
    }

    /// Create an empty profile with custom column names.
    pub fn with_names(tracker: &ChangeTracker, x: &str, y: &str, dy: &str) -> Self {
        let empty = || Value::Array(Array1::zeros(0));
        Self {
            xpar: Parameter::new(tracker, x, empty()),
            ypar: Parameter::new(tracker, y, empty()),
            dypar: Parameter::new(tracker, dy, empty()),
            ycalc: None,
        }
    }

    pub fn into_shared(self) -> SharedProfile {
        Rc::new(RefCell::new(self))
    }

    /// Set the observed data
    ///
    /// # Arguments
    ///
    /// * `x` - Independent variable
    /// * `y` - Observed signal
    /// * `dy` - Uncertainties of `y`; `None` means ones
    ///
    /// # Returns
    ///
    /// `ShapeMismatch` if the arrays differ in length. The calculated signal
    /// is cleared.
    pub fn set_observed_profile(
        &mut self,
        x: Array1<f64>,
        y: Array1<f64>,
        dy: Option<Array1<f64>>,
    ) -> Result<()> {
        let dy = dy.unwrap_or_else(|| Array1::ones(y.len()));
        for len in [x.len(), dy.len()] {
            if len != y.len() {
                return Err(FitError::ShapeMismatch {
                    expected: y.len(),
                    found: len,
                });
            }
        }
        debug!(points = y.len(), "set observed profile");
        self.xpar.set_value(x);
        self.ypar.set_value(y);
        self.dypar.set_value(dy);
        self.ycalc = None;
        Ok(())
    }

    pub fn x(&self) -> Array1<f64> {
        column(&self.xpar)
    }

    pub fn y(&self) -> Array1<f64> {
        column(&self.ypar)
    }

    pub fn dy(&self) -> Array1<f64> {
        column(&self.dypar)
    }

    pub fn xpar(&self) -> &Parameter {
        &self.xpar
    }

    pub fn ypar(&self) -> &Parameter {
        &self.ypar
    }

    pub fn dypar(&self) -> &Parameter {
        &self.dypar
    }

    /// Signal computed by the last residual evaluation
    pub fn ycalc(&self) -> Option<&Array1<f64>> {
        self.ycalc.as_ref()
    }

    pub fn set_ycalc(&mut self, ycalc: Array1<f64>) {
        self.ycalc = Some(ycalc);
    }

    /// Number of observed points
    pub fn len(&self) -> usize {
        self.y().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn column(param: &Parameter) -> Array1<f64> {
    match param.value() {
        Value::Array(a) => a,
        Value::Scalar(v) => Array1::from_elem(1, v),
    }
}
