//! # Parameter System
//!
//! Named, change-tracked values and the registries that own them.
//!
//! ## Core Components
//!
//! - [`Parameter`]: a shared handle on a named value with its own tracker slot
//! - [`ParameterProxy`]: a non-owning alias of someone else's parameter
//! - [`Registry`]: a namespace of parameters, child registries, equations and
//!   calculators with collision checks on every insertion
//! - [`Constraint`] and [`Restraint`]: equations that fix or penalize values
//!
//! ## Example Usage
//!
//! ```rust
//! use srfit_rs::parameters::{ParameterProxy, Registry};
//! use srfit_rs::{ChangeTracker, Value};
//!
//! let tracker = ChangeTracker::new();
//! let mut phase = Registry::new(&tracker, "phase");
//! let lattice = phase.new_parameter("a", 3.9).unwrap();
//!
//! // Expose the lattice constant of the phase under another name
//! let mut contribution = Registry::new(&tracker, "contribution");
//! contribution
//!     .add_parameter(ParameterProxy::new("a_phase", &lattice))
//!     .unwrap();
//!
//! contribution.set_value("a_phase", 4.0).unwrap();
//! assert_eq!(phase.value("a").unwrap(), Value::Scalar(4.0));
//! ```

pub mod constraints;
pub mod parameter;
pub mod proxy;
pub mod registry;


pub use constraints::{Constraint, Restraint};
pub use parameter::Parameter;
pub use proxy::{ParameterProxy, ParameterRef};
pub use registry::{Registry, SharedRegistry};
