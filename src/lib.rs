//! # srfit-rs
//!
//! `srfit-rs` is an incremental residual engine for curve fitting. A model is
//! written as a string equation over named parameters, bound to observed data
//! and evaluated as a residual array that an external optimizer minimizes.
//!
//! The library provides:
//! - Version-stamped change tracking so that only stale parts of a model are
//!   recomputed between optimizer steps
//! - Registries with collision-checked namespaces, proxies, constraints and
//!   restraints
//! - A compiler from expression strings to memoized equation graphs
//! - Fit contributions tying profiles, generators, calculators and residual
//!   forms together
//!
//! ## Basic Usage
//!
//! ```
//! use ndarray::array;
//! use srfit_rs::{ChangeTracker, FitContribution, Profile};
//!
//! let tracker = ChangeTracker::new();
//! let profile = Profile::new(&tracker).into_shared();
//! profile
//!     .borrow_mut()
//!     .set_observed_profile(array![0.0, 1.0, 2.0], array![0.0, 1.0, 4.0], None)
//!     .unwrap();
//!
//! let mut contribution = FitContribution::new(&tracker, "parabola");
//! contribution.set_profile(profile).unwrap();
//! contribution.set_equation("x").unwrap();
//!
//! assert_eq!(contribution.residual().unwrap(), array![0.0, 0.0, -2.0]);
//! ```
//!
//! Everything is single-threaded: handles are `Rc`-based, and mutating shared
//! parameters from several threads is the caller's responsibility.

// Public modules
pub mod error;
pub mod tracker;
pub mod value;

// Parameter system
pub mod parameters;

// Equations and the objects they can call
pub mod calculator;
pub mod equation;
pub mod generator;

pub mod config;
pub mod contribution;
pub mod problem;
pub mod profile;

// Re-exports for convenience
pub use calculator::{Calculator, FnCalculator, SharedCalculator};
pub use config::{ContributionConfig, ResidualForm};
pub use contribution::{ContributionState, ContributionSummary, FitContribution};
pub use equation::{compile, Compiled, Equation, Expression, Symbol, SymbolTable};
pub use error::{FitError, Result};
pub use generator::{FnGenerator, ProfileGenerator, SharedGenerator};
pub use parameters::{
    Constraint, Parameter, ParameterProxy, ParameterRef, Registry, Restraint, SharedRegistry,
};
pub use problem::{FitProblem, Problem};
pub use profile::{Profile, SharedProfile};
pub use tracker::{ChangeTracker, TrackerId};
pub use value::Value;

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
