//! Integration tests for the srfit-rs library
//!
//! This module organizes all integration tests that test the library as a whole,
//! rather than individual components.

// Contribution life cycle: profiles, equations and residual forms
pub mod contribution;

// Incremental recomputation across contributions and generators
pub mod memoization;

// Driving contributions from an optimizer loop
pub mod fitting;
