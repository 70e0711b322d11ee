//! Tests for the parameter system

mod expression_tests;
mod registry_tests;
