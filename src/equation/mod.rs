//! Equations: parsing, compilation and memoized evaluation.
//!
//! A string such as `"A * exp(-(x - x0)**2 / w) + bkg"` is parsed into an
//! [`Expression`], compiled against a [`SymbolTable`] and evaluated as an
//! [`Equation`] graph whose nodes only recompute when something they depend
//! on has changed.

pub mod compiler;
pub mod expression;
pub mod functions;
pub mod graph;

pub use compiler::{compile, Compiled, Symbol, SymbolTable};
pub use expression::{BinaryOp, Expression, UnaryOp};
pub use functions::Builtin;
pub use graph::{Equation, NodeId};
