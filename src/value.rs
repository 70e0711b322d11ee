//! Numeric container flowing through equations.
//!
//! A [`Value`] is either a scalar or a one-dimensional array. Arithmetic is
//! elementwise; a scalar broadcasts against an array, two arrays must have
//! the same length.

use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::error::{FitError, Result};

/// Scalar or array value held by parameters and produced by equations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A single number
    Scalar(f64),

    /// A one-dimensional signal
    Array(Array1<f64>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Scalar(0.0)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<Array1<f64>> for Value {
    fn from(v: Array1<f64>) -> Self {
        Value::Array(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::Array(Array1::from(v))
    }
}

impl From<&[f64]> for Value {
    fn from(v: &[f64]) -> Self {
        Value::Array(Array1::from(v.to_vec()))
    }
}

impl Value {
    /// Number of elements, `None` for scalars.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::Scalar(_) => None,
            Value::Array(a) => Some(a.len()),
        }
    }

    /// The scalar, if this is one.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Array(_) => None,
        }
    }

    /// The array, if this is one.
    pub fn as_array(&self) -> Option<&Array1<f64>> {
        match self {
            Value::Scalar(_) => None,
            Value::Array(a) => Some(a),
        }
    }

    /// Convert into an array of length `len`, broadcasting scalars.
    pub fn into_array(self, len: usize) -> Result<Array1<f64>> {
        match self {
            Value::Scalar(v) => Ok(Array1::from_elem(len, v)),
            Value::Array(a) if a.len() == len => Ok(a),
            Value::Array(a) => Err(FitError::ShapeMismatch {
                expected: len,
                found: a.len(),
            }),
        }
    }

    /// Apply `f` to every element.
    pub fn map(&self, f: impl Fn(f64) -> f64) -> Value {
        match self {
            Value::Scalar(v) => Value::Scalar(f(*v)),
            Value::Array(a) => Value::Array(a.mapv(f)),
        }
    }

    /// Combine two values elementwise.
    pub fn zip_with(&self, other: &Value, f: impl Fn(f64, f64) -> f64) -> Result<Value> {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(f(*a, *b))),
            (Value::Scalar(a), Value::Array(b)) => Ok(Value::Array(b.mapv(|b| f(*a, b)))),
            (Value::Array(a), Value::Scalar(b)) => Ok(Value::Array(a.mapv(|a| f(a, *b)))),
            (Value::Array(a), Value::Array(b)) => {
                if a.len() != b.len() {
                    return Err(FitError::ShapeMismatch {
                        expected: a.len(),
                        found: b.len(),
                    });
                }
                Ok(Value::Array(
                    a.iter().zip(b.iter()).map(|(&a, &b)| f(a, b)).collect(),
                ))
            }
        }
    }

    /// Sum of all elements.
    pub fn sum(&self) -> f64 {
        match self {
            Value::Scalar(v) => *v,
            Value::Array(a) => a.sum(),
        }
    }

    /// Fold all elements with `f`, starting from `init`.
    pub fn fold(&self, init: f64, f: impl Fn(f64, f64) -> f64) -> f64 {
        match self {
            Value::Scalar(v) => f(init, *v),
            Value::Array(a) => a.iter().fold(init, |acc, &v| f(acc, v)),
        }
    }
}
