//! Built-in functions available in every equation.

use crate::error::{FitError, Result};
use crate::value::Value;

/// Functions understood by the compiler without registration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Sin,
    Cos,
    Tan,
    Exp,
    Ln,
    Log10,
    Sqrt,
    Abs,
    Sum,
    Min,
    Max,
}

impl Builtin {
    /// Look up a builtin by the name used in equation strings.
    pub fn from_name(name: &str) -> Option<Self> {
        let builtin = match name {
            "sin" => Self::Sin,
            "cos" => Self::Cos,
            "tan" => Self::Tan,
            "exp" => Self::Exp,
            "log" | "ln" => Self::Ln,
            "log10" => Self::Log10,
            "sqrt" => Self::Sqrt,
            "abs" => Self::Abs,
            "sum" => Self::Sum,
            "min" => Self::Min,
            "max" => Self::Max,
            _ => return None,
        };
        Some(builtin)
    }

    /// Minimum and maximum number of arguments.
    pub fn arity(self) -> (usize, Option<usize>) {
        match self {
            Self::Min | Self::Max => (1, None),
            _ => (1, Some(1)),
        }
    }

    /// Check an argument count against [`Builtin::arity`].
    pub fn check_arity(self, name: &str, count: usize) -> Result<()> {
        let (min, max) = self.arity();
        if count < min || max.map_or(false, |max| count > max) {
            let expected = match max {
                Some(max) if max == min => format!("{}", min),
                Some(max) => format!("{} to {}", min, max),
                None => format!("at least {}", min),
            };
            return Err(FitError::InvalidExpression(format!(
                "{}() requires {} argument(s), got {}",
                name, expected, count
            )));
        }
        Ok(())
    }

    /// Apply the function. `min`/`max` reduce a single argument and combine
    /// several arguments elementwise; `sum` always reduces to a scalar.
    pub fn apply(self, args: &[Value]) -> Result<Value> {
        let first = args
            .first()
            .ok_or_else(|| FitError::Evaluation(format!("{:?} called without arguments", self)))?;
        let value = match self {
            Self::Sin => first.map(f64::sin),
            Self::Cos => first.map(f64::cos),
            Self::Tan => first.map(f64::tan),
            Self::Exp => first.map(f64::exp),
            Self::Ln => first.map(f64::ln),
            Self::Log10 => first.map(f64::log10),
            Self::Sqrt => first.map(f64::sqrt),
            Self::Abs => first.map(f64::abs),
            Self::Sum => Value::Scalar(first.sum()),
            Self::Min | Self::Max => {
                let pick = if self == Self::Min { f64::min } else { f64::max };
                if args.len() == 1 {
                    let init = if self == Self::Min {
                        f64::INFINITY
                    } else {
                        f64::NEG_INFINITY
                    };
                    Value::Scalar(first.fold(init, pick))
                } else {
                    let mut acc = first.clone();
                    for arg in &args[1..] {
                        acc = acc.zip_with(arg, pick)?;
                    }
                    acc
                }
            }
        };
        Ok(value)
    }
}
