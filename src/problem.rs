//! Problem definition for optimizers
//!
//! Optimizers work on flat vectors. The [`Problem`] trait is the interface
//! they drive, and [`FitProblem`] implements it for a [`FitContribution`] by
//! mapping each vector element onto a named scalar parameter.

use ndarray::{Array1, Array2};

use crate::contribution::FitContribution;
use crate::error::{FitError, Result};
use crate::parameters::Parameter;
use crate::value::Value;

/// Default step size for finite differences.
const DEFAULT_EPSILON: f64 = 1e-8;

/// A least-squares problem over a flat parameter vector.
pub trait Problem {
    /// Evaluate the residuals at the given parameter values.
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>>;

    /// Number of parameters in the problem.
    fn parameter_count(&self) -> usize;

    /// Number of residuals.
    fn residual_count(&self) -> usize;

    /// Jacobian of the residuals, by forward differences unless overridden.
    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        finite_difference_jacobian(self, params, None)
    }

    /// Sum of squared residuals.
    fn eval_cost(&self, params: &Array1<f64>) -> Result<f64> {
        let residuals = self.eval(params)?;
        Ok(residuals.iter().map(|r| r.powi(2)).sum())
    }
}

/// Compute the Jacobian matrix using forward finite differences.
///
/// # Arguments
///
/// * `problem` - The problem to evaluate
/// * `params` - The parameter values at which to evaluate the Jacobian
/// * `epsilon` - The step size for finite differences (optional)
///
/// # Returns
///
/// * `Result<Array2<f64>>` - The Jacobian matrix, `J[i, j] = d residual[i] / d param[j]`
pub fn finite_difference_jacobian<P: Problem + ?Sized>(
    problem: &P,
    params: &Array1<f64>,
    epsilon: Option<f64>,
) -> Result<Array2<f64>> {
    let eps = epsilon.unwrap_or(DEFAULT_EPSILON);
    let residuals = problem.eval(params)?;
    let mut jac = Array2::zeros((residuals.len(), params.len()));

    for j in 0..params.len() {
        let mut perturbed = params.clone();
        // Adapt epsilon to parameter scale
        let eps_j = if params[j].abs() > eps {
            params[j].abs() * eps
        } else {
            eps
        };
        perturbed[j] += eps_j;

        let shifted = problem.eval(&perturbed)?;
        if shifted.len() != residuals.len() {
            return Err(FitError::ShapeMismatch {
                expected: residuals.len(),
                found: shifted.len(),
            });
        }
        for i in 0..residuals.len() {
            jac[[i, j]] = (shifted[i] - residuals[i]) / eps_j;
        }
    }
    Ok(jac)
}

/// Flat-vector view of a contribution's scalar parameters
///
/// # Examples
///
/// ```
/// use ndarray::array;
/// use srfit_rs::{ChangeTracker, FitContribution, FitProblem, Problem, Profile};
///
/// let tracker = ChangeTracker::new();
/// let profile = Profile::new(&tracker).into_shared();
/// profile
///     .borrow_mut()
///     .set_observed_profile(array![0.0, 1.0, 2.0], array![1.0, 3.0, 5.0], None)
///     .unwrap();
///
/// let mut contribution = FitContribution::new(&tracker, "line");
/// contribution.set_profile(profile).unwrap();
/// contribution.set_equation("m * x + b").unwrap();
///
/// let problem = FitProblem::new(&contribution, &["m", "b"]).unwrap();
/// assert_eq!(problem.eval_cost(&array![2.0, 1.0]).unwrap(), 0.0);
/// ```
pub struct FitProblem<'a> {
    contribution: &'a FitContribution,
    variables: Vec<Parameter>,
}

impl<'a> FitProblem<'a> {
    /// Select the parameters the optimizer may vary.
    ///
    /// Constrained parameters fail with `ConstrainedVariable`, array-valued
    /// ones with `ShapeMismatch`.
    pub fn new(contribution: &'a FitContribution, names: &[&str]) -> Result<Self> {
        let variables = names
            .iter()
            .map(|name| {
                let param = contribution.parameter(name)?;
                if param.is_constrained() {
                    return Err(FitError::ConstrainedVariable(name.to_string()));
                }
                if let Some(len) = param.value().len() {
                    return Err(FitError::ShapeMismatch {
                        expected: 1,
                        found: len,
                    });
                }
                Ok(param)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            contribution,
            variables,
        })
    }

    /// Names of the variables, in vector order.
    pub fn names(&self) -> Vec<&str> {
        self.variables.iter().map(Parameter::name).collect()
    }

    /// Current values of the variables.
    pub fn values(&self) -> Array1<f64> {
        self.variables
            .iter()
            .map(|p| p.scalar().unwrap_or(f64::NAN))
            .collect()
    }

    /// Write `params` into the variables, touching only those that changed.
    pub fn apply(&self, params: &Array1<f64>) -> Result<()> {
        if params.len() != self.variables.len() {
            return Err(FitError::ShapeMismatch {
                expected: self.variables.len(),
                found: params.len(),
            });
        }
        for (param, &value) in self.variables.iter().zip(params.iter()) {
            if param.value() != Value::Scalar(value) {
                param.set_value(value);
            }
        }
        Ok(())
    }
}

impl Problem for FitProblem<'_> {
    fn eval(&self, params: &Array1<f64>) -> Result<Array1<f64>> {
        self.apply(params)?;
        self.contribution.residual()
    }

    fn parameter_count(&self) -> usize {
        self.variables.len()
    }

    fn residual_count(&self) -> usize {
        self.contribution
            .profile()
            .map_or(0, |profile| profile.borrow().len())
    }

    /// Forward differences, leaving the variables at `params` afterwards.
    fn jacobian(&self, params: &Array1<f64>) -> Result<Array2<f64>> {
        let jac = finite_difference_jacobian(self, params, None)?;
        self.apply(params)?;
        Ok(jac)
    }
}
