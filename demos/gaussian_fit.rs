//! Example of fitting a Gaussian peak through a fit contribution.
//!
//! The peak is a generator with its own parameters, the background is an
//! equation over parameters created on the fly, and a small damped
//! Gauss-Newton loop drives the residual through [`FitProblem`].

use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};
use srfit_rs::{
    ChangeTracker, FitContribution, FitProblem, FnGenerator, Problem, Profile, ProfileGenerator,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Gaussian peak fit");
    println!("=================\n");

    // y = 3.0 * exp(-(x-1.5)^2 / (2*0.75^2)) + 0.5 + noise
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let noise = Normal::new(0.0, 0.05)?;
    let x = Array1::linspace(-5.0, 5.0, 101);
    let y = x.mapv(|x| 3.0 * (-0.5 * ((x - 1.5) / 0.75_f64).powi(2)).exp() + 0.5)
        + Array1::from_iter((0..x.len()).map(|_| noise.sample(&mut rng)));
    let dy = Array1::from_elem(x.len(), 0.05);

    let tracker = ChangeTracker::new();
    let profile = Profile::new(&tracker).into_shared();
    profile.borrow_mut().set_observed_profile(x, y, Some(dy))?;

    let mut peak = FnGenerator::new(&tracker, "peak", |reg, x| {
        let amplitude = reg.value("amplitude")?.sum();
        let center = reg.value("center")?.sum();
        let sigma = reg.value("sigma")?.sum();
        Ok(x.mapv(|x| amplitude * (-0.5 * ((x - center) / sigma).powi(2)).exp()))
    });
    let amplitude = peak.registry_mut().new_parameter("amplitude", 2.0)?;
    let center = peak.registry_mut().new_parameter("center", 1.0)?;
    let sigma = peak.registry_mut().new_parameter("sigma", 1.0)?;
    peak.registry_mut().restrain("sigma", 0.1, 5.0, 0.01, false)?;

    let mut contribution = FitContribution::new(&tracker, "gaussian");
    contribution.set_profile(profile.clone())?;
    contribution.add_generator(peak.into_shared(), None)?;
    contribution.set_equation("peak + bkg")?;
    contribution.add_parameter(amplitude)?;
    contribution.add_parameter(center)?;
    contribution.add_parameter(sigma)?;

    let names = ["amplitude", "center", "sigma", "bkg"];
    let problem = FitProblem::new(&contribution, &names)?;
    let mut params = problem.values();
    let mut lambda = 1e-3;
    let mut cost = problem.eval_cost(&params)?;
    println!("Initial chi^2 = {:.3}", cost);

    for iteration in 0..50 {
        let residual = problem.eval(&params)?;
        let jac = problem.jacobian(&params)?;
        let step = damped_step(&jac, &residual, lambda)?;
        let trial = &params + &step;
        let trial_cost = problem.eval_cost(&trial)?;
        if trial_cost < cost {
            let improvement = cost - trial_cost;
            params = trial;
            cost = trial_cost;
            lambda = (lambda / 10.0).max(1e-12);
            if improvement < 1e-10 * cost.max(1.0) {
                println!("Converged after {} iterations", iteration + 1);
                break;
            }
        } else {
            lambda *= 10.0;
        }
    }
    problem.apply(&params)?;

    println!("\nResults:");
    for name in names {
        println!("  {:<10} = {:.4}", name, contribution.value(name)?.sum());
    }
    println!("  chi^2      = {:.3}", contribution.chi2()?);
    println!("  Rw         = {:.5}", contribution.rw()?);
    println!("  penalty    = {:.3}", contribution.penalty(1.0)?);
    println!("\nSummary:\n{}", contribution.to_json()?);

    Ok(())
}

/// Solve `(J^T J + lambda diag(J^T J)) step = -J^T r` by Gaussian elimination.
fn damped_step(
    jac: &Array2<f64>,
    residual: &Array1<f64>,
    lambda: f64,
) -> Result<Array1<f64>, Box<dyn std::error::Error>> {
    let mut a = jac.t().dot(jac);
    let mut b = -jac.t().dot(residual);
    let n = b.len();
    for i in 0..n {
        a[[i, i]] *= 1.0 + lambda;
    }

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .ok_or("empty system")?;
        if a[[pivot, col]].abs() < 1e-300 {
            return Err("singular normal equations".into());
        }
        for k in 0..n {
            a.swap([col, k], [pivot, k]);
        }
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut step = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * step[k]).sum();
        step[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(step)
}
