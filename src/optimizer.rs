//! # Constrained Optimizer
//!
//! $$
//! \max_{\mathbf{w}} \ \mathbf{w}\cdot\mu - \frac{\lambda}{2}\mathbf{w}^\top \Sigma \mathbf{w}
//! \quad \text{s.t.} \quad \sum_i w_i = 1,\ \ l \le w_i \le u
//! $$
//!
//! Nelder-Mead over a sigmoid-bounded parameterization with a quadratic
//! budget penalty. Box bounds hold by construction; the budget is enforced
//! by penalty during the search and by exact projection afterwards. A
//! candidate that cannot be made feasible surfaces as an error for the
//! caller to handle, never as a silent fallback.

use argmin::core::CostFunction;
use argmin::core::Executor;
use argmin::solver::neldermead::NelderMead;
use nalgebra::DMatrix;
use nalgebra::DVector;

use crate::error::AllocationError;
use crate::error::Result;

const BUDGET_PENALTY: f64 = 1e4;
const MAX_ITERS: u64 = 5000;
const BUDGET_TOL: f64 = 1e-6;

fn sigmoid(x: f64) -> f64 {
  1.0 / (1.0 + (-x).exp())
}

fn logit(p: f64) -> f64 {
  (p / (1.0 - p)).ln()
}

/// Map unconstrained solver parameters into the per-asset box.
fn bounded_weights(x: &[f64], lower: f64, upper: f64) -> Vec<f64> {
  x.iter()
    .map(|&v| lower + (upper - lower) * sigmoid(v))
    .collect()
}

/// Redistribute the budget residual across assets with slack until the
/// weights sum to one, keeping every weight inside its bounds.
fn project_budget(w: &mut [f64], lower: f64, upper: f64) -> bool {
  for _ in 0..64 {
    for v in w.iter_mut() {
      *v = v.clamp(lower, upper);
    }
    let residual = 1.0 - w.iter().sum::<f64>();
    if residual.abs() <= BUDGET_TOL {
      return true;
    }
    let free: Vec<usize> = w
      .iter()
      .enumerate()
      .filter(|(_, &v)| if residual > 0.0 { v < upper } else { v > lower })
      .map(|(i, _)| i)
      .collect();
    if free.is_empty() {
      return false;
    }
    let step = residual / free.len() as f64;
    for i in free {
      w[i] += step;
    }
  }
  false
}

struct MeanVarianceCost {
  mu: DVector<f64>,
  cov: DMatrix<f64>,
  risk_aversion: f64,
  lower: f64,
  upper: f64,
}

impl CostFunction for MeanVarianceCost {
  type Param = Vec<f64>;
  type Output = f64;

  fn cost(&self, x: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
    let w = DVector::from_vec(bounded_weights(x, self.lower, self.upper));
    let utility = w.dot(&self.mu) - 0.5 * self.risk_aversion * (&self.cov * &w).dot(&w);
    let budget = (w.sum() - 1.0).powi(2);
    Ok(-utility + BUDGET_PENALTY * budget)
  }
}

/// Solve for target weights maximizing mean-variance utility over the
/// posterior returns, starting from the equal-weight vector.
pub fn optimize_weights(
  mu: &DVector<f64>,
  cov: &DMatrix<f64>,
  risk_aversion: f64,
  lower: f64,
  upper: f64,
) -> Result<Vec<f64>> {
  let n = mu.len();
  if n == 0 {
    return Err(AllocationError::Optimization("empty return vector".into()));
  }
  if cov.nrows() != n || cov.ncols() != n {
    return Err(AllocationError::Optimization(format!(
      "covariance is {}x{} for {n} assets",
      cov.nrows(),
      cov.ncols()
    )));
  }

  // Equal weight sits strictly inside the box whenever the bounds are
  // feasible, so the logit is well defined.
  let eq = ((1.0 / n as f64) - lower) / (upper - lower);
  let x0 = vec![logit(eq.clamp(1e-6, 1.0 - 1e-6)); n];

  let mut simplex = Vec::with_capacity(n + 1);
  simplex.push(x0.clone());
  for i in 0..n {
    let mut point = x0.clone();
    point[i] += 0.5;
    simplex.push(point);
  }

  let cost = MeanVarianceCost {
    mu: mu.clone(),
    cov: cov.clone(),
    risk_aversion,
    lower,
    upper,
  };

  let solver = NelderMead::new(simplex)
    .with_sd_tolerance(1e-10)
    .map_err(|e| AllocationError::Optimization(e.to_string()))?;

  let res = Executor::new(cost, solver)
    .configure(|state| state.max_iters(MAX_ITERS))
    .run()
    .map_err(|e| AllocationError::Optimization(e.to_string()))?;

  let best_x = res
    .state
    .best_param
    .ok_or_else(|| AllocationError::Optimization("solver produced no candidate".into()))?;
  if !res.state.best_cost.is_finite() {
    return Err(AllocationError::Optimization(
      "solver converged to a non-finite cost".into(),
    ));
  }

  let mut w = bounded_weights(&best_x, lower, upper);
  if !project_budget(&mut w, lower, upper) {
    return Err(AllocationError::Optimization(
      "candidate could not be projected onto the budget constraint".into(),
    ));
  }
  Ok(w)
}

#[cfg(test)]
mod tests {
  use approx::assert_abs_diff_eq;

  use super::*;

  fn assert_feasible(w: &[f64], lower: f64, upper: f64) {
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-6);
    for &v in w {
      assert!(v >= lower - 1e-9 && v <= upper + 1e-9, "weight {v} out of bounds");
    }
  }

  #[test]
  fn weights_are_feasible() {
    let mu = DVector::from_vec(vec![0.08, 0.10, 0.12]);
    let cov = DMatrix::from_row_slice(3, 3, &[
      0.04, 0.01, 0.00, //
      0.01, 0.09, 0.02, //
      0.00, 0.02, 0.16,
    ]);
    let w = optimize_weights(&mu, &cov, 3.0, 0.05, 0.35).unwrap();
    assert_feasible(&w, 0.05, 0.35);
  }

  #[test]
  fn favors_higher_return_when_risk_is_equal() {
    let mu = DVector::from_vec(vec![0.02, 0.12, 0.02, 0.02]);
    let cov = DMatrix::identity(4, 4) * 0.04;
    let w = optimize_weights(&mu, &cov, 3.0, 0.05, 0.35).unwrap();
    assert_feasible(&w, 0.05, 0.35);
    for i in [0usize, 2, 3] {
      assert!(w[1] > w[i], "expected asset 1 overweighted, got {w:?}");
    }
  }

  #[test]
  fn flat_utility_stays_near_equal_weight() {
    let mu = DVector::zeros(3);
    let cov = DMatrix::zeros(3, 3);
    let w = optimize_weights(&mu, &cov, 3.0, 0.05, 0.35).unwrap();
    assert_feasible(&w, 0.05, 0.35);
    for &v in &w {
      assert_abs_diff_eq!(v, 1.0 / 3.0, epsilon = 0.05);
    }
  }

  #[test]
  fn budget_projection_respects_bounds() {
    let mut w = vec![0.35, 0.35, 0.05];
    assert!(project_budget(&mut w, 0.05, 0.35));
    assert_abs_diff_eq!(w.iter().sum::<f64>(), 1.0, epsilon = 1e-9);
    for &v in &w {
      assert!((0.05..=0.35).contains(&v));
    }
  }

  #[test]
  fn infeasible_projection_fails() {
    // Two assets capped at 0.35 cannot reach a unit budget.
    let mut w = vec![0.2, 0.2];
    assert!(!project_budget(&mut w, 0.05, 0.35));
  }
}
