//! # Dimensionality Reducer
//!
//! $$
//! F = X_c V_m, \qquad \frac{\sum_{k \le m} \lambda_k}{\sum_k \lambda_k} \ge \theta
//! $$
//!
//! Projects a time-major return matrix onto the minimal principal-component
//! basis retaining a configured variance fraction. The component count is
//! chosen per cycle from the spectrum, never fixed, so the forecaster trains
//! on fewer, decorrelated inputs.

use nalgebra::DMatrix;
use nalgebra::SymmetricEigen;
use ndarray::Array2;

use crate::error::AllocationError;
use crate::error::Result;

/// Output of a principal-component projection.
#[derive(Clone, Debug)]
pub struct ReducedFactors {
  /// Factor matrix, time-major, T x m with m <= asset count.
  pub factors: Array2<f64>,
  /// Fraction of total variance retained by the kept components.
  pub explained: f64,
}

/// Project `returns` (time-major, T x N) onto the smallest orthogonal basis
/// retaining at least `variance_retained` of total variance.
pub fn reduce(returns: &Array2<f64>, variance_retained: f64) -> Result<ReducedFactors> {
  let t = returns.nrows();
  let n = returns.ncols();
  if t < 2 {
    return Err(AllocationError::InsufficientData { needed: 2, got: t });
  }

  let mut centered = DMatrix::zeros(t, n);
  for j in 0..n {
    let mean = returns.column(j).iter().sum::<f64>() / t as f64;
    for i in 0..t {
      centered[(i, j)] = returns[[i, j]] - mean;
    }
  }

  let cov = &centered.transpose() * &centered / (t - 1) as f64;
  let eig = SymmetricEigen::new(cov);

  let mut order: Vec<usize> = (0..n).collect();
  order.sort_by(|&a, &b| {
    eig.eigenvalues[b]
      .partial_cmp(&eig.eigenvalues[a])
      .unwrap_or(std::cmp::Ordering::Equal)
  });

  let total: f64 = eig.eigenvalues.iter().map(|v| v.max(0.0)).sum();
  if total <= f64::EPSILON {
    // Degenerate spectrum (e.g. constant returns): a single zero factor
    // keeps the downstream shapes valid.
    return Ok(ReducedFactors {
      factors: Array2::zeros((t, 1)),
      explained: 1.0,
    });
  }

  let mut kept = 0;
  let mut cum = 0.0;
  for &idx in &order {
    kept += 1;
    cum += eig.eigenvalues[idx].max(0.0);
    if cum / total >= variance_retained {
      break;
    }
  }

  let mut basis = DMatrix::zeros(n, kept);
  for (k, &idx) in order.iter().take(kept).enumerate() {
    basis.set_column(k, &eig.eigenvectors.column(idx));
  }

  let projected = &centered * &basis;
  if projected.iter().any(|v| !v.is_finite()) {
    return Err(AllocationError::Numerical(
      "non-finite entry in factor projection".into(),
    ));
  }

  let mut factors = Array2::zeros((t, kept));
  for i in 0..t {
    for k in 0..kept {
      factors[[i, k]] = projected[(i, k)];
    }
  }

  Ok(ReducedFactors {
    factors,
    explained: cum / total,
  })
}

#[cfg(test)]
mod tests {
  use ndarray::Array2;
  use rand::Rng;
  use rand::SeedableRng;
  use rand::rngs::StdRng;

  use super::*;

  fn correlated_returns(t: usize) -> Array2<f64> {
    // Two near-duplicate series plus one independent: two components
    // should carry essentially all the variance.
    let mut rng = StdRng::seed_from_u64(7);
    let mut out = Array2::zeros((t, 3));
    for i in 0..t {
      let common: f64 = rng.gen::<f64>() - 0.5;
      let noise: f64 = (rng.gen::<f64>() - 0.5) * 1e-3;
      out[[i, 0]] = common;
      out[[i, 1]] = common + noise;
      out[[i, 2]] = rng.gen::<f64>() - 0.5;
    }
    out
  }

  #[test]
  fn retains_requested_variance_with_fewer_components() {
    let returns = correlated_returns(200);
    let reduced = reduce(&returns, 0.95).unwrap();
    assert!(reduced.factors.ncols() < 3);
    assert!(reduced.explained >= 0.95);
  }

  #[test]
  fn full_retention_keeps_all_components() {
    let returns = correlated_returns(50);
    let reduced = reduce(&returns, 1.0).unwrap();
    assert_eq!(reduced.factors.ncols(), 3);
  }

  #[test]
  fn degenerate_spectrum_yields_single_zero_factor() {
    let returns = Array2::from_elem((20, 3), 0.01);
    let reduced = reduce(&returns, 0.95).unwrap();
    assert_eq!(reduced.factors.ncols(), 1);
    assert!(reduced.factors.iter().all(|v| *v == 0.0));
  }

  #[test]
  fn factor_count_never_exceeds_assets() {
    let returns = correlated_returns(30);
    let reduced = reduce(&returns, 0.999_999).unwrap();
    assert!(reduced.factors.ncols() <= 3);
  }
}
