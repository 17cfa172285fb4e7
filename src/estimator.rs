//! # Return/Covariance Estimator
//!
//! $$
//! r_{i,t} = \frac{p_{i,t}}{p_{i,t-1}} - 1, \qquad
//! \Sigma_{ij} = \frac{1}{T-1}\sum_t (r_{i,t}-\bar r_i)(r_{j,t}-\bar r_j)
//! $$
//!
//! Converts a price matrix into simple period returns and a sample
//! covariance matrix. Every value entering the downstream linear algebra
//! is checked finite here.

use nalgebra::DMatrix;
use nalgebra::DVector;
use ndarray::Array2;

use crate::error::AllocationError;
use crate::error::Result;

/// Simple period-over-period returns, assets x (T-1).
///
/// Fails if any price is non-positive or any resulting return is
/// non-finite, since either would poison the covariance estimate.
pub fn simple_returns(prices: &Array2<f64>) -> Result<Array2<f64>> {
  let n = prices.nrows();
  let t = prices.ncols();
  if t < 2 {
    return Err(AllocationError::InsufficientData { needed: 2, got: t });
  }

  let mut out = Array2::zeros((n, t - 1));
  for i in 0..n {
    for j in 1..t {
      let prev = prices[[i, j - 1]];
      let cur = prices[[i, j]];
      if prev <= 0.0 || cur <= 0.0 {
        return Err(AllocationError::Numerical(format!(
          "non-positive price for asset {i} at period {j}"
        )));
      }
      let r = cur / prev - 1.0;
      if !r.is_finite() {
        return Err(AllocationError::Numerical(format!(
          "non-finite return for asset {i} at period {j}"
        )));
      }
      out[[i, j - 1]] = r;
    }
  }
  Ok(out)
}

/// Sample covariance of returns across time, asset x asset.
pub fn sample_covariance(returns: &Array2<f64>) -> Result<DMatrix<f64>> {
  let n = returns.nrows();
  let obs = returns.ncols();
  if obs < 2 {
    return Err(AllocationError::InsufficientData { needed: 2, got: obs });
  }

  let means = mean_returns(returns);
  let mut cov = DMatrix::zeros(n, n);
  for i in 0..n {
    for j in i..n {
      let mut acc = 0.0;
      for t in 0..obs {
        acc += (returns[[i, t]] - means[i]) * (returns[[j, t]] - means[j]);
      }
      let c = acc / (obs - 1) as f64;
      cov[(i, j)] = c;
      cov[(j, i)] = c;
    }
  }

  if cov.iter().any(|v| !v.is_finite()) {
    return Err(AllocationError::Numerical(
      "non-finite entry in covariance matrix".into(),
    ));
  }
  Ok(cov)
}

/// Per-asset mean of period returns.
pub fn mean_returns(returns: &Array2<f64>) -> DVector<f64> {
  let n = returns.nrows();
  let obs = returns.ncols().max(1);
  DVector::from_fn(n, |i, _| {
    returns.row(i).iter().sum::<f64>() / obs as f64
  })
}
