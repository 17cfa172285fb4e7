//! # Equilibrium & View Engine
//!
//! $$
//! \Pi = \lambda \Sigma w_{\text{ref}}
//! $$
//!
//! Implied equilibrium returns from a reference weighting, and the investor
//! view set (P, Q, Omega) blended downstream. Views reference a leading
//! subset of assets by default; P is zero-padded on the right to full
//! universe width.

use nalgebra::DMatrix;
use nalgebra::DVector;

use crate::error::AllocationError;
use crate::error::Result;

/// Equilibrium returns implied by a reference weight vector and risk
/// aversion: `pi = risk_aversion * cov * w_ref`. Pure function, no state.
pub fn implied_returns(
  cov: &DMatrix<f64>,
  w_ref: &DVector<f64>,
  risk_aversion: f64,
) -> DVector<f64> {
  cov * w_ref * risk_aversion
}

/// Investor views: K linear combinations of asset returns (rows of `p`),
/// their expected values `q`, and a diagonal uncertainty matrix `omega`.
#[derive(Clone, Debug)]
pub struct ViewSet {
  p: DMatrix<f64>,
  q: DVector<f64>,
  omega: DMatrix<f64>,
}

impl ViewSet {
  /// A view set with no views; the posterior then equals the prior.
  pub fn empty() -> Self {
    Self {
      p: DMatrix::zeros(0, 0),
      q: DVector::zeros(0),
      omega: DMatrix::zeros(0, 0),
    }
  }

  /// Validate internal consistency: `p` is K x J, `q` has K entries and
  /// `omega` is K x K diagonal with strictly positive diagonal (so its
  /// inverse exists).
  pub fn new(p: DMatrix<f64>, q: DVector<f64>, omega: DMatrix<f64>) -> Result<Self> {
    let k = p.nrows();
    if q.len() != k {
      return Err(AllocationError::Configuration(format!(
        "view vector q has {} entries for {k} views",
        q.len()
      )));
    }
    if omega.nrows() != k || omega.ncols() != k {
      return Err(AllocationError::Configuration(format!(
        "view uncertainty omega is {}x{}, expected {k}x{k}",
        omega.nrows(),
        omega.ncols()
      )));
    }
    for i in 0..k {
      for j in 0..k {
        if i == j {
          if omega[(i, i)] <= 0.0 || !omega[(i, i)].is_finite() {
            return Err(AllocationError::Configuration(format!(
              "omega diagonal entry {i} must be positive and finite"
            )));
          }
        } else if omega[(i, j)] != 0.0 {
          return Err(AllocationError::Configuration(
            "omega must be diagonal".into(),
          ));
        }
      }
    }
    Ok(Self { p, q, omega })
  }

  /// Number of views K.
  pub fn len(&self) -> usize {
    self.p.nrows()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// View matrix P after right zero-padding to `n_assets` columns.
  ///
  /// Rejects a view set that is wider than the universe or carries more
  /// views than assets.
  pub fn padded(&self, n_assets: usize) -> Result<ViewSet> {
    let k = self.len();
    if k > n_assets {
      return Err(AllocationError::Configuration(format!(
        "{k} views exceed {n_assets} assets"
      )));
    }
    if self.p.ncols() > n_assets {
      return Err(AllocationError::Configuration(format!(
        "view matrix has {} columns for {n_assets} assets",
        self.p.ncols()
      )));
    }
    let mut p = DMatrix::zeros(k, n_assets);
    for i in 0..k {
      for j in 0..self.p.ncols() {
        p[(i, j)] = self.p[(i, j)];
      }
    }
    Ok(ViewSet {
      p,
      q: self.q.clone(),
      omega: self.omega.clone(),
    })
  }

  pub fn p(&self) -> &DMatrix<f64> {
    &self.p
  }

  pub fn q(&self) -> &DVector<f64> {
    &self.q
  }

  pub fn omega(&self) -> &DMatrix<f64> {
    &self.omega
  }
}

#[cfg(test)]
mod tests {
  use approx::assert_relative_eq;

  use super::*;

  fn sample_cov() -> DMatrix<f64> {
    DMatrix::from_row_slice(3, 3, &[
      0.04, 0.01, 0.00, //
      0.01, 0.09, 0.02, //
      0.00, 0.02, 0.16,
    ])
  }

  #[test]
  fn implied_returns_are_linear_in_risk_aversion() {
    let cov = sample_cov();
    let w = DVector::from_vec(vec![0.4, 0.3, 0.3]);
    let pi1 = implied_returns(&cov, &w, 2.0);
    let pi2 = implied_returns(&cov, &w, 4.0);
    for i in 0..3 {
      assert_relative_eq!(pi2[i], 2.0 * pi1[i], epsilon = 1e-12);
    }
  }

  #[test]
  fn padding_extends_view_matrix_to_universe_width() {
    let views = ViewSet::new(
      DMatrix::from_row_slice(1, 2, &[1.0, -1.0]),
      DVector::from_vec(vec![0.02]),
      DMatrix::from_diagonal(&DVector::from_vec(vec![0.01])),
    )
    .unwrap();
    let padded = views.padded(4).unwrap();
    assert_eq!(padded.p().ncols(), 4);
    assert_eq!(padded.p()[(0, 2)], 0.0);
    assert_eq!(padded.p()[(0, 3)], 0.0);
  }

  #[test]
  fn rejects_more_views_than_assets() {
    let views = ViewSet::new(
      DMatrix::from_row_slice(3, 2, &[1.0, 0.0, 0.0, 1.0, 1.0, -1.0]),
      DVector::from_vec(vec![0.01, 0.02, 0.0]),
      DMatrix::from_diagonal(&DVector::from_vec(vec![0.1, 0.1, 0.1])),
    )
    .unwrap();
    assert!(views.padded(2).is_err());
  }

  #[test]
  fn rejects_non_diagonal_or_non_positive_omega() {
    let p = DMatrix::from_row_slice(2, 2, &[1.0, 0.0, 0.0, 1.0]);
    let q = DVector::from_vec(vec![0.01, 0.02]);

    let off_diag = DMatrix::from_row_slice(2, 2, &[0.1, 0.05, 0.05, 0.1]);
    assert!(ViewSet::new(p.clone(), q.clone(), off_diag).is_err());

    let zero_diag = DMatrix::from_diagonal(&DVector::from_vec(vec![0.1, 0.0]));
    assert!(ViewSet::new(p, q, zero_diag).is_err());
  }
}
