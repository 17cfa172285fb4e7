//! # Posterior Blender (Black-Litterman)
//!
//! $$
//! \mu_{BL} = \left(P^\top \Omega^{-1} P + \tau\Sigma\right)^{-1}
//!            \left(P^\top \Omega^{-1} Q + \tau\Sigma\,\Pi\right)
//! $$
//!
//! Fuses equilibrium returns with investor views, weighted by their
//! relative uncertainties. This is the simplified additive-prior variant:
//! the prior enters as `tau * cov` in both factors rather than through its
//! inverse, which keeps the two forms from being mixed. As omega grows the
//! posterior collapses to the prior; as tau shrinks it approaches the
//! view-weighted least-squares solution.

use nalgebra::DMatrix;
use nalgebra::DVector;

use crate::equilibrium::ViewSet;
use crate::error::AllocationError;
use crate::error::Result;

/// Blend equilibrium returns `pi` with `views` into posterior expected
/// returns. `views` must already be padded to universe width.
///
/// With no views the posterior is exactly the prior. Fails with a
/// `Numerical` error naming the matrix whose inverse does not exist.
pub fn posterior_returns(
  pi: &DVector<f64>,
  cov: &DMatrix<f64>,
  views: &ViewSet,
  tau: f64,
) -> Result<DVector<f64>> {
  if views.is_empty() {
    return Ok(pi.clone());
  }

  let omega_inv = views
    .omega()
    .clone()
    .try_inverse()
    .ok_or_else(|| AllocationError::Numerical("view uncertainty omega is singular".into()))?;

  let p = views.p();
  let tau_cov = cov * tau;

  let precision = p.transpose() * &omega_inv * p + &tau_cov;
  let m = precision.try_inverse().ok_or_else(|| {
    AllocationError::Numerical("blended precision matrix (P'O^-1P + tau*cov) is singular".into())
  })?;

  let rhs = p.transpose() * &omega_inv * views.q() + &tau_cov * pi;
  let mu = m * rhs;

  if mu.iter().any(|v| !v.is_finite()) {
    return Err(AllocationError::Numerical(
      "non-finite posterior expected return".into(),
    ));
  }
  Ok(mu)
}
