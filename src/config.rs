//! Runtime configuration for the allocation engine.
//!
//! Everything carries a default; `validate` runs once at engine
//! construction and rejects any configuration the pipeline could not
//! execute safely, so later cycles never re-check these invariants.

use chrono::Duration;

use crate::equilibrium::ViewSet;
use crate::error::AllocationError;
use crate::error::Result;
use crate::forecast::ForecastConfig;
use crate::universe::Universe;

/// Configuration for [`crate::engine::AllocationEngine`].
#[derive(Clone, Debug)]
pub struct AllocatorConfig {
  /// Rolling history length, in trading periods.
  pub lookback: usize,
  /// Elapsed time between rebalances.
  pub rebalance_cadence: Duration,
  /// Prior uncertainty scaling for the posterior blend.
  pub tau: f64,
  /// Mean-variance risk aversion.
  pub risk_aversion: f64,
  /// Drawdown at or above which the gate turns defensive.
  pub max_drawdown_limit: f64,
  /// Forecast VaR (loss fraction) at or above which the gate turns defensive.
  pub var_limit: f64,
  /// Confidence level of the VaR quantile.
  pub var_confidence: f64,
  /// Per-asset (lower, upper) weight bounds.
  pub weight_bounds: (f64, f64),
  /// Variance fraction the factor projection must retain.
  pub variance_retained: f64,
  /// Symbol receiving the full allocation while defensive.
  pub defensive_asset: String,
  /// Reference weights for the equilibrium prior; equal weight when unset.
  pub reference_weights: Option<Vec<f64>>,
  /// Investor views blended into the posterior.
  pub views: ViewSet,
  /// Forecaster hyperparameters.
  pub forecast: ForecastConfig,
}

impl Default for AllocatorConfig {
  fn default() -> Self {
    Self {
      lookback: 504,
      rebalance_cadence: Duration::days(90),
      tau: 0.025,
      risk_aversion: 3.0,
      max_drawdown_limit: 0.15,
      var_limit: 0.02,
      var_confidence: 0.99,
      weight_bounds: (0.05, 0.35),
      variance_retained: 0.95,
      defensive_asset: String::new(),
      reference_weights: None,
      views: ViewSet::empty(),
      forecast: ForecastConfig::default(),
    }
  }
}

impl AllocatorConfig {
  /// Validate against a universe. Any failure here is fatal: the engine
  /// refuses to start.
  pub fn validate(&self, universe: &Universe) -> Result<()> {
    let n = universe.len();
    let (lower, upper) = self.weight_bounds;

    if self.lookback < 2 {
      return Err(AllocationError::Configuration(
        "lookback must be at least 2 periods".into(),
      ));
    }
    if self.rebalance_cadence <= Duration::zero() {
      return Err(AllocationError::Configuration(
        "rebalance cadence must be positive".into(),
      ));
    }
    if self.tau <= 0.0 {
      return Err(AllocationError::Configuration("tau must be positive".into()));
    }
    if self.risk_aversion <= 0.0 {
      return Err(AllocationError::Configuration(
        "risk aversion must be positive".into(),
      ));
    }
    if !(0.0..1.0).contains(&self.max_drawdown_limit) {
      return Err(AllocationError::Configuration(
        "max drawdown limit must be in [0, 1)".into(),
      ));
    }
    if self.var_limit <= 0.0 {
      return Err(AllocationError::Configuration(
        "VaR limit must be positive".into(),
      ));
    }
    if !(0.5..1.0).contains(&self.var_confidence) {
      return Err(AllocationError::Configuration(
        "VaR confidence must be in (0.5, 1)".into(),
      ));
    }
    if !(lower >= 0.0 && lower < upper && upper <= 1.0) {
      return Err(AllocationError::Configuration(format!(
        "weight bounds ({lower}, {upper}) are not ordered within [0, 1]"
      )));
    }
    if lower * n as f64 > 1.0 {
      return Err(AllocationError::Configuration(format!(
        "lower bound {lower} is infeasible for {n} assets"
      )));
    }
    if upper * (n as f64) < 1.0 {
      return Err(AllocationError::Configuration(format!(
        "upper bound {upper} is infeasible for {n} assets"
      )));
    }
    if !(0.0 < self.variance_retained && self.variance_retained <= 1.0) {
      return Err(AllocationError::Configuration(
        "variance retained must be in (0, 1]".into(),
      ));
    }
    if universe.index_of(&self.defensive_asset).is_none() {
      return Err(AllocationError::Configuration(format!(
        "defensive asset '{}' is not in the universe",
        self.defensive_asset
      )));
    }
    if let Some(w_ref) = &self.reference_weights {
      if w_ref.len() != n {
        return Err(AllocationError::Configuration(format!(
          "reference weights have {} entries for {n} assets",
          w_ref.len()
        )));
      }
      if w_ref.iter().any(|v| !v.is_finite() || *v < 0.0) {
        return Err(AllocationError::Configuration(
          "reference weights must be finite and non-negative".into(),
        ));
      }
      if w_ref.iter().sum::<f64>() <= 0.0 {
        return Err(AllocationError::Configuration(
          "reference weights must not sum to zero".into(),
        ));
      }
    }
    // Surfaces view/universe dimension mismatches now rather than mid-cycle.
    self.views.padded(n)?;

    if self.forecast.window == 0 || self.forecast.n_folds < 2 {
      return Err(AllocationError::Configuration(
        "forecast window must be positive and fold count at least 2".into(),
      ));
    }
    if self.forecast.epochs == 0 {
      return Err(AllocationError::Configuration(
        "forecast epoch cap must be positive".into(),
      ));
    }
    if !(0.0..1.0).contains(&self.forecast.dropout) {
      return Err(AllocationError::Configuration(
        "dropout must be in [0, 1)".into(),
      ));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use nalgebra::DMatrix;
  use nalgebra::DVector;

  use super::*;

  fn universe() -> Universe {
    Universe::new(vec!["SPY", "TLT", "GLD", "SHY"]).unwrap()
  }

  fn valid() -> AllocatorConfig {
    AllocatorConfig {
      defensive_asset: "SHY".into(),
      ..AllocatorConfig::default()
    }
  }

  #[test]
  fn default_with_defensive_asset_is_valid() {
    assert!(valid().validate(&universe()).is_ok());
  }

  #[test]
  fn rejects_infeasible_bounds() {
    let mut cfg = valid();
    cfg.weight_bounds = (0.30, 0.95);
    // 0.30 * 4 > 1: the budget cannot be met.
    assert!(cfg.validate(&universe()).is_err());

    cfg.weight_bounds = (0.0, 0.2);
    // 0.2 * 4 < 1: the budget cannot be reached.
    assert!(cfg.validate(&universe()).is_err());
  }

  #[test]
  fn rejects_unknown_defensive_asset() {
    let mut cfg = valid();
    cfg.defensive_asset = "BTC".into();
    assert!(cfg.validate(&universe()).is_err());
  }

  #[test]
  fn rejects_oversized_view_set() {
    let mut cfg = valid();
    cfg.views = ViewSet::new(
      DMatrix::from_row_slice(1, 5, &[1.0, 0.0, 0.0, 0.0, -1.0]),
      DVector::from_vec(vec![0.01]),
      DMatrix::from_diagonal(&DVector::from_vec(vec![0.1])),
    )
    .unwrap();
    assert!(cfg.validate(&universe()).is_err());
  }

  #[test]
  fn rejects_bad_reference_weights() {
    let mut cfg = valid();
    cfg.reference_weights = Some(vec![0.5, 0.5]);
    assert!(cfg.validate(&universe()).is_err());

    cfg.reference_weights = Some(vec![0.0, 0.0, 0.0, 0.0]);
    assert!(cfg.validate(&universe()).is_err());
  }
}
