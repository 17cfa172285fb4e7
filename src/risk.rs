//! # Risk Gate
//!
//! $$
//! \text{DD} = \frac{\max_t V_t - V_{now}}{\max_t V_t}, \qquad
//! \text{VaR}_\alpha = -\left(\bar r + z_{1-\alpha}\,s\right)
//! $$
//!
//! Drawdown and forecast-based Value-at-Risk circuit breakers. The gate has
//! two states, NORMAL and DEFENSIVE, and is re-derived fresh every cycle
//! from current inputs: there is no hysteresis and no cooldown, so the gate
//! can flap between states on consecutive cycles. While DEFENSIVE the
//! allocation is overridden to 100% in the designated defensive asset.

use statrs::distribution::ContinuousCDF;
use statrs::distribution::Normal;
use tracing::info;
use tracing::warn;

use crate::error::AllocationError;
use crate::error::Result;

/// Gate state for the current cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
  Normal,
  Defensive,
}

/// Stateful drawdown/VaR circuit breaker.
#[derive(Clone, Debug)]
pub struct RiskGate {
  max_drawdown: f64,
  var_limit: f64,
  var_confidence: f64,
  state: GateState,
}

impl RiskGate {
  pub fn new(max_drawdown: f64, var_limit: f64, var_confidence: f64) -> Self {
    Self {
      max_drawdown,
      var_limit,
      var_confidence,
      state: GateState::Normal,
    }
  }

  /// Current state, as decided by the last `evaluate` call.
  pub fn state(&self) -> GateState {
    self.state
  }

  /// Peak-to-current drawdown of the portfolio-value history. Empty
  /// history or a non-positive peak reads as no drawdown.
  pub fn drawdown(values: &[f64]) -> f64 {
    let peak = values.iter().copied().fold(f64::MIN, f64::max);
    let current = match values.last() {
      Some(v) => *v,
      None => return 0.0,
    };
    if peak <= 0.0 {
      return 0.0;
    }
    ((peak - current) / peak).max(0.0)
  }

  /// Gaussian parametric VaR of the predicted-return cross-section at the
  /// configured confidence level.
  ///
  /// Predictions are return fractions, so the result is already a loss
  /// fraction of current portfolio value (the value cancels out of the
  /// normalization). Returns a non-negative number; 0 means no predicted
  /// loss at this confidence.
  pub fn forecast_var(&self, predicted: &[f64]) -> Result<f64> {
    if predicted.is_empty() {
      return Ok(0.0);
    }
    let n = predicted.len() as f64;
    let mean = predicted.iter().sum::<f64>() / n;
    let std = if predicted.len() < 2 {
      0.0
    } else {
      let ss = predicted.iter().map(|r| (r - mean).powi(2)).sum::<f64>();
      (ss / (n - 1.0)).sqrt()
    };

    let normal = Normal::new(0.0, 1.0)
      .map_err(|e| AllocationError::Numerical(format!("standard normal: {e}")))?;
    let z = normal.inverse_cdf(1.0 - self.var_confidence);
    Ok((-(mean + z * std)).max(0.0))
  }

  /// Re-derive the gate state for this cycle from the portfolio-value
  /// history and the forecaster's predicted returns.
  pub fn evaluate(&mut self, values: &[f64], predicted: &[f64]) -> Result<GateState> {
    let drawdown = Self::drawdown(values);
    let var = self.forecast_var(predicted)?;
    let breached = drawdown >= self.max_drawdown || var >= self.var_limit;

    let next = if breached {
      GateState::Defensive
    } else {
      GateState::Normal
    };
    if next != self.state {
      match next {
        GateState::Defensive => warn!(
          drawdown,
          var, "risk limits breached, overriding to defensive allocation"
        ),
        GateState::Normal => info!(drawdown, var, "risk limits cleared, resuming optimizer output"),
      }
    }
    self.state = next;
    Ok(next)
  }
}

/// The defensive override: full allocation to one asset.
pub fn defensive_weights(n_assets: usize, defensive_index: usize) -> Vec<f64> {
  let mut w = vec![0.0; n_assets];
  w[defensive_index] = 1.0;
  w
}
