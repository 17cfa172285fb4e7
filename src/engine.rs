//! # Allocation Engine
//!
//! Per-cycle orchestration of the pipeline:
//!
//! history -> returns/covariance -> factor projection -> forecaster ->
//! equilibrium -> posterior blend -> constrained optimizer -> risk gate
//!
//! The engine owns the rolling history and the committed weight vector;
//! every per-cycle intermediate (returns, covariance, equilibrium and
//! posterior returns) is a transient value threaded through the stages and
//! dropped when the cycle ends. Cycles run synchronously to completion on
//! a single timeline; a cycle already in flight rejects nested triggers.
//!
//! Recoverable failures skip the cycle and retain the prior allocation:
//! insufficient history, a singular matrix, a model failure, or a solver
//! that cannot reach a feasible allocation all leave the committed weights
//! untouched and log the reason.

use chrono::DateTime;
use chrono::Utc;
use nalgebra::DVector;
use tracing::debug;
use tracing::info;
use tracing::warn;

use crate::blend::posterior_returns;
use crate::config::AllocatorConfig;
use crate::equilibrium::ViewSet;
use crate::equilibrium::implied_returns;
use crate::error::AllocationError;
use crate::error::Result;
use crate::estimator::sample_covariance;
use crate::estimator::simple_returns;
use crate::factors::reduce;
use crate::forecast::ReturnForecaster;
use crate::forecast::WindowForecaster;
use crate::history::HistoryStore;
use crate::optimizer::optimize_weights;
use crate::risk::GateState;
use crate::risk::RiskGate;
use crate::risk::defensive_weights;
use crate::universe::Universe;

/// What a tick produced.
#[derive(Clone, Debug)]
pub enum CycleOutcome {
  /// A rebalance committed a new target allocation.
  Rebalanced(Vec<(String, f64)>),
  /// The cycle was due but skipped; the prior allocation stands.
  Skipped { reason: String },
  /// The cadence has not elapsed yet.
  NotDue,
}

/// The allocation engine.
pub struct AllocationEngine {
  config: AllocatorConfig,
  universe: Universe,
  history: HistoryStore,
  forecaster: Box<dyn ReturnForecaster>,
  gate: RiskGate,
  padded_views: ViewSet,
  defensive_index: usize,
  weights: Vec<f64>,
  last_rebalance: Option<DateTime<Utc>>,
  in_cycle: bool,
}

impl AllocationEngine {
  /// Build an engine with the default forecaster. Configuration problems
  /// are fatal here; nothing is re-validated per cycle.
  pub fn new(universe: Universe, config: AllocatorConfig) -> Result<Self> {
    let forecaster = Box::new(WindowForecaster::new(universe.len(), config.forecast.clone()));
    Self::with_forecaster(universe, config, forecaster)
  }

  /// Build an engine with a caller-supplied forecasting technique.
  pub fn with_forecaster(
    universe: Universe,
    config: AllocatorConfig,
    forecaster: Box<dyn ReturnForecaster>,
  ) -> Result<Self> {
    config.validate(&universe)?;
    let n = universe.len();
    let defensive_index = universe.index_of(&config.defensive_asset).ok_or_else(|| {
      AllocationError::Configuration(format!(
        "defensive asset '{}' is not in the universe",
        config.defensive_asset
      ))
    })?;
    let padded_views = config.views.padded(n)?;
    let gate = RiskGate::new(
      config.max_drawdown_limit,
      config.var_limit,
      config.var_confidence,
    );
    let history = HistoryStore::new(n, config.lookback);

    Ok(Self {
      universe,
      history,
      forecaster,
      gate,
      padded_views,
      defensive_index,
      weights: vec![1.0 / n as f64; n],
      last_rebalance: None,
      in_cycle: false,
      config,
    })
  }

  /// Ingest one tick: closing prices in universe order, the current total
  /// portfolio value, and the tick timestamp. Runs a rebalance cycle when
  /// the cadence has elapsed.
  pub fn observe(
    &mut self,
    prices: &[f64],
    portfolio_value: f64,
    timestamp: DateTime<Utc>,
  ) -> Result<CycleOutcome> {
    if prices.len() != self.universe.len() {
      return Err(AllocationError::Configuration(format!(
        "tick has {} prices for {} assets",
        prices.len(),
        self.universe.len()
      )));
    }
    for (i, &p) in prices.iter().enumerate() {
      self.history.record(i, p);
    }
    self.history.record_portfolio_value(portfolio_value);

    if !self.due(timestamp) {
      return Ok(CycleOutcome::NotDue);
    }
    self.rebalance(timestamp)
  }

  /// Run one rebalance cycle now, independent of the cadence.
  pub fn rebalance(&mut self, timestamp: DateTime<Utc>) -> Result<CycleOutcome> {
    if self.in_cycle {
      warn!("rejecting rebalance trigger: a cycle is already in flight");
      return Ok(CycleOutcome::Skipped {
        reason: "a rebalance cycle is already in flight".into(),
      });
    }
    self.in_cycle = true;
    let result = self.run_cycle();
    self.in_cycle = false;

    match result {
      Ok(weights) => {
        self.weights = weights;
        self.last_rebalance = Some(timestamp);
        info!(?timestamp, "rebalance committed");
        Ok(CycleOutcome::Rebalanced(self.current_weights()))
      }
      Err(AllocationError::Configuration(msg)) => {
        Err(AllocationError::Configuration(msg))
      }
      Err(AllocationError::Optimization(msg)) => {
        warn!(reason = %msg, "optimizer failed to converge, keeping previous allocation");
        Ok(CycleOutcome::Skipped { reason: msg })
      }
      Err(e) => {
        warn!(reason = %e, "skipping rebalance, allocation unchanged");
        Ok(CycleOutcome::Skipped {
          reason: e.to_string(),
        })
      }
    }
  }

  /// Committed target allocation as a symbol -> weight mapping.
  pub fn current_weights(&self) -> Vec<(String, f64)> {
    self
      .universe
      .symbols()
      .iter()
      .cloned()
      .zip(self.weights.iter().copied())
      .collect()
  }

  /// Gate state decided by the last completed cycle.
  pub fn gate_state(&self) -> GateState {
    self.gate.state()
  }

  fn due(&self, timestamp: DateTime<Utc>) -> bool {
    match self.last_rebalance {
      None => true,
      Some(prev) => timestamp - prev >= self.config.rebalance_cadence,
    }
  }

  fn reference_weights(&self) -> DVector<f64> {
    let n = self.universe.len();
    match &self.config.reference_weights {
      Some(w) => {
        let total: f64 = w.iter().sum();
        DVector::from_iterator(n, w.iter().map(|v| v / total))
      }
      None => DVector::from_element(n, 1.0 / n as f64),
    }
  }

  fn run_cycle(&mut self) -> Result<Vec<f64>> {
    if !self.history.is_full() {
      return Err(AllocationError::InsufficientData {
        needed: self.config.lookback,
        got: self.history.len(),
      });
    }

    let prices = self.history.price_matrix();
    let returns = simple_returns(&prices)?;
    let cov = sample_covariance(&returns)?;

    let returns_tm = returns.t().to_owned();
    let reduced = reduce(&returns_tm, self.config.variance_retained)?;
    debug!(
      factor_count = reduced.factors.ncols(),
      explained = reduced.explained,
      "factor projection"
    );

    let report = self.forecaster.train(&reduced.factors, &returns_tm)?;
    debug!(folds = report.folds.len(), "forecaster trained");
    let predicted = self.forecaster.predict(&reduced.factors)?;

    let w_ref = self.reference_weights();
    let pi = implied_returns(&cov, &w_ref, self.config.risk_aversion);
    let mu_bl = posterior_returns(&pi, &cov, &self.padded_views, self.config.tau)?;

    let (lower, upper) = self.config.weight_bounds;
    let optimized = optimize_weights(&mu_bl, &cov, self.config.risk_aversion, lower, upper)?;

    let values = self.history.value_history();
    let state = self.gate.evaluate(&values, &predicted)?;
    Ok(match state {
      GateState::Normal => optimized,
      GateState::Defensive => {
        defensive_weights(self.universe.len(), self.defensive_index)
      }
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::Duration;
  use chrono::TimeZone;

  use super::*;
  use crate::forecast::ForecastConfig;

  fn universe() -> Universe {
    Universe::new(vec!["SPY", "TLT", "GLD"]).unwrap()
  }

  fn test_config() -> AllocatorConfig {
    AllocatorConfig {
      lookback: 30,
      rebalance_cadence: Duration::days(90),
      defensive_asset: "GLD".into(),
      // Gating in these scenarios is driven by drawdown alone.
      var_limit: 0.5,
      forecast: ForecastConfig {
        window: 5,
        hidden_dim: 8,
        epochs: 10,
        n_folds: 5,
        ..ForecastConfig::default()
      },
      ..AllocatorConfig::default()
    }
  }

  fn ts(day: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day)
  }

  fn drive(
    engine: &mut AllocationEngine,
    days: usize,
    price_at: impl Fn(usize, usize) -> f64,
    value_at: impl Fn(usize) -> f64,
  ) -> CycleOutcome {
    let mut last = CycleOutcome::NotDue;
    for d in 0..days {
      let prices: Vec<f64> = (0..3).map(|i| price_at(i, d)).collect();
      last = engine.observe(&prices, value_at(d), ts(d as i64)).unwrap();
    }
    last
  }

  #[test]
  fn construction_rejects_bad_configuration() {
    let cfg = AllocatorConfig::default(); // no defensive asset
    assert!(matches!(
      AllocationEngine::new(universe(), cfg),
      Err(AllocationError::Configuration(_))
    ));
  }

  #[test]
  fn constant_returns_yield_feasible_near_equal_weights() {
    let mut engine = AllocationEngine::new(universe(), test_config()).unwrap();

    // Every asset compounds at 1% per period: equal expected returns and a
    // degenerate covariance, so the optimizer has no reason to tilt.
    let outcome = drive(
      &mut engine,
      30,
      |i, d| (100.0 + 10.0 * i as f64) * 1.01_f64.powi(d as i32),
      |d| 100_000.0 * 1.001_f64.powi(d as i32),
    );

    let weights = match outcome {
      CycleOutcome::Rebalanced(w) => w,
      other => panic!("expected a rebalance, got {other:?}"),
    };
    let sum: f64 = weights.iter().map(|(_, w)| w).sum();
    assert!((sum - 1.0).abs() < 1e-6);
    for (sym, w) in &weights {
      assert!(
        (0.05..=0.35 + 1e-9).contains(w),
        "{sym} weight {w} out of bounds"
      );
      assert!((w - 1.0 / 3.0).abs() < 0.12, "{sym} weight {w} far from equal");
    }
    assert_eq!(engine.gate_state(), GateState::Normal);
  }

  #[test]
  fn severe_drawdown_forces_defensive_allocation() {
    let mut engine = AllocationEngine::new(universe(), test_config()).unwrap();

    // Portfolio value peaks at 100k then prints 80k on the final tick:
    // a 20% drawdown against a 15% limit.
    let outcome = drive(
      &mut engine,
      30,
      |i, d| (100.0 + 10.0 * i as f64) * 1.01_f64.powi(d as i32),
      |d| if d == 29 { 80_000.0 } else { 100_000.0 },
    );

    let weights = match outcome {
      CycleOutcome::Rebalanced(w) => w,
      other => panic!("expected a rebalance, got {other:?}"),
    };
    assert_eq!(engine.gate_state(), GateState::Defensive);
    for (sym, w) in &weights {
      if sym == "GLD" {
        assert_eq!(*w, 1.0);
      } else {
        assert_eq!(*w, 0.0);
      }
    }
  }

  #[test]
  fn cadence_gates_subsequent_cycles() {
    let mut engine = AllocationEngine::new(universe(), test_config()).unwrap();
    drive(
      &mut engine,
      30,
      |i, d| (100.0 + 10.0 * i as f64) * 1.01_f64.powi(d as i32),
      |_| 100_000.0,
    );
    assert!(engine.last_rebalance.is_some());

    // One day after a committed rebalance: not due for another 90.
    let outcome = engine
      .observe(&[140.0, 150.0, 160.0], 100_000.0, ts(30))
      .unwrap();
    assert!(matches!(outcome, CycleOutcome::NotDue));
  }

  #[tracing_test::traced_test]
  #[test]
  fn insufficient_history_skips_without_changing_weights() {
    let mut engine = AllocationEngine::new(universe(), test_config()).unwrap();
    let before = engine.current_weights();
    let outcome = engine
      .observe(&[100.0, 110.0, 120.0], 100_000.0, ts(0))
      .unwrap();
    assert!(matches!(outcome, CycleOutcome::Skipped { .. }));
    assert_eq!(engine.current_weights(), before);
    assert!(logs_contain("skipping rebalance"));
  }

  #[test]
  fn reentrant_trigger_is_rejected() {
    let mut engine = AllocationEngine::new(universe(), test_config()).unwrap();
    engine.in_cycle = true;
    let outcome = engine.rebalance(ts(0)).unwrap();
    match outcome {
      CycleOutcome::Skipped { reason } => assert!(reason.contains("in flight")),
      other => panic!("expected a skip, got {other:?}"),
    }
    engine.in_cycle = false;
  }

  #[test]
  fn wrong_width_tick_is_rejected() {
    let mut engine = AllocationEngine::new(universe(), test_config()).unwrap();
    assert!(matches!(
      engine.observe(&[100.0], 100_000.0, ts(0)),
      Err(AllocationError::Configuration(_))
    ));
  }
}
