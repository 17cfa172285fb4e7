use anyhow::Result;
use chrono::Duration;
use chrono::TimeZone;
use chrono::Utc;
use quantfolio::AllocationEngine;
use quantfolio::AllocatorConfig;
use quantfolio::CycleOutcome;
use quantfolio::Universe;
use quantfolio::forecast::ForecastConfig;
use quantfolio::hedge;
use quantfolio::hedge::HedgeConfig;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::Distribution;
use rand_distr::Normal;

fn main() -> Result<()> {
  let universe = Universe::new(vec!["SPY", "TLT", "GLD", "SHY"])?;
  let config = AllocatorConfig {
    lookback: 120,
    rebalance_cadence: Duration::days(30),
    defensive_asset: "SHY".into(),
    forecast: ForecastConfig {
      epochs: 30,
      ..ForecastConfig::default()
    },
    ..AllocatorConfig::default()
  };
  let mut engine = AllocationEngine::new(universe.clone(), config)?;

  // Synthetic daily closes: independent geometric walks with per-asset
  // drift and volatility.
  let mut rng = StdRng::seed_from_u64(42);
  let drifts = [0.0004, 0.0002, 0.0001, 0.00005];
  let vols = [0.012, 0.007, 0.009, 0.001];
  let mut prices = [450.0, 95.0, 180.0, 82.0];
  let mut portfolio_value = 1_000_000.0;

  let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
  for day in 0..200i64 {
    for i in 0..prices.len() {
      let shock = Normal::new(drifts[i], vols[i])?.sample(&mut rng);
      prices[i] *= 1.0 + shock;
    }
    portfolio_value *= 1.0 + Normal::new(0.0002, 0.004)?.sample(&mut rng);

    let outcome = engine.observe(&prices, portfolio_value, start + Duration::days(day))?;
    if let CycleOutcome::Rebalanced(weights) = outcome {
      println!("day {day}: rebalanced");
      for (symbol, weight) in &weights {
        println!("  {symbol}: {:.2}%", weight * 100.0);
      }
    }
  }

  let weights: Vec<f64> = engine.current_weights().iter().map(|(_, w)| *w).collect();
  println!("\nProtective puts for the final allocation:");
  let hedges = hedge::protective_puts(
    &universe,
    &prices,
    &weights,
    portfolio_value,
    &HedgeConfig::default(),
  );
  for h in hedges {
    println!("  {} {:?} strike {:.2} x{}", h.symbol, h.option_type, h.strike, h.contracts);
  }

  Ok(())
}
