//! # History Store
//!
//! Rolling per-asset price buffers plus a rolling portfolio-value buffer.
//! Buffers are bounded at `lookback` entries; the oldest entry is evicted
//! first once capacity is reached. Ingestion appends, the pipeline reads;
//! both run on the same sequential timeline.

use std::collections::VecDeque;

use ndarray::Array2;

/// Rolling price/value history for a fixed universe.
#[derive(Clone, Debug)]
pub struct HistoryStore {
  lookback: usize,
  prices: Vec<VecDeque<f64>>,
  values: VecDeque<f64>,
}

impl HistoryStore {
  /// Create empty buffers for `n_assets` assets, each bounded at `lookback`.
  pub fn new(n_assets: usize, lookback: usize) -> Self {
    Self {
      lookback,
      prices: vec![VecDeque::with_capacity(lookback); n_assets],
      values: VecDeque::with_capacity(lookback),
    }
  }

  /// Append a closing price for the asset at `index`, evicting the oldest
  /// entry once the buffer holds `lookback` prices.
  pub fn record(&mut self, index: usize, price: f64) {
    let buf = &mut self.prices[index];
    if buf.len() == self.lookback {
      buf.pop_front();
    }
    buf.push_back(price);
  }

  /// Append a total portfolio value, with the same eviction rule.
  pub fn record_portfolio_value(&mut self, value: f64) {
    if self.values.len() == self.lookback {
      self.values.pop_front();
    }
    self.values.push_back(value);
  }

  /// True once every asset buffer holds at least two prices, the minimum
  /// needed to compute one return.
  pub fn is_ready(&self) -> bool {
    !self.prices.is_empty() && self.prices.iter().all(|b| b.len() >= 2)
  }

  /// True once every asset buffer holds exactly `lookback` prices. The
  /// engine requires fullness before estimating a covariance matrix.
  pub fn is_full(&self) -> bool {
    !self.prices.is_empty() && self.prices.iter().all(|b| b.len() == self.lookback)
  }

  /// Number of complete observations available across all assets.
  pub fn len(&self) -> usize {
    self.prices.iter().map(|b| b.len()).min().unwrap_or(0)
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  /// Configured buffer capacity.
  pub fn lookback(&self) -> usize {
    self.lookback
  }

  /// Price matrix, assets x T, over the common observation count.
  pub fn price_matrix(&self) -> Array2<f64> {
    let t = self.len();
    let n = self.prices.len();
    let mut out = Array2::zeros((n, t));
    for (i, buf) in self.prices.iter().enumerate() {
      // Tail-align so every asset contributes its most recent t prices.
      let skip = buf.len() - t;
      for (j, p) in buf.iter().skip(skip).enumerate() {
        out[[i, j]] = *p;
      }
    }
    out
  }

  /// Portfolio-value history, oldest first.
  pub fn value_history(&self) -> Vec<f64> {
    self.values.iter().copied().collect()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn evicts_oldest_at_capacity() {
    let mut h = HistoryStore::new(1, 3);
    for p in [1.0, 2.0, 3.0, 4.0] {
      h.record(0, p);
    }
    let m = h.price_matrix();
    assert_eq!(m.shape(), &[1, 3]);
    assert_eq!(m[[0, 0]], 2.0);
    assert_eq!(m[[0, 2]], 4.0);
  }

  #[test]
  fn readiness_requires_two_prices_everywhere() {
    let mut h = HistoryStore::new(2, 5);
    h.record(0, 10.0);
    h.record(0, 11.0);
    assert!(!h.is_ready());
    h.record(1, 20.0);
    h.record(1, 21.0);
    assert!(h.is_ready());
    assert!(!h.is_full());
  }

  #[test]
  fn value_buffer_rolls() {
    let mut h = HistoryStore::new(1, 2);
    h.record_portfolio_value(100.0);
    h.record_portfolio_value(110.0);
    h.record_portfolio_value(90.0);
    assert_eq!(h.value_history(), vec![110.0, 90.0]);
  }
}
