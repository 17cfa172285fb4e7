//! # Protective-Put Overlay
//!
//! Standalone hedging capability: given current prices and the committed
//! allocation, produce a set of protective-put instructions. This is never
//! invoked by the rebalance cycle; hosts trigger it independently and route
//! the instructions to their own options workflow (chain retrieval and
//! contract selection are outside this crate).

use crate::universe::Universe;

/// Option side of a hedge instruction.
#[derive(Default, Clone, Copy, PartialEq, Eq, Debug)]
pub enum OptionType {
  Call,
  #[default]
  Put,
}

/// Sizing parameters for the overlay.
#[derive(Clone, Debug)]
pub struct HedgeConfig {
  /// Fraction of each position's notional to protect.
  pub hedge_ratio: f64,
  /// Strike discount below spot, e.g. 0.05 for 5% out of the money.
  pub otm_pct: f64,
  /// Shares per option contract.
  pub contract_multiplier: f64,
}

impl Default for HedgeConfig {
  fn default() -> Self {
    Self {
      hedge_ratio: 1.0,
      otm_pct: 0.05,
      contract_multiplier: 100.0,
    }
  }
}

/// One leg of the hedge.
#[derive(Clone, Debug, PartialEq)]
pub struct HedgeInstruction {
  pub symbol: String,
  pub option_type: OptionType,
  /// Strike rounded down from the out-of-the-money target.
  pub strike: f64,
  /// Whole contracts to buy.
  pub contracts: u64,
}

/// Build protective-put instructions for every held position.
///
/// Positions too small to cover a single contract produce no instruction,
/// as do assets with a non-positive price.
pub fn protective_puts(
  universe: &Universe,
  prices: &[f64],
  weights: &[f64],
  portfolio_value: f64,
  config: &HedgeConfig,
) -> Vec<HedgeInstruction> {
  let mut out = Vec::new();
  for (i, symbol) in universe.symbols().iter().enumerate() {
    let price = prices.get(i).copied().unwrap_or(0.0);
    let weight = weights.get(i).copied().unwrap_or(0.0);
    if price <= 0.0 || weight <= 0.0 {
      continue;
    }

    let notional = weight * portfolio_value * config.hedge_ratio;
    let shares = notional / price;
    let contracts = (shares / config.contract_multiplier).floor() as u64;
    if contracts == 0 {
      continue;
    }

    out.push(HedgeInstruction {
      symbol: symbol.clone(),
      option_type: OptionType::Put,
      strike: price * (1.0 - config.otm_pct),
      contracts,
    });
  }
  out
}
