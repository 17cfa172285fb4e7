//! Error taxonomy for the allocation pipeline.

use thiserror::Error;

/// Failure modes of the allocation engine.
///
/// `Configuration` is fatal at construction. Every other variant is
/// recoverable at cycle granularity: the engine skips the rebalance,
/// retains the prior weights and logs the reason.
#[derive(Error, Debug)]
pub enum AllocationError {
  /// History or sample layout too short for the requested operation.
  #[error("insufficient data: needed {needed}, got {got}")]
  InsufficientData { needed: usize, got: usize },

  /// Non-finite values or a singular matrix in the numerical pipeline.
  #[error("numerical error: {0}")]
  Numerical(String),

  /// The constrained solver failed to produce a feasible allocation.
  #[error("optimization error: {0}")]
  Optimization(String),

  /// Invalid configuration rejected at startup.
  #[error("configuration error: {0}")]
  Configuration(String),

  /// Tensor or model failure inside the forecaster.
  #[error("forecast error: {0}")]
  Forecast(String),
}

impl From<candle_core::Error> for AllocationError {
  fn from(e: candle_core::Error) -> Self {
    AllocationError::Forecast(e.to_string())
  }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, AllocationError>;
