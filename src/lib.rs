//! Quantfolio - a portfolio allocation engine.
//!
//! Periodically computes target weights for a fixed asset universe by
//! blending a market-equilibrium prior with investor views and gating the
//! result behind drawdown and Value-at-Risk circuit breakers. Each
//! rebalance runs one synchronous pipeline:
//!
//! 1. rolling price history -> period returns and sample covariance
//! 2. principal-component projection of the return history
//! 3. walk-forward-validated return forecast on the reduced factors
//! 4. equilibrium returns from a reference weighting
//! 5. Black-Litterman posterior blend of prior and views
//! 6. bounded, budget-constrained mean-variance optimization
//! 7. risk gate: defensive override on drawdown or forecast VaR breaches
//!
//! The host feeds ticks (prices, portfolio value, timestamp) into
//! [`engine::AllocationEngine::observe`]; the engine decides when a
//! rebalance is due and reports the committed allocation. A protective-put
//! overlay ([`hedge`]) is available as a separately invoked capability.

pub mod blend;
pub mod config;
pub mod engine;
pub mod equilibrium;
pub mod error;
pub mod estimator;
pub mod factors;
pub mod forecast;
pub mod hedge;
pub mod history;
pub mod optimizer;
pub mod risk;
pub mod universe;

pub use config::AllocatorConfig;
pub use engine::AllocationEngine;
pub use engine::CycleOutcome;
pub use equilibrium::ViewSet;
pub use error::AllocationError;
pub use error::Result;
pub use risk::GateState;
pub use universe::Universe;
