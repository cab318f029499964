#![forbid(unsafe_code)]
#![warn(
    unused,
    clippy::cognitive_complexity,
    unused_crate_dependencies,
    unused_extern_crates,
    clippy::unused_self,
    clippy::useless_let_if_seq,
    missing_debug_implementations,
    rust_2018_idioms,
    rust_2024_compatibility
)]

//! Kestrel strategy runtime and shipped strategies.
//!
//! A [`Strategy`] receives ordered market data callbacks and emits
//! [`Signal`](signal::Signal)s synchronously. The
//! [`StrategyRuntime`](runtime::StrategyRuntime) owns every instance,
//! enforces the lifecycle state machine and guarantees at-most-one
//! concurrent callback per instance by construction (instances are owned,
//! never shared).

use crate::{config::ConfigError, signal::Signal};
use kestrel_data::{bar::Bar, books::OrderBook, ticker::Ticker};

/// Strategy configuration schemas and validation.
pub mod config;

/// Defines all possible errors in the strategy layer.
pub mod error;

/// Order-flow strategies: volume spike, VWAP deviation.
pub mod flow;

/// Name -> factory registry.
pub mod registry;

/// Mean-reversion strategies: RSI, Bollinger.
pub mod reversion;

/// Multi-timeframe resonance strategy.
pub mod resonance;

/// Instance lifecycle and dispatch.
pub mod runtime;

/// The signal model strategies emit.
pub mod signal;

/// Statistical arbitrage: pairs z-score.
pub mod stat_arb;

/// Trend strategies: dual SMA, MACD.
pub mod trend;

/// Volatility strategies: ATR breakout, Bollinger squeeze.
pub mod volatility;

/// Capability set every strategy implements. `on_ticker` / `on_book`
/// default to no-ops; bar-driven strategies only implement `on_bar`.
pub trait Strategy: Send + std::fmt::Debug {
    /// Emit zero or more signals for a closed bar.
    fn on_bar(&mut self, bar: &Bar) -> Vec<Signal>;

    fn on_ticker(&mut self, _ticker: &Ticker) -> Vec<Signal> {
        Vec::new()
    }

    fn on_book(&mut self, _book: &OrderBook) -> Vec<Signal> {
        Vec::new()
    }

    /// Serialized internal state for crash recovery and backtest
    /// determinism. Not a migration format.
    fn state_snapshot(&self) -> Vec<u8> {
        Vec::new()
    }
}

/// A factory building a strategy instance from raw config parameters.
/// Validation is total: every error in the parameters surfaces here, before
/// the instance starts.
pub type StrategyFactory =
    fn(&serde_json::Value) -> Result<Box<dyn Strategy>, ConfigError>;
