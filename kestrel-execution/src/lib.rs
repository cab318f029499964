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

//! Kestrel execution layer.
//!
//! Turns accepted, sized trade intents into order slices, drives them to
//! fills through an [`ExecutionClient`](client::ExecutionClient), and keeps
//! the working-order set and per-venue backoff state.

use rust_decimal::{Decimal, RoundingStrategy};

/// Per-venue exponential retry backoff.
pub mod backoff;

/// Account balances and position accounting.
pub mod balance;

/// `ExecutionClient` trait and the mock venue used by tests and backtests.
pub mod client;

/// Defines all possible errors in the execution layer.
pub mod error;

/// Order identifiers, order model and fills.
pub mod order;

/// Iceberg slicing with partially hidden display quantities.
pub mod iceberg;

/// Execution plan model shared by the slicing algorithms.
pub mod plan;

/// The algorithm selector producing [`plan::ExecutionPlan`]s.
pub mod planner;

/// Order-book walking slippage estimation.
pub mod slippage;

/// Time-weighted slicing.
pub mod twap;

/// Volume-curve-weighted slicing.
pub mod vwap;

/// Sharded working-order map.
pub mod tracker;

/// Round a monetary value to a venue step using half-up rounding. All
/// rounding happens here, at the venue boundary; internal accounting stays
/// unrounded.
pub fn round_to_step(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn half_up_at_venue_boundary() {
        assert_eq!(round_to_step(dec!(1.005), 2), dec!(1.01));
        assert_eq!(round_to_step(dec!(1.004), 2), dec!(1.00));
        assert_eq!(round_to_step(dec!(-1.005), 2), dec!(-1.01));
    }
}
