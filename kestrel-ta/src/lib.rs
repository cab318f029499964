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

//! Technical analysis utilities for Kestrel.
//!
//! This crate provides streaming indicators, pattern detection and level
//! calculations that can be reused across strategies. Indicators follow an
//! `update` style: feed one bar's worth of data, read the latest value.
//! An indicator that has not seen its full warmup window yields `None`
//! rather than a partial value.

pub mod indicators;
pub mod patterns;

use rust_decimal::Decimal;

/// Mean of a decimal slice. Empty input yields `None`.
pub fn mean(values: &[Decimal]) -> Option<Decimal> {
    if values.is_empty() {
        return None;
    }
    let sum: Decimal = values.iter().copied().sum();
    Some(sum / Decimal::from(values.len() as u64))
}

/// Population standard deviation of a decimal slice. Empty input yields `None`.
pub fn stdev(values: &[Decimal]) -> Option<Decimal> {
    let mu = mean(values)?;
    let variance: Decimal = values
        .iter()
        .map(|value| {
            let diff = *value - mu;
            diff * diff
        })
        .sum::<Decimal>()
        / Decimal::from(values.len() as u64);
    use rust_decimal::MathematicalOps;
    variance.sqrt()
}
