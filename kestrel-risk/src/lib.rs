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

//! Kestrel risk pipeline.
//!
//! Three stages around every trade: synchronous ordered pre-trade
//! [`gate`]s, [`sizing`] of accepted signals, and the always-on continuous
//! [`monitor`]s that pause, reduce or unwind activity when limits are
//! breached. The [`breaker`] escalates through leveled trading halts; the
//! [`alert`] throttle keeps the event stream deduplicated without losing
//! escalation pressure.

/// Cross-account rollups and global thresholds.
pub mod aggregate;

/// Cooldown/dedup/escalation filtering of risk events.
pub mod alert;

/// Black-swan detection: price velocity, depth collapse, venue divergence.
pub mod black_swan;

/// Leveled circuit breaker state machine.
pub mod breaker;

/// Risk events, levels and the mitigation action vocabulary.
pub mod event;

/// Ordered pre-trade gate chain.
pub mod gate;

/// Risk limit configuration.
pub mod limits;

/// Continuous monitors: drawdown, margin, concentration, liquidation
/// distance.
pub mod monitor;

/// The assembled pre-trade pipeline: gates then sizing.
pub mod pipeline;

/// Risk-per-trade sizing with clamps.
pub mod sizing;

use derive_more::Constructor;
use serde::{Deserialize, Serialize};

/// Wrapper around an item approved by the risk pipeline.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor,
)]
pub struct RiskApproved<T>(pub T);

impl<T> RiskApproved<T> {
    pub fn into_item(self) -> T {
        self.0
    }
}

/// Wrapper around an item refused by the risk pipeline, with the refusing
/// gate's reason.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor,
)]
pub struct RiskRefused<T> {
    pub item: T,
    pub reason: String,
}

impl<T> RiskRefused<T> {
    pub fn into_item(self) -> T {
        self.item
    }
}
