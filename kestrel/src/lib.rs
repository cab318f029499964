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
#![allow(clippy::type_complexity, clippy::too_many_arguments)]

//! # Kestrel
//! Kestrel core is the single-process spine of the trading engine: market
//! data flows into hosted strategies, emitted signals pass the layered
//! risk pipeline, accepted intents become execution plans driven to fills,
//! and continuous monitors unwind activity when limits are breached.
//!
//! Components never hold references to each other; they communicate
//! exclusively through the typed [`bus`] and explicit snapshots. The audit
//! sink subscribes to every topic.

use derive_more::Constructor;
use serde::{Deserialize, Serialize};

/// Per-account position and equity state folded from fills.
pub mod account;

/// Typed pub/sub bus with bounded per-subscriber queues.
pub mod bus;

/// The orchestrator: lifecycle, wiring and the signal-to-execution
/// pipeline.
pub mod engine;

/// Defines all possible errors in Kestrel core and their recovery policy.
pub mod error;

/// Engine event vocabulary published on the bus.
pub mod event;

/// Exchange connector interface (implementations live outside the core).
pub mod exchange;

/// Provides default Kestrel Tracing logging initialisers.
pub mod logging;

/// Monotonically increasing event sequence. Used to track engine event
/// processing order.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor,
)]
pub struct Sequence(pub u64);

impl Sequence {
    pub fn value(&self) -> u64 {
        self.0
    }

    pub fn fetch_add(&mut self) -> Sequence {
        let sequence = *self;
        self.0 += 1;
        sequence
    }
}
