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

//! Normalised market data for Kestrel.
//!
//! This crate owns the canonical bar/ticker/book model and the
//! [`MarketEngine`](engine::MarketEngine) that turns raw connector updates
//! into ordered, gap-aware per-(symbol, timeframe) streams.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Provides the canonical OHLCV [`Bar`](bar::Bar) and [`Timeframe`](bar::Timeframe).
pub mod bar;

/// Aggregates lower-timeframe bars into higher-timeframe bars on the fly.
pub mod aggregator;

/// Sorted L2 order book snapshots.
pub mod books;

/// Bounded per-stream history buffers.
pub mod buffer;

/// The subscription engine fanning updates out to consumers.
pub mod engine;

/// Defines all possible errors in the market data layer.
pub mod error;

/// Market stream events delivered to subscribers.
pub mod event;

/// Last-trade/top-of-book snapshot.
pub mod ticker;

/// Normalised instrument symbol, eg/ "BTC/USDT".
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, Default,
)]
pub struct Symbol(pub SmolStr);

impl Symbol {
    pub fn new(symbol: impl AsRef<str>) -> Self {
        Self(SmolStr::new(symbol))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Trading venue identifier.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Venue {
    Mock,
    BinanceSpot,
    BinanceFuturesUsd,
    BybitSpot,
    BybitPerpetualsUsd,
    Okx,
    Coinbase,
    Kraken,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Mock => "mock",
            Venue::BinanceSpot => "binance_spot",
            Venue::BinanceFuturesUsd => "binance_futures_usd",
            Venue::BybitSpot => "bybit_spot",
            Venue::BybitPerpetualsUsd => "bybit_perpetuals_usd",
            Venue::Okx => "okx",
            Venue::Coinbase => "coinbase",
            Venue::Kraken => "kraken",
        }
    }
}

/// Side of a trade or order.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}
