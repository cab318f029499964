use crate::{Symbol, bar::Timeframe};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

/// Defines all possible errors in the market data layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DataError {
    #[error("invalid bar for {symbol}: {reason}")]
    InvalidBar { symbol: Symbol, reason: String },

    #[error("bar time {time} for {symbol} not aligned to {timeframe} boundary")]
    UnalignedTimestamp {
        symbol: Symbol,
        timeframe: Timeframe,
        time: DateTime<Utc>,
    },

    #[error("crossed book for {symbol}: best_bid {best_bid} >= best_ask {best_ask}")]
    CrossedBook {
        symbol: Symbol,
        best_bid: Decimal,
        best_ask: Decimal,
    },

    #[error("cannot aggregate {source_timeframe} bars into {target}")]
    IncompatibleTimeframes {
        source_timeframe: Timeframe,
        target: Timeframe,
    },

    #[error("no subscription registered for {symbol} {stream}")]
    UnknownSubscription { symbol: Symbol, stream: String },
}
