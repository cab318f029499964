use crate::{Symbol, error::DataError};
use chrono::{DateTime, Duration, Utc};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Bar interval. The discriminant set matches what strategies subscribe to;
/// aggregation only composes timeframes whose durations divide evenly.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "lowercase")]
pub enum Timeframe {
    #[display("1m")]
    M1,
    #[display("5m")]
    M5,
    #[display("15m")]
    M15,
    #[display("30m")]
    M30,
    #[display("1h")]
    H1,
    #[display("4h")]
    H4,
    #[display("1d")]
    D1,
}

impl Timeframe {
    pub fn duration(&self) -> Duration {
        match self {
            Timeframe::M1 => Duration::minutes(1),
            Timeframe::M5 => Duration::minutes(5),
            Timeframe::M15 => Duration::minutes(15),
            Timeframe::M30 => Duration::minutes(30),
            Timeframe::H1 => Duration::hours(1),
            Timeframe::H4 => Duration::hours(4),
            Timeframe::D1 => Duration::days(1),
        }
    }

    pub fn seconds(&self) -> i64 {
        self.duration().num_seconds()
    }

    /// True if `time` sits exactly on a boundary of this timeframe.
    pub fn is_boundary(&self, time: DateTime<Utc>) -> bool {
        time.timestamp() % self.seconds() == 0 && time.timestamp_subsec_millis() == 0
    }

    /// Floor `time` down to the open of the interval containing it.
    pub fn open_time(&self, time: DateTime<Utc>) -> DateTime<Utc> {
        let seconds = self.seconds();
        let floored = time.timestamp() - time.timestamp().rem_euclid(seconds);
        DateTime::from_timestamp(floored, 0).unwrap_or(time)
    }

    /// True if bars of `self` can be aggregated into `target`.
    pub fn divides(&self, target: Timeframe) -> bool {
        target.seconds() > self.seconds() && target.seconds() % self.seconds() == 0
    }
}

/// Immutable OHLCV record for one (symbol, timeframe) interval.
///
/// `time` is the interval open, aligned to the timeframe boundary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Bar {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub time: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote_volume: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trades_count: Option<u64>,
}

impl Bar {
    /// Construct a validated bar. Rejects inverted OHLC ranges, negative
    /// volume, and timestamps off the timeframe boundary.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        symbol: Symbol,
        timeframe: Timeframe,
        time: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Result<Self, DataError> {
        if low > open.min(close) || high < open.max(close) || low > high {
            return Err(DataError::InvalidBar {
                symbol: symbol.clone(),
                reason: format!("ohlc range inverted: o={open} h={high} l={low} c={close}"),
            });
        }
        if volume < Decimal::ZERO {
            return Err(DataError::InvalidBar {
                symbol: symbol.clone(),
                reason: format!("negative volume: {volume}"),
            });
        }
        if !timeframe.is_boundary(time) {
            return Err(DataError::UnalignedTimestamp {
                symbol,
                timeframe,
                time,
            });
        }
        Ok(Self {
            symbol,
            timeframe,
            time,
            open,
            high,
            low,
            close,
            volume,
            quote_volume: None,
            trades_count: None,
        })
    }

    pub fn with_quote_volume(mut self, quote_volume: Decimal) -> Self {
        self.quote_volume = Some(quote_volume);
        self
    }

    pub fn with_trades_count(mut self, trades_count: u64) -> Self {
        self.trades_count = Some(trades_count);
        self
    }

    /// Close timestamp of the interval (open of the next bar).
    pub fn close_time(&self) -> DateTime<Utc> {
        self.time + self.timeframe.duration()
    }

    /// (high + low + close) / 3.
    pub fn typical_price(&self) -> Decimal {
        (self.high + self.low + self.close) / Decimal::from(3u64)
    }
}
