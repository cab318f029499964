use crate::Symbol;
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Last-price snapshot for one symbol. Replaced wholesale on each update.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Constructor)]
pub struct Ticker {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub bid_volume: Decimal,
    pub ask_volume: Decimal,
}

impl Ticker {
    pub fn mid(&self) -> Decimal {
        (self.bid + self.ask) / Decimal::from(2u64)
    }

    pub fn spread(&self) -> Decimal {
        self.ask - self.bid
    }
}
