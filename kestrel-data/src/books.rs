use crate::{Symbol, error::DataError};
use chrono::{DateTime, Utc};
use derive_more::Constructor;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Single price level.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Constructor,
)]
pub struct Level {
    pub price: Decimal,
    pub amount: Decimal,
}

/// Normalised L2 [`OrderBook`] snapshot: bids sorted descending, asks
/// ascending, and never crossed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OrderBook {
    pub symbol: Symbol,
    pub time: DateTime<Utc>,
    pub sequence: u64,
    bids: Vec<Level>,
    asks: Vec<Level>,
}

impl OrderBook {
    /// Construct a sorted book from unsorted levels. Rejects crossed books.
    pub fn new<IterBids, IterAsks>(
        symbol: Symbol,
        time: DateTime<Utc>,
        sequence: u64,
        bids: IterBids,
        asks: IterAsks,
    ) -> Result<Self, DataError>
    where
        IterBids: IntoIterator<Item = Level>,
        IterAsks: IntoIterator<Item = Level>,
    {
        let mut bids: Vec<Level> = bids.into_iter().filter(|l| !l.amount.is_zero()).collect();
        let mut asks: Vec<Level> = asks.into_iter().filter(|l| !l.amount.is_zero()).collect();
        bids.sort_by(|a, b| b.price.cmp(&a.price));
        asks.sort_by(|a, b| a.price.cmp(&b.price));

        let book = Self {
            symbol,
            time,
            sequence,
            bids,
            asks,
        };
        if let (Some(bid), Some(ask)) = (book.best_bid(), book.best_ask()) {
            if bid.price >= ask.price {
                return Err(DataError::CrossedBook {
                    symbol: book.symbol,
                    best_bid: bid.price,
                    best_ask: ask.price,
                });
            }
        }
        Ok(book)
    }

    pub fn bids(&self) -> &[Level] {
        &self.bids
    }

    pub fn asks(&self) -> &[Level] {
        &self.asks
    }

    pub fn best_bid(&self) -> Option<Level> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<Level> {
        self.asks.first().copied()
    }

    /// Mid-price from the best bid and ask, falling back to the populated
    /// side of a one-sided book.
    pub fn mid_price(&self) -> Option<Decimal> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid.price + ask.price) / Decimal::from(2u64)),
            (Some(bid), None) => Some(bid.price),
            (None, Some(ask)) => Some(ask.price),
            (None, None) => None,
        }
    }

    /// Total resting amount on one side.
    pub fn depth(&self, side: crate::Side) -> Decimal {
        let levels = match side {
            crate::Side::Buy => &self.asks,
            crate::Side::Sell => &self.bids,
        };
        levels.iter().map(|level| level.amount).sum()
    }

    /// Levels a taker of `side` would consume, best first.
    pub fn taker_levels(&self, side: crate::Side) -> &[Level] {
        match side {
            crate::Side::Buy => &self.asks,
            crate::Side::Sell => &self.bids,
        }
    }

    /// Compare sequence numbers to discard stale snapshots.
    pub fn is_newer_than(&self, other: &OrderBook) -> bool {
        matches!(self.sequence.cmp(&other.sequence), Ordering::Greater)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book(bids: Vec<(i64, i64)>, asks: Vec<(i64, i64)>) -> Result<OrderBook, DataError> {
        OrderBook::new(
            Symbol::new("BTC/USDT"),
            DateTime::from_timestamp(0, 0).unwrap(),
            1,
            bids.into_iter()
                .map(|(p, a)| Level::new(Decimal::from(p), Decimal::from(a))),
            asks.into_iter()
                .map(|(p, a)| Level::new(Decimal::from(p), Decimal::from(a))),
        )
    }

    #[test]
    fn sorts_both_sides() {
        let book = book(vec![(99, 1), (100, 2)], vec![(102, 1), (101, 3)]).unwrap();
        assert_eq!(book.best_bid().unwrap().price, dec!(100));
        assert_eq!(book.best_ask().unwrap().price, dec!(101));
        assert_eq!(book.mid_price(), Some(dec!(100.5)));
    }

    #[test]
    fn rejects_crossed() {
        assert!(matches!(
            book(vec![(101, 1)], vec![(100, 1)]),
            Err(DataError::CrossedBook { .. })
        ));
    }

    #[test]
    fn drops_empty_levels() {
        let book = book(vec![(100, 0), (99, 1)], vec![(101, 2)]).unwrap();
        assert_eq!(book.bids().len(), 1);
        assert_eq!(book.best_bid().unwrap().price, dec!(99));
    }
}
