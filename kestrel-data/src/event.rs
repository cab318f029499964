use crate::{
    Symbol,
    bar::{Bar, Timeframe},
    books::OrderBook,
    ticker::Ticker,
};
use chrono::{DateTime, Utc};
use derive_more::From;
use serde::{Deserialize, Serialize};

/// Stream kinds a consumer can subscribe to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Ticker,
    Bars(Timeframe),
    Book,
}

impl StreamKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamKind::Ticker => "ticker",
            StreamKind::Bars(_) => "bars",
            StreamKind::Book => "book",
        }
    }
}

/// Normalised market event delivered to stream subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, From)]
pub enum MarketEvent {
    Bar(Bar),
    Ticker(Ticker),
    Book(OrderBook),
    /// Feed discontinuity: an incoming bar did not follow the last emitted
    /// bar. The stream resynchronises on the incoming bar; no bars are
    /// fabricated.
    #[from(ignore)]
    Gap {
        symbol: Symbol,
        timeframe: Timeframe,
        expected: DateTime<Utc>,
        actual: DateTime<Utc>,
    },
    /// Connector dropped; cached state remains valid and is still served.
    #[from(ignore)]
    FeedInterrupted { symbol: Symbol },
    /// Connector recovered.
    #[from(ignore)]
    FeedRestored { symbol: Symbol },
}

impl MarketEvent {
    pub fn symbol(&self) -> &Symbol {
        match self {
            MarketEvent::Bar(bar) => &bar.symbol,
            MarketEvent::Ticker(ticker) => &ticker.symbol,
            MarketEvent::Book(book) => &book.symbol,
            MarketEvent::Gap { symbol, .. } => symbol,
            MarketEvent::FeedInterrupted { symbol } => symbol,
            MarketEvent::FeedRestored { symbol } => symbol,
        }
    }
}
