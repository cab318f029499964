use crate::{
    Symbol,
    aggregator::BarAggregator,
    bar::{Bar, Timeframe},
    books::OrderBook,
    buffer::BarBuffer,
    error::DataError,
    event::{MarketEvent, StreamKind},
    ticker::Ticker,
};
use indexmap::IndexMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Identifier handed out by [`MarketEngine::subscribe`], used to unsubscribe.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SubscriptionId(u64);

/// Ordered, gap-aware per-(symbol, timeframe) stream engine.
///
/// Connectors push normalised updates via [`feed_bar`](Self::feed_bar) /
/// [`feed_ticker`](Self::feed_ticker) / [`feed_book`](Self::feed_book); the
/// engine deduplicates, detects gaps, aggregates higher timeframes on the
/// fly, retains bounded history, and fans events out to subscribers.
///
/// Per (symbol, timeframe) consumers see bars in strictly increasing time;
/// no ordering is guaranteed across symbols.
#[derive(Debug)]
pub struct MarketEngine {
    feed_timeframe: Timeframe,
    buffer_capacity: usize,
    next_subscription: u64,
    streams: IndexMap<(Symbol, StreamKind), StreamState>,
    latest_tickers: IndexMap<Symbol, Ticker>,
    latest_books: IndexMap<Symbol, OrderBook>,
}

#[derive(Debug)]
struct StreamState {
    subscribers: Vec<(SubscriptionId, mpsc::UnboundedSender<MarketEvent>)>,
    aggregator: Option<BarAggregator>,
    buffer: BarBuffer,
    last_time: Option<chrono::DateTime<chrono::Utc>>,
    duplicates: u64,
}

impl StreamState {
    fn new(buffer_capacity: usize, aggregator: Option<BarAggregator>) -> Self {
        Self {
            subscribers: Vec::new(),
            aggregator,
            buffer: BarBuffer::new(buffer_capacity),
            last_time: None,
            duplicates: 0,
        }
    }

    fn publish(&mut self, event: MarketEvent) {
        self.subscribers.retain(|(id, tx)| {
            if tx.send(event.clone()).is_err() {
                warn!(subscription = id.0, "market stream receiver dropped");
                false
            } else {
                true
            }
        });
    }
}

impl MarketEngine {
    pub fn new(feed_timeframe: Timeframe, buffer_capacity: usize) -> Self {
        Self {
            feed_timeframe,
            buffer_capacity,
            next_subscription: 0,
            streams: IndexMap::new(),
            latest_tickers: IndexMap::new(),
            latest_books: IndexMap::new(),
        }
    }

    /// Register a consumer for a stream. Returns the subscription id and the
    /// receiving half of the stream channel.
    pub fn subscribe(
        &mut self,
        symbol: Symbol,
        kind: StreamKind,
    ) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<MarketEvent>), DataError> {
        let aggregator = match kind {
            StreamKind::Bars(target) if target != self.feed_timeframe => {
                Some(BarAggregator::new(self.feed_timeframe, target)?)
            }
            _ => None,
        };

        let state = self
            .streams
            .entry((symbol, kind))
            .or_insert_with(|| StreamState::new(self.buffer_capacity, aggregator));

        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        let (tx, rx) = mpsc::unbounded_channel();
        state.subscribers.push((id, tx));
        Ok((id, rx))
    }

    /// Remove a consumer registered with [`subscribe`](Self::subscribe).
    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        for state in self.streams.values_mut() {
            state.subscribers.retain(|(sub, _)| *sub != id);
        }
    }

    /// Ingest one normalised bar from a connector. Must be at the engine's
    /// feed timeframe; derived streams aggregate from it.
    pub fn feed_bar(&mut self, bar: Bar) -> Result<(), DataError> {
        if bar.timeframe != self.feed_timeframe {
            return Err(DataError::IncompatibleTimeframes {
                source_timeframe: bar.timeframe,
                target: self.feed_timeframe,
            });
        }

        // Direct stream first, then derived streams in subscription order.
        let direct_key = (bar.symbol.clone(), StreamKind::Bars(bar.timeframe));
        if let Some(state) = self.streams.get_mut(&direct_key) {
            Self::deliver_bar(state, bar.clone());
        }

        let mut completed: Vec<((Symbol, StreamKind), Bar)> = Vec::new();
        for (key, state) in &mut self.streams {
            if key.0 != bar.symbol {
                continue;
            }
            if let Some(aggregator) = &mut state.aggregator {
                if let Some(target_bar) = aggregator.update(&bar)? {
                    completed.push((key.clone(), target_bar));
                }
            }
        }
        for (key, target_bar) in completed {
            if let Some(state) = self.streams.get_mut(&key) {
                Self::deliver_bar(state, target_bar);
            }
        }
        Ok(())
    }

    fn deliver_bar(state: &mut StreamState, bar: Bar) {
        match state.last_time {
            Some(last) if bar.time == last => {
                // Duplicate bar: dropped, counted.
                state.duplicates += 1;
                debug!(
                    symbol = %bar.symbol,
                    timeframe = %bar.timeframe,
                    duplicates = state.duplicates,
                    "duplicate bar dropped"
                );
                return;
            }
            Some(last) if bar.time < last => {
                // Out of order: never re-emit older bars.
                state.duplicates += 1;
                return;
            }
            Some(last) => {
                let expected = last + bar.timeframe.duration();
                if bar.time != expected {
                    state.publish(MarketEvent::Gap {
                        symbol: bar.symbol.clone(),
                        timeframe: bar.timeframe,
                        expected,
                        actual: bar.time,
                    });
                }
            }
            None => {}
        }

        state.last_time = Some(bar.time);
        state.buffer.push(bar.clone());
        state.publish(MarketEvent::Bar(bar));
    }

    /// Ingest a ticker snapshot; replaces the cached snapshot wholesale.
    pub fn feed_ticker(&mut self, ticker: Ticker) {
        self.latest_tickers
            .insert(ticker.symbol.clone(), ticker.clone());
        let key = (ticker.symbol.clone(), StreamKind::Ticker);
        if let Some(state) = self.streams.get_mut(&key) {
            state.publish(MarketEvent::Ticker(ticker));
        }
    }

    /// Ingest an order book snapshot; stale sequences are dropped.
    pub fn feed_book(&mut self, book: OrderBook) {
        if let Some(existing) = self.latest_books.get(&book.symbol) {
            if !book.is_newer_than(existing) {
                return;
            }
        }
        self.latest_books.insert(book.symbol.clone(), book.clone());
        let key = (book.symbol.clone(), StreamKind::Book);
        if let Some(state) = self.streams.get_mut(&key) {
            state.publish(MarketEvent::Book(book));
        }
    }

    /// Connector disconnect: notify every stream of the symbol. Cached state
    /// remains valid and continues to be served.
    pub fn feed_interrupted(&mut self, symbol: &Symbol) {
        self.broadcast_symbol(symbol, MarketEvent::FeedInterrupted {
            symbol: symbol.clone(),
        });
    }

    /// Connector recovery notification.
    pub fn feed_restored(&mut self, symbol: &Symbol) {
        self.broadcast_symbol(symbol, MarketEvent::FeedRestored {
            symbol: symbol.clone(),
        });
    }

    fn broadcast_symbol(&mut self, symbol: &Symbol, event: MarketEvent) {
        for (key, state) in &mut self.streams {
            if &key.0 == symbol {
                state.publish(event.clone());
            }
        }
    }

    /// Cached history for a stream, oldest first.
    pub fn bars(&self, symbol: &Symbol, timeframe: Timeframe) -> Vec<Bar> {
        self.streams
            .get(&(symbol.clone(), StreamKind::Bars(timeframe)))
            .map(|state| state.buffer.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn latest_bar(&self, symbol: &Symbol, timeframe: Timeframe) -> Option<Bar> {
        self.streams
            .get(&(symbol.clone(), StreamKind::Bars(timeframe)))
            .and_then(|state| state.buffer.last().cloned())
    }

    pub fn latest_ticker(&self, symbol: &Symbol) -> Option<&Ticker> {
        self.latest_tickers.get(symbol)
    }

    pub fn latest_book(&self, symbol: &Symbol) -> Option<&OrderBook> {
        self.latest_books.get(symbol)
    }

    /// Duplicate-bar drop count for a stream.
    pub fn duplicates(&self, symbol: &Symbol, timeframe: Timeframe) -> u64 {
        self.streams
            .get(&(symbol.clone(), StreamKind::Bars(timeframe)))
            .map(|state| state.duplicates)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn m5_bar(index: i64) -> Bar {
        Bar::new(
            Symbol::new("BTC/USDT"),
            Timeframe::M5,
            DateTime::from_timestamp(index * 300, 0).unwrap(),
            dec!(100),
            dec!(101),
            dec!(99),
            dec!(100) + Decimal::from(index),
            dec!(1),
        )
        .unwrap()
    }

    #[test]
    fn duplicate_bar_dropped_and_counted() {
        let mut engine = MarketEngine::new(Timeframe::M5, 16);
        let symbol = Symbol::new("BTC/USDT");
        let (_, mut rx) = engine
            .subscribe(symbol.clone(), StreamKind::Bars(Timeframe::M5))
            .unwrap();

        engine.feed_bar(m5_bar(0)).unwrap();
        engine.feed_bar(m5_bar(0)).unwrap();
        engine.feed_bar(m5_bar(1)).unwrap();

        assert!(matches!(rx.try_recv().unwrap(), MarketEvent::Bar(_)));
        assert!(matches!(rx.try_recv().unwrap(), MarketEvent::Bar(_)));
        assert!(rx.try_recv().is_err());
        assert_eq!(engine.duplicates(&symbol, Timeframe::M5), 1);
    }

    #[test]
    fn gap_emits_event_and_resyncs() {
        let mut engine = MarketEngine::new(Timeframe::M5, 16);
        let (_, mut rx) = engine
            .subscribe(Symbol::new("BTC/USDT"), StreamKind::Bars(Timeframe::M5))
            .unwrap();

        engine.feed_bar(m5_bar(0)).unwrap();
        engine.feed_bar(m5_bar(3)).unwrap();

        assert!(matches!(rx.try_recv().unwrap(), MarketEvent::Bar(_)));
        assert!(matches!(rx.try_recv().unwrap(), MarketEvent::Gap { .. }));
        assert!(matches!(rx.try_recv().unwrap(), MarketEvent::Bar(_)));
        // Stream continues from the resynchronised point.
        engine.feed_bar(m5_bar(4)).unwrap();
        assert!(matches!(rx.try_recv().unwrap(), MarketEvent::Bar(_)));
    }

    #[test]
    fn aggregated_stream_emits_higher_timeframe() {
        let mut engine = MarketEngine::new(Timeframe::M5, 16);
        let (_, mut rx) = engine
            .subscribe(Symbol::new("BTC/USDT"), StreamKind::Bars(Timeframe::M15))
            .unwrap();

        for i in 0..3 {
            engine.feed_bar(m5_bar(i)).unwrap();
        }
        let MarketEvent::Bar(bar) = rx.try_recv().unwrap() else {
            panic!("expected aggregated bar");
        };
        assert_eq!(bar.timeframe, Timeframe::M15);
        assert_eq!(bar.close, dec!(102));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let mut engine = MarketEngine::new(Timeframe::M5, 16);
        let (id, mut rx) = engine
            .subscribe(Symbol::new("BTC/USDT"), StreamKind::Bars(Timeframe::M5))
            .unwrap();
        engine.unsubscribe(id);
        engine.feed_bar(m5_bar(0)).unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn stale_book_sequence_dropped() {
        let mut engine = MarketEngine::new(Timeframe::M5, 16);
        let symbol = Symbol::new("BTC/USDT");
        let book = |sequence| {
            OrderBook::new(
                symbol.clone(),
                DateTime::from_timestamp(0, 0).unwrap(),
                sequence,
                vec![crate::books::Level::new(dec!(99), dec!(1))],
                vec![crate::books::Level::new(dec!(101), dec!(1))],
            )
            .unwrap()
        };
        engine.feed_book(book(5));
        engine.feed_book(book(3));
        assert_eq!(engine.latest_book(&symbol).unwrap().sequence, 5);
    }
}
