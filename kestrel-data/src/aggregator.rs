use crate::{
    bar::{Bar, Timeframe},
    error::DataError,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Aggregates a stream of `source`-timeframe bars into `target`-timeframe
/// bars. A target bar is emitted only when the source bar closing the target
/// boundary arrives; partial aggregates are never emitted, and a source gap
/// discards the partial in progress.
#[derive(Debug, Clone)]
pub struct BarAggregator {
    source: Timeframe,
    target: Timeframe,
    partial: Option<Partial>,
}

#[derive(Debug, Clone)]
struct Partial {
    open_time: DateTime<Utc>,
    open: Decimal,
    high: Decimal,
    low: Decimal,
    close: Decimal,
    volume: Decimal,
    quote_volume: Decimal,
    trades_count: u64,
    next_source_time: DateTime<Utc>,
}

impl BarAggregator {
    pub fn new(source: Timeframe, target: Timeframe) -> Result<Self, DataError> {
        if !source.divides(target) {
            return Err(DataError::IncompatibleTimeframes {
                source_timeframe: source,
                target,
            });
        }
        Ok(Self {
            source,
            target,
            partial: None,
        })
    }

    pub fn source(&self) -> Timeframe {
        self.source
    }

    pub fn target(&self) -> Timeframe {
        self.target
    }

    /// Fold one source bar in. Returns the completed target bar when the
    /// source bar closes the target boundary.
    pub fn update(&mut self, bar: &Bar) -> Result<Option<Bar>, DataError> {
        if bar.timeframe != self.source {
            return Err(DataError::IncompatibleTimeframes {
                source_timeframe: bar.timeframe,
                target: self.target,
            });
        }

        let target_open = self.target.open_time(bar.time);
        let continues = matches!(
            &self.partial,
            Some(partial) if partial.next_source_time == bar.time
        );

        if continues {
            if let Some(partial) = &mut self.partial {
                partial.high = partial.high.max(bar.high);
                partial.low = partial.low.min(bar.low);
                partial.close = bar.close;
                partial.volume += bar.volume;
                partial.quote_volume += bar.quote_volume.unwrap_or(Decimal::ZERO);
                partial.trades_count += bar.trades_count.unwrap_or(0);
                partial.next_source_time = bar.time + self.source.duration();
            }
        } else {
            // Out-of-sequence source bar or first bar: restart the partial
            // only when the source bar opens a target interval.
            if bar.time != target_open {
                self.partial = None;
                return Ok(None);
            }
            self.partial = Some(Partial {
                open_time: target_open,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
                quote_volume: bar.quote_volume.unwrap_or(Decimal::ZERO),
                trades_count: bar.trades_count.unwrap_or(0),
                next_source_time: bar.time + self.source.duration(),
            });
        }

        // The target bar closes when the source bar's close reaches the
        // target interval close.
        if bar.time + self.source.duration() == target_open + self.target.duration() {
            if let Some(partial) = self.partial.take() {
                let completed = Bar::new(
                    bar.symbol.clone(),
                    self.target,
                    partial.open_time,
                    partial.open,
                    partial.high,
                    partial.low,
                    partial.close,
                    partial.volume,
                )?
                .with_quote_volume(partial.quote_volume)
                .with_trades_count(partial.trades_count);
                return Ok(Some(completed));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Symbol;
    use rust_decimal_macros::dec;

    fn m5_bar(index: i64, close: Decimal) -> Bar {
        Bar::new(
            Symbol::new("BTC/USDT"),
            Timeframe::M5,
            DateTime::from_timestamp(index * 300, 0).unwrap(),
            close,
            close + dec!(2),
            close - dec!(2),
            close,
            dec!(10),
        )
        .unwrap()
    }

    #[test]
    fn emits_only_on_boundary_close() {
        let mut aggregator = BarAggregator::new(Timeframe::M5, Timeframe::M15).unwrap();
        assert_eq!(aggregator.update(&m5_bar(0, dec!(100))).unwrap(), None);
        assert_eq!(aggregator.update(&m5_bar(1, dec!(105))).unwrap(), None);
        let bar = aggregator.update(&m5_bar(2, dec!(95))).unwrap().unwrap();
        assert_eq!(bar.timeframe, Timeframe::M15);
        assert_eq!(bar.open, dec!(100));
        assert_eq!(bar.high, dec!(107));
        assert_eq!(bar.low, dec!(93));
        assert_eq!(bar.close, dec!(95));
        assert_eq!(bar.volume, dec!(30));
    }

    #[test]
    fn gap_discards_partial() {
        let mut aggregator = BarAggregator::new(Timeframe::M5, Timeframe::M15).unwrap();
        aggregator.update(&m5_bar(0, dec!(100))).unwrap();
        // Bar 1 missing; bar 2 arrives mid-interval and is discarded.
        assert_eq!(aggregator.update(&m5_bar(2, dec!(95))).unwrap(), None);
        // The next full interval aggregates cleanly.
        aggregator.update(&m5_bar(3, dec!(90))).unwrap();
        aggregator.update(&m5_bar(4, dec!(91))).unwrap();
        let bar = aggregator.update(&m5_bar(5, dec!(92))).unwrap().unwrap();
        assert_eq!(bar.open, dec!(90));
        assert_eq!(bar.close, dec!(92));
    }

    #[test]
    fn mid_interval_start_is_ignored() {
        let mut aggregator = BarAggregator::new(Timeframe::M5, Timeframe::M15).unwrap();
        // First observed source bar is the middle of a target interval.
        assert_eq!(aggregator.update(&m5_bar(1, dec!(100))).unwrap(), None);
        assert_eq!(aggregator.update(&m5_bar(2, dec!(100))).unwrap(), None);
        // Only the next aligned interval emits.
        aggregator.update(&m5_bar(3, dec!(100))).unwrap();
        aggregator.update(&m5_bar(4, dec!(100))).unwrap();
        assert!(aggregator.update(&m5_bar(5, dec!(100))).unwrap().is_some());
    }

    #[test]
    fn incompatible_timeframes_rejected() {
        assert!(BarAggregator::new(Timeframe::M30, Timeframe::M15).is_err());
    }
}
