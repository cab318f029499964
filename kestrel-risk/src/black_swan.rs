use crate::breaker::BreakerLevel;
use chrono::{DateTime, Duration, Utc};
use kestrel_data::books::OrderBook;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Black-swan detector tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlackSwanConfig {
    /// Window over which price velocity is measured.
    pub window: Duration,
    /// Price move per minute must exceed `atr_multiple` x ATR-per-minute to
    /// arm.
    pub atr_multiple: Decimal,
    /// Book depth collapse fraction (vs the rolling reference) that arms.
    pub depth_collapse_pct: Decimal,
    /// Cross-venue divergence fraction that arms.
    pub venue_divergence_pct: Decimal,
    /// Price back within this many ATRs of the window mean counts as calm.
    pub calm_atr_multiple: Decimal,
}

impl Default for BlackSwanConfig {
    fn default() -> Self {
        Self {
            window: Duration::minutes(2),
            atr_multiple: Decimal::from(3u64),
            depth_collapse_pct: Decimal::new(7, 1),
            venue_divergence_pct: Decimal::new(2, 2),
            calm_atr_multiple: Decimal::ONE,
        }
    }
}

/// What tripped the detector.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwanTrigger {
    PriceVelocity {
        move_pct: Decimal,
        atr_pct: Decimal,
    },
    DepthCollapse {
        reference: Decimal,
        current: Decimal,
    },
    VenueDivergence {
        spread_pct: Decimal,
    },
}

impl SwanTrigger {
    /// The breaker level this trigger arms. Velocity shocks halt opens and
    /// clear working orders; a venue split is a warning until corroborated.
    pub fn level(&self) -> BreakerLevel {
        match self {
            SwanTrigger::PriceVelocity { .. } => BreakerLevel::L2,
            SwanTrigger::DepthCollapse { .. } => BreakerLevel::L2,
            SwanTrigger::VenueDivergence { .. } => BreakerLevel::L1,
        }
    }
}

/// Watches one symbol for discontinuous conditions: flash moves measured
/// against ATR, order book evaporation, and venue price divergence. Each
/// check independently arms a circuit-breaker level.
#[derive(Debug, Clone)]
pub struct BlackSwanDetector {
    config: BlackSwanConfig,
    prices: VecDeque<(DateTime<Utc>, Decimal)>,
    depth_reference: Option<Decimal>,
}

impl BlackSwanDetector {
    pub fn new(config: BlackSwanConfig) -> Self {
        Self {
            config,
            prices: VecDeque::new(),
            depth_reference: None,
        }
    }

    /// Record a price observation and check the velocity rule.
    /// `atr_pct` is the ATR as a fraction of price (per bar of the feed
    /// timeframe, normalised per minute by the caller's bar interval).
    pub fn on_price(
        &mut self,
        time: DateTime<Utc>,
        price: Decimal,
        atr_pct: Decimal,
    ) -> Option<SwanTrigger> {
        self.prices.push_back((time, price));
        let horizon = time - self.config.window;
        while let Some((oldest, _)) = self.prices.front() {
            if *oldest < horizon {
                self.prices.pop_front();
            } else {
                break;
            }
        }

        let (start_time, start_price) = *self.prices.front()?;
        if start_price.is_zero() || start_time == time {
            return None;
        }
        let move_pct = ((price - start_price) / start_price).abs();
        let window_minutes = Decimal::from(((time - start_time).num_seconds().max(1)) as u64)
            / Decimal::from(60u64);
        let velocity = move_pct / window_minutes;

        if atr_pct > Decimal::ZERO && velocity > self.config.atr_multiple * atr_pct {
            return Some(SwanTrigger::PriceVelocity { move_pct, atr_pct });
        }
        None
    }

    /// Check book depth against the rolling reference.
    pub fn on_book(&mut self, book: &OrderBook) -> Option<SwanTrigger> {
        let depth = book.depth(kestrel_data::Side::Buy) + book.depth(kestrel_data::Side::Sell);
        let Some(reference) = self.depth_reference else {
            self.depth_reference = Some(depth);
            return None;
        };

        // Slow reference update so a collapse stays visible.
        let updated = (reference * Decimal::new(95, 2)) + (depth * Decimal::new(5, 2));
        self.depth_reference = Some(updated);

        if reference.is_zero() {
            return None;
        }
        let collapse = (reference - depth) / reference;
        if collapse >= self.config.depth_collapse_pct {
            return Some(SwanTrigger::DepthCollapse {
                reference,
                current: depth,
            });
        }
        None
    }

    /// Compare the same symbol's price across venues.
    pub fn on_venue_prices(&self, prices: &[Decimal]) -> Option<SwanTrigger> {
        let (min, max) = prices
            .iter()
            .fold(None, |acc: Option<(Decimal, Decimal)>, price| {
                Some(match acc {
                    None => (*price, *price),
                    Some((min, max)) => (min.min(*price), max.max(*price)),
                })
            })?;
        if min.is_zero() {
            return None;
        }
        let spread_pct = (max - min) / min;
        if spread_pct >= self.config.venue_divergence_pct {
            return Some(SwanTrigger::VenueDivergence { spread_pct });
        }
        None
    }

    /// Calm when the latest price sits within `calm_atr_multiple` ATRs of
    /// the window mean. Drives breaker de-escalation.
    pub fn is_calm(&self, atr_pct: Decimal) -> bool {
        let count = self.prices.len();
        if count < 2 || atr_pct <= Decimal::ZERO {
            return true;
        }
        let mean: Decimal =
            self.prices.iter().map(|(_, p)| *p).sum::<Decimal>() / Decimal::from(count as u64);
        let Some((_, last)) = self.prices.back() else {
            return true;
        };
        if mean.is_zero() {
            return true;
        }
        ((*last - mean) / mean).abs() <= self.config.calm_atr_multiple * atr_pct
    }
}

impl Default for BlackSwanDetector {
    fn default() -> Self {
        Self::new(BlackSwanConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn flash_crash_arms_l2() {
        let mut detector = BlackSwanDetector::default();
        // 0.5% ATR; an 8% drop in two minutes is far beyond 3x ATR/min.
        let atr_pct = dec!(0.005);
        assert_eq!(detector.on_price(at(0), dec!(50000), atr_pct), None);
        let trigger = detector
            .on_price(at(120), dec!(46000), atr_pct)
            .expect("velocity trigger");
        assert_eq!(trigger.level(), BreakerLevel::L2);
        assert!(!detector.is_calm(atr_pct));
    }

    #[test]
    fn slow_drift_stays_quiet() {
        let mut detector = BlackSwanDetector::default();
        let atr_pct = dec!(0.005);
        detector.on_price(at(0), dec!(50000), atr_pct);
        assert_eq!(detector.on_price(at(60), dec!(50050), atr_pct), None);
        assert_eq!(detector.on_price(at(120), dec!(50100), atr_pct), None);
        assert!(detector.is_calm(atr_pct));
    }

    #[test]
    fn depth_collapse_detected() {
        let mut detector = BlackSwanDetector::default();
        let book = |amount: Decimal| {
            OrderBook::new(
                kestrel_data::Symbol::new("BTC/USDT"),
                at(0),
                1,
                vec![kestrel_data::books::Level::new(dec!(49990), amount)],
                vec![kestrel_data::books::Level::new(dec!(50010), amount)],
            )
            .unwrap()
        };
        assert_eq!(detector.on_book(&book(dec!(100))), None);
        let trigger = detector.on_book(&book(dec!(5))).expect("collapse");
        assert!(matches!(trigger, SwanTrigger::DepthCollapse { .. }));
    }

    #[test]
    fn venue_divergence_is_a_warning() {
        let detector = BlackSwanDetector::default();
        let trigger = detector
            .on_venue_prices(&[dec!(50000), dec!(51500)])
            .expect("divergence");
        assert_eq!(trigger.level(), BreakerLevel::L1);
        assert_eq!(detector.on_venue_prices(&[dec!(50000), dec!(50100)]), None);
    }
}
