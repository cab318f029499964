use derive_more::Display;
use kestrel_data::{Side, books::OrderBook};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Severity buckets for an estimated slippage fraction.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum SlippageSeverity {
    Low,
    Medium,
    High,
    Extreme,
}

/// Thresholds classifying a slippage fraction into severities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct SlippageThresholds {
    pub medium: Decimal,
    pub high: Decimal,
    pub extreme: Decimal,
    /// Above this fraction a single order should be split into slices.
    pub warn: Decimal,
}

impl Default for SlippageThresholds {
    fn default() -> Self {
        Self {
            medium: Decimal::new(5, 4),   // 0.05%
            high: Decimal::new(2, 3),     // 0.2%
            extreme: Decimal::new(1, 2),  // 1%
            warn: Decimal::new(1, 3),     // 0.1%
        }
    }
}

impl SlippageThresholds {
    pub fn classify(&self, slippage: Decimal) -> SlippageSeverity {
        if slippage >= self.extreme {
            SlippageSeverity::Extreme
        } else if slippage >= self.high {
            SlippageSeverity::High
        } else if slippage >= self.medium {
            SlippageSeverity::Medium
        } else {
            SlippageSeverity::Low
        }
    }
}

/// Result of walking the book for a taker order of a given size.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SlippageEstimate {
    /// Fraction of mid-price paid as impact, eg/ 0.002 = 20 bps.
    pub slippage: Decimal,
    pub severity: SlippageSeverity,
    /// Volume-weighted average fill price across consumed levels.
    pub average_price: Decimal,
    /// Price of the deepest level touched.
    pub worst_price: Decimal,
    pub levels_consumed: usize,
    pub quantity_filled: Decimal,
    /// True if the book ran out before the target size was reached.
    pub exhausted: bool,
}

impl SlippageEstimate {
    /// A single order should be split when its impact exceeds the warn
    /// threshold or the book cannot absorb it at all.
    pub fn suggest_split(&self, thresholds: &SlippageThresholds) -> bool {
        self.exhausted || self.slippage > thresholds.warn
    }
}

/// Walk the order book from the best level, accumulating quantity until
/// `quantity` is reached; the VWAP of consumed levels versus the mid-price
/// defines the estimate. An order larger than the visible book reports
/// `Extreme` severity with `exhausted` set.
pub fn estimate_slippage(
    book: &OrderBook,
    side: Side,
    quantity: Decimal,
    thresholds: &SlippageThresholds,
) -> Option<SlippageEstimate> {
    let mid = book.mid_price()?;
    if quantity <= Decimal::ZERO || mid.is_zero() {
        return None;
    }

    let mut remaining = quantity;
    let mut notional = Decimal::ZERO;
    let mut levels_consumed = 0usize;
    let mut worst_price = mid;

    for level in book.taker_levels(side) {
        if remaining <= Decimal::ZERO {
            break;
        }
        let take = remaining.min(level.amount);
        notional += take * level.price;
        remaining -= take;
        worst_price = level.price;
        levels_consumed += 1;
    }

    let quantity_filled = quantity - remaining;
    let exhausted = remaining > Decimal::ZERO;
    if quantity_filled.is_zero() {
        return Some(SlippageEstimate {
            slippage: Decimal::ONE,
            severity: SlippageSeverity::Extreme,
            average_price: mid,
            worst_price: mid,
            levels_consumed: 0,
            quantity_filled,
            exhausted: true,
        });
    }

    let average_price = notional / quantity_filled;
    let slippage = match side {
        Side::Buy => (average_price - mid) / mid,
        Side::Sell => (mid - average_price) / mid,
    }
    .max(Decimal::ZERO);

    let severity = if exhausted {
        SlippageSeverity::Extreme
    } else {
        thresholds.classify(slippage)
    };

    Some(SlippageEstimate {
        slippage,
        severity,
        average_price,
        worst_price,
        levels_consumed,
        quantity_filled,
        exhausted,
    })
}
