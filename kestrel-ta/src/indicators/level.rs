use rust_decimal::Decimal;

/// Classic floor-trader pivot points derived from the prior period's bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PivotPoints {
    pub pivot: Decimal,
    pub resistance_1: Decimal,
    pub resistance_2: Decimal,
    pub resistance_3: Decimal,
    pub support_1: Decimal,
    pub support_2: Decimal,
    pub support_3: Decimal,
}

impl PivotPoints {
    pub fn calculate(high: Decimal, low: Decimal, close: Decimal) -> Self {
        let pivot = (high + low + close) / Decimal::from(3u64);
        let range = high - low;
        let two = Decimal::from(2u64);
        Self {
            pivot,
            resistance_1: two * pivot - low,
            resistance_2: pivot + range,
            resistance_3: high + two * (pivot - low),
            support_1: two * pivot - high,
            support_2: pivot - range,
            support_3: low - two * (high - pivot),
        }
    }
}

/// Fibonacci retracement levels between a swing high and swing low.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FibonacciRetracement {
    pub levels: Vec<(Decimal, Decimal)>,
}

impl FibonacciRetracement {
    /// Standard ratios: 0.236, 0.382, 0.5, 0.618, 0.786.
    pub fn calculate(swing_high: Decimal, swing_low: Decimal) -> Self {
        let ratios = [
            Decimal::new(236, 3),
            Decimal::new(382, 3),
            Decimal::new(5, 1),
            Decimal::new(618, 3),
            Decimal::new(786, 3),
        ];
        let range = swing_high - swing_low;
        let levels = ratios
            .iter()
            .map(|ratio| (*ratio, swing_high - range * ratio))
            .collect();
        Self { levels }
    }

    /// Retracement level closest to `price`, if any levels exist.
    pub fn nearest(&self, price: Decimal) -> Option<(Decimal, Decimal)> {
        self.levels
            .iter()
            .copied()
            .min_by_key(|(_, level)| (*level - price).abs())
    }
}
