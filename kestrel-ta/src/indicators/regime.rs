use crate::{mean, stdev};
use rust_decimal::{Decimal, MathematicalOps};
use std::collections::VecDeque;

/// Hurst exponent estimated via rescaled-range (R/S) analysis over the
/// rolling window. Values above 0.5 indicate trending behaviour, below 0.5
/// mean reversion.
#[derive(Debug, Clone)]
pub struct HurstExponent {
    window: usize,
    closes: VecDeque<Decimal>,
}

impl HurstExponent {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(8),
            closes: VecDeque::new(),
        }
    }

    pub fn update(&mut self, close: Decimal) -> Option<Decimal> {
        self.closes.push_back(close);
        if self.closes.len() > self.window {
            self.closes.pop_front();
        }
        if self.closes.len() < self.window {
            return None;
        }
        self.value()
    }

    /// R/S estimate over lag halves: H = log(R/S) / log(n/2) averaged across
    /// two sub-window sizes to stabilise the estimate.
    pub fn value(&self) -> Option<Decimal> {
        let closes: Vec<Decimal> = self.closes.iter().copied().collect();
        let returns: Vec<Decimal> = closes.windows(2).map(|pair| pair[1] - pair[0]).collect();
        if returns.len() < 4 {
            return None;
        }

        let half = returns.len() / 2;
        let rs_full = rescaled_range(&returns)?;
        let rs_half_a = rescaled_range(&returns[..half])?;
        let rs_half_b = rescaled_range(&returns[half..])?;
        let rs_half = (rs_half_a + rs_half_b) / Decimal::from(2u64);
        if rs_full <= Decimal::ZERO || rs_half <= Decimal::ZERO {
            return None;
        }

        // H = log(RS_n / RS_{n/2}) / log(2)
        let ratio = rs_full / rs_half;
        let ln_ratio = ratio.ln();
        let ln_two = Decimal::TWO.ln();
        if ln_two.is_zero() {
            return None;
        }
        let hurst = ln_ratio / ln_two;
        Some(hurst.clamp(Decimal::ZERO, Decimal::ONE))
    }
}

fn rescaled_range(returns: &[Decimal]) -> Option<Decimal> {
    let mu = mean(returns)?;
    let mut cumulative = Decimal::ZERO;
    let mut max_dev = Decimal::MIN;
    let mut min_dev = Decimal::MAX;
    for ret in returns {
        cumulative += *ret - mu;
        max_dev = max_dev.max(cumulative);
        min_dev = min_dev.min(cumulative);
    }
    let range = max_dev - min_dev;
    let deviation = stdev(returns)?;
    if deviation.is_zero() {
        return None;
    }
    Some(range / deviation)
}

/// Percentile rank of the latest realized volatility within the lookback
/// window, in [0, 100].
#[derive(Debug, Clone)]
pub struct VolatilityPercentile {
    lookback: usize,
    volatilities: VecDeque<Decimal>,
}

impl VolatilityPercentile {
    pub fn new(lookback: usize) -> Self {
        Self {
            lookback: lookback.max(2),
            volatilities: VecDeque::new(),
        }
    }

    pub fn update(&mut self, volatility: Decimal) -> Option<Decimal> {
        self.volatilities.push_back(volatility);
        if self.volatilities.len() > self.lookback {
            self.volatilities.pop_front();
        }
        if self.volatilities.len() < self.lookback {
            return None;
        }
        let below = self
            .volatilities
            .iter()
            .filter(|value| **value < volatility)
            .count();
        Some(
            Decimal::from(below as u64) / Decimal::from(self.volatilities.len() as u64)
                * Decimal::from(100u64),
        )
    }
}
