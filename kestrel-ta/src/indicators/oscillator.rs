use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Relative strength index over Wilder-smoothed gains and losses.
#[derive(Debug, Clone)]
pub struct RelativeStrengthIndex {
    period: usize,
    previous: Option<Decimal>,
    avg_gain: Decimal,
    avg_loss: Decimal,
    samples: usize,
}

impl RelativeStrengthIndex {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            previous: None,
            avg_gain: Decimal::ZERO,
            avg_loss: Decimal::ZERO,
            samples: 0,
        }
    }

    pub fn update(&mut self, close: Decimal) -> Option<Decimal> {
        let Some(previous) = self.previous.replace(close) else {
            return None;
        };

        let change = close - previous;
        let gain = change.max(Decimal::ZERO);
        let loss = (-change).max(Decimal::ZERO);
        let period = Decimal::from(self.period as u64);

        if self.samples < self.period {
            // Accumulate the seed averages over the first full period.
            self.avg_gain += gain / period;
            self.avg_loss += loss / period;
            self.samples += 1;
            if self.samples < self.period {
                return None;
            }
        } else {
            self.avg_gain = (self.avg_gain * (period - Decimal::ONE) + gain) / period;
            self.avg_loss = (self.avg_loss * (period - Decimal::ONE) + loss) / period;
        }

        Some(self.value())
    }

    fn value(&self) -> Decimal {
        if self.avg_loss.is_zero() {
            return Decimal::from(100u64);
        }
        let rs = self.avg_gain / self.avg_loss;
        Decimal::from(100u64) - Decimal::from(100u64) / (Decimal::ONE + rs)
    }
}

/// Fast stochastic oscillator (%K with an SMA-smoothed %D).
#[derive(Debug, Clone)]
pub struct StochasticOscillator {
    period: usize,
    smoothing: usize,
    highs: VecDeque<Decimal>,
    lows: VecDeque<Decimal>,
    percent_k_window: VecDeque<Decimal>,
}

impl StochasticOscillator {
    pub fn new(period: usize, smoothing: usize) -> Self {
        Self {
            period: period.max(1),
            smoothing: smoothing.max(1),
            highs: VecDeque::new(),
            lows: VecDeque::new(),
            percent_k_window: VecDeque::new(),
        }
    }

    /// Returns `(percent_k, percent_d)` once both windows are warm.
    pub fn update(
        &mut self,
        high: Decimal,
        low: Decimal,
        close: Decimal,
    ) -> Option<(Decimal, Decimal)> {
        push_window(&mut self.highs, high, self.period);
        push_window(&mut self.lows, low, self.period);
        if self.highs.len() < self.period {
            return None;
        }

        let highest = self.highs.iter().copied().max()?;
        let lowest = self.lows.iter().copied().min()?;
        let range = highest - lowest;
        let percent_k = if range.is_zero() {
            Decimal::from(50u64)
        } else {
            (close - lowest) / range * Decimal::from(100u64)
        };

        push_window(&mut self.percent_k_window, percent_k, self.smoothing);
        if self.percent_k_window.len() < self.smoothing {
            return None;
        }
        let percent_d = self.percent_k_window.iter().copied().sum::<Decimal>()
            / Decimal::from(self.percent_k_window.len() as u64);

        Some((percent_k, percent_d))
    }
}

/// Williams %R: inverted stochastic scaled to [-100, 0].
#[derive(Debug, Clone)]
pub struct WilliamsPercentR {
    period: usize,
    highs: VecDeque<Decimal>,
    lows: VecDeque<Decimal>,
}

impl WilliamsPercentR {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            highs: VecDeque::new(),
            lows: VecDeque::new(),
        }
    }

    pub fn update(&mut self, high: Decimal, low: Decimal, close: Decimal) -> Option<Decimal> {
        push_window(&mut self.highs, high, self.period);
        push_window(&mut self.lows, low, self.period);
        if self.highs.len() < self.period {
            return None;
        }
        let highest = self.highs.iter().copied().max()?;
        let lowest = self.lows.iter().copied().min()?;
        let range = highest - lowest;
        if range.is_zero() {
            return Some(Decimal::from(-50i64));
        }
        Some((highest - close) / range * Decimal::from(-100i64))
    }
}

/// Commodity channel index over typical price deviation.
#[derive(Debug, Clone)]
pub struct CommodityChannelIndex {
    period: usize,
    typical: VecDeque<Decimal>,
}

impl CommodityChannelIndex {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            typical: VecDeque::new(),
        }
    }

    pub fn update(&mut self, high: Decimal, low: Decimal, close: Decimal) -> Option<Decimal> {
        let typical = (high + low + close) / Decimal::from(3u64);
        push_window(&mut self.typical, typical, self.period);
        if self.typical.len() < self.period {
            return None;
        }

        let count = Decimal::from(self.typical.len() as u64);
        let mean = self.typical.iter().copied().sum::<Decimal>() / count;
        let mean_deviation = self
            .typical
            .iter()
            .map(|value| (*value - mean).abs())
            .sum::<Decimal>()
            / count;
        if mean_deviation.is_zero() {
            return Some(Decimal::ZERO);
        }

        // Lambert's 0.015 scaling constant.
        let scale = Decimal::new(15, 3);
        Some((typical - mean) / (scale * mean_deviation))
    }
}

/// Price momentum: difference between the latest close and the close
/// `period` bars ago.
#[derive(Debug, Clone)]
pub struct Momentum {
    period: usize,
    closes: VecDeque<Decimal>,
}

impl Momentum {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            closes: VecDeque::new(),
        }
    }

    pub fn update(&mut self, close: Decimal) -> Option<Decimal> {
        self.closes.push_back(close);
        if self.closes.len() > self.period + 1 {
            self.closes.pop_front();
        }
        if self.closes.len() < self.period + 1 {
            return None;
        }
        let oldest = *self.closes.front()?;
        Some(close - oldest)
    }
}

/// Rate of change expressed as a percentage of the close `period` bars ago.
#[derive(Debug, Clone)]
pub struct RateOfChange {
    period: usize,
    closes: VecDeque<Decimal>,
}

impl RateOfChange {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            closes: VecDeque::new(),
        }
    }

    pub fn update(&mut self, close: Decimal) -> Option<Decimal> {
        self.closes.push_back(close);
        if self.closes.len() > self.period + 1 {
            self.closes.pop_front();
        }
        if self.closes.len() < self.period + 1 {
            return None;
        }
        let oldest = *self.closes.front()?;
        if oldest.is_zero() {
            return None;
        }
        Some((close - oldest) / oldest * Decimal::from(100u64))
    }
}

fn push_window(window: &mut VecDeque<Decimal>, value: Decimal, capacity: usize) {
    window.push_back(value);
    if window.len() > capacity {
        window.pop_front();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rsi_all_gains_is_100() {
        let mut rsi = RelativeStrengthIndex::new(3);
        rsi.update(dec!(1));
        rsi.update(dec!(2));
        rsi.update(dec!(3));
        let value = rsi.update(dec!(4)).unwrap();
        assert_eq!(value, dec!(100));
    }

    #[test]
    fn rsi_warmup_yields_none() {
        let mut rsi = RelativeStrengthIndex::new(14);
        for i in 0..14 {
            assert_eq!(rsi.update(Decimal::from(i)), None);
        }
        assert!(rsi.update(dec!(20)).is_some());
    }

    #[test]
    fn stochastic_bounds() {
        let mut stoch = StochasticOscillator::new(3, 1);
        stoch.update(dec!(10), dec!(8), dec!(9));
        stoch.update(dec!(11), dec!(9), dec!(10));
        let (k, d) = stoch.update(dec!(12), dec!(10), dec!(12)).unwrap();
        assert_eq!(k, dec!(100));
        assert_eq!(d, dec!(100));
    }

    #[test]
    fn williams_r_low_close_near_minus_100() {
        let mut wr = WilliamsPercentR::new(2);
        wr.update(dec!(10), dec!(8), dec!(9));
        let value = wr.update(dec!(10), dec!(8), dec!(8)).unwrap();
        assert_eq!(value, dec!(-100));
    }

    #[test]
    fn momentum_and_roc() {
        let mut momentum = Momentum::new(2);
        let mut roc = RateOfChange::new(2);
        momentum.update(dec!(100));
        roc.update(dec!(100));
        momentum.update(dec!(105));
        roc.update(dec!(105));
        assert_eq!(momentum.update(dec!(110)), Some(dec!(10)));
        assert_eq!(roc.update(dec!(110)), Some(dec!(10)));
    }
}
