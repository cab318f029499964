use super::moving_average::{ExponentialMovingAverage, SimpleMovingAverage};
use crate::stdev;
use rust_decimal::Decimal;
use std::collections::VecDeque;

/// True range of a bar given the previous close.
pub fn true_range(high: Decimal, low: Decimal, prev_close: Decimal) -> Decimal {
    let hl = high - low;
    let hc = (high - prev_close).abs();
    let lc = (low - prev_close).abs();
    hl.max(hc).max(lc)
}

/// Average true range with Wilder smoothing.
#[derive(Debug, Clone)]
pub struct AverageTrueRange {
    period: usize,
    prev_close: Option<Decimal>,
    value: Option<Decimal>,
    seed: Decimal,
    samples: usize,
}

impl AverageTrueRange {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            prev_close: None,
            value: None,
            seed: Decimal::ZERO,
            samples: 0,
        }
    }

    pub fn update(&mut self, high: Decimal, low: Decimal, close: Decimal) -> Option<Decimal> {
        let Some(prev_close) = self.prev_close.replace(close) else {
            return None;
        };
        let tr = true_range(high, low, prev_close);
        let period = Decimal::from(self.period as u64);

        match self.value {
            None => {
                self.seed += tr;
                self.samples += 1;
                if self.samples >= self.period {
                    self.value = Some(self.seed / period);
                }
            }
            Some(atr) => {
                self.value = Some((atr * (period - Decimal::ONE) + tr) / period);
            }
        }
        self.value
    }

    pub fn value(&self) -> Option<Decimal> {
        self.value
    }
}

/// One Bollinger update: the band triple plus the normalised bandwidth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BollingerOutput {
    pub upper: Decimal,
    pub middle: Decimal,
    pub lower: Decimal,
    pub bandwidth: Decimal,
}

/// Bollinger bands around an SMA with a stdev multiplier.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    sma: SimpleMovingAverage,
    window: VecDeque<Decimal>,
    period: usize,
    multiplier: Decimal,
}

impl BollingerBands {
    pub fn new(period: usize, multiplier: Decimal) -> Self {
        Self {
            sma: SimpleMovingAverage::new(period),
            window: VecDeque::new(),
            period: period.max(1),
            multiplier,
        }
    }

    pub fn update(&mut self, close: Decimal) -> Option<BollingerOutput> {
        self.window.push_back(close);
        if self.window.len() > self.period {
            self.window.pop_front();
        }
        let middle = self.sma.update(close)?;
        let values: Vec<Decimal> = self.window.iter().copied().collect();
        let deviation = stdev(&values)?;
        let width = self.multiplier * deviation;
        let upper = middle + width;
        let lower = middle - width;
        let bandwidth = if middle.is_zero() {
            Decimal::ZERO
        } else {
            (upper - lower) / middle
        };
        Some(BollingerOutput {
            upper,
            middle,
            lower,
            bandwidth,
        })
    }
}

/// One Keltner update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeltnerOutput {
    pub upper: Decimal,
    pub middle: Decimal,
    pub lower: Decimal,
}

/// Keltner channels: EMA midline with ATR-scaled envelopes.
#[derive(Debug, Clone)]
pub struct KeltnerChannels {
    ema: ExponentialMovingAverage,
    atr: AverageTrueRange,
    multiplier: Decimal,
}

impl KeltnerChannels {
    pub fn new(ema_period: usize, atr_period: usize, multiplier: Decimal) -> Self {
        Self {
            ema: ExponentialMovingAverage::new(ema_period),
            atr: AverageTrueRange::new(atr_period),
            multiplier,
        }
    }

    pub fn update(&mut self, high: Decimal, low: Decimal, close: Decimal) -> Option<KeltnerOutput> {
        let middle = self.ema.update(close);
        let atr = self.atr.update(high, low, close)?;
        let width = self.multiplier * atr;
        Some(KeltnerOutput {
            upper: middle + width,
            middle,
            lower: middle - width,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn true_range_spans_gaps() {
        assert_eq!(true_range(dec!(11), dec!(10), dec!(8)), dec!(3));
        assert_eq!(true_range(dec!(11), dec!(10), dec!(12)), dec!(2));
    }

    #[test]
    fn atr_constant_range_converges() {
        let mut atr = AverageTrueRange::new(3);
        atr.update(dec!(11), dec!(10), dec!(10.5));
        for _ in 0..10 {
            atr.update(dec!(11), dec!(10), dec!(10.5));
        }
        assert_eq!(atr.value(), Some(dec!(1)));
    }

    #[test]
    fn bollinger_flat_series_zero_width() {
        let mut bands = BollingerBands::new(3, dec!(2));
        bands.update(dec!(10));
        bands.update(dec!(10));
        let out = bands.update(dec!(10)).unwrap();
        assert_eq!(out.upper, out.lower);
        assert_eq!(out.bandwidth, Decimal::ZERO);
    }

    #[test]
    fn keltner_brackets_midline() {
        let mut keltner = KeltnerChannels::new(3, 3, dec!(1.5));
        keltner.update(dec!(11), dec!(9), dec!(10));
        keltner.update(dec!(12), dec!(10), dec!(11));
        keltner.update(dec!(13), dec!(11), dec!(12));
        let out = keltner.update(dec!(14), dec!(12), dec!(13)).unwrap();
        assert!(out.upper > out.middle && out.middle > out.lower);
    }
}
