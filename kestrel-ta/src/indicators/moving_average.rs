use rust_decimal::Decimal;
use std::collections::VecDeque;

/// Simple moving average indicator.
#[derive(Debug, Clone)]
pub struct SimpleMovingAverage {
    period: usize,
    values: VecDeque<Decimal>,
    sum: Decimal,
}

impl SimpleMovingAverage {
    /// Create a new SMA with the given period.
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            values: VecDeque::new(),
            sum: Decimal::ZERO,
        }
    }

    /// Update the SMA with a new value and return the latest average, if the
    /// window is full.
    pub fn update(&mut self, value: Decimal) -> Option<Decimal> {
        self.values.push_back(value);
        self.sum += value;
        if self.values.len() > self.period {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.value()
    }

    /// Current average over the full window, `None` until warm.
    pub fn value(&self) -> Option<Decimal> {
        if self.values.len() < self.period {
            None
        } else {
            Some(self.sum / Decimal::from(self.values.len() as u64))
        }
    }

    /// Average of whatever has been seen so far, zero when empty.
    pub fn partial(&self) -> Decimal {
        if self.values.is_empty() {
            Decimal::ZERO
        } else {
            self.sum / Decimal::from(self.values.len() as u64)
        }
    }

    pub fn is_warm(&self) -> bool {
        self.values.len() >= self.period
    }
}

/// Exponential moving average indicator.
#[derive(Debug, Clone)]
pub struct ExponentialMovingAverage {
    multiplier: Decimal,
    value: Option<Decimal>,
}

impl ExponentialMovingAverage {
    /// Create a new EMA with the given period.
    pub fn new(period: usize) -> Self {
        let multiplier = Decimal::from(2u64) / Decimal::from(period.max(1) as u64 + 1);
        Self {
            multiplier,
            value: None,
        }
    }

    /// Update the EMA with a new price and return the latest value.
    pub fn update(&mut self, price: Decimal) -> Decimal {
        match self.value {
            Some(val) => {
                let next = (price - val) * self.multiplier + val;
                self.value = Some(next);
                next
            }
            None => {
                self.value = Some(price);
                price
            }
        }
    }

    /// Current EMA value if initialised.
    pub fn value(&self) -> Option<Decimal> {
        self.value
    }
}

/// Weighted moving average with linearly decaying weights (newest heaviest).
#[derive(Debug, Clone)]
pub struct WeightedMovingAverage {
    period: usize,
    values: VecDeque<Decimal>,
}

impl WeightedMovingAverage {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            values: VecDeque::new(),
        }
    }

    pub fn update(&mut self, value: Decimal) -> Option<Decimal> {
        self.values.push_back(value);
        if self.values.len() > self.period {
            self.values.pop_front();
        }
        self.value()
    }

    pub fn value(&self) -> Option<Decimal> {
        if self.values.len() < self.period {
            return None;
        }
        let mut numerator = Decimal::ZERO;
        let mut denominator = Decimal::ZERO;
        for (i, value) in self.values.iter().enumerate() {
            let weight = Decimal::from(i as u64 + 1);
            numerator += *value * weight;
            denominator += weight;
        }
        Some(numerator / denominator)
    }
}

/// Volume weighted moving average over a rolling window of (price, volume).
#[derive(Debug, Clone)]
pub struct VolumeWeightedMovingAverage {
    period: usize,
    window: VecDeque<(Decimal, Decimal)>,
}

impl VolumeWeightedMovingAverage {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            window: VecDeque::new(),
        }
    }

    pub fn update(&mut self, price: Decimal, volume: Decimal) -> Option<Decimal> {
        self.window.push_back((price, volume));
        if self.window.len() > self.period {
            self.window.pop_front();
        }
        self.value()
    }

    pub fn value(&self) -> Option<Decimal> {
        if self.window.len() < self.period {
            return None;
        }
        let total_volume: Decimal = self.window.iter().map(|(_, v)| *v).sum();
        if total_volume.is_zero() {
            // Volumeless window degrades to an arithmetic mean.
            let sum: Decimal = self.window.iter().map(|(p, _)| *p).sum();
            return Some(sum / Decimal::from(self.window.len() as u64));
        }
        let weighted: Decimal = self.window.iter().map(|(p, v)| *p * *v).sum();
        Some(weighted / total_volume)
    }
}
