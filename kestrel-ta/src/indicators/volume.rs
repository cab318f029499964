use rust_decimal::Decimal;
use std::collections::VecDeque;

/// On-balance volume: cumulative volume signed by close direction.
#[derive(Debug, Clone, Default)]
pub struct OnBalanceVolume {
    previous_close: Option<Decimal>,
    value: Decimal,
}

impl OnBalanceVolume {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, close: Decimal, volume: Decimal) -> Decimal {
        if let Some(previous) = self.previous_close.replace(close) {
            if close > previous {
                self.value += volume;
            } else if close < previous {
                self.value -= volume;
            }
        }
        self.value
    }

    pub fn value(&self) -> Decimal {
        self.value
    }
}

/// Money flow index: volume-weighted RSI analogue over typical price.
#[derive(Debug, Clone)]
pub struct MoneyFlowIndex {
    period: usize,
    previous_typical: Option<Decimal>,
    flows: VecDeque<Decimal>,
}

impl MoneyFlowIndex {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            previous_typical: None,
            flows: VecDeque::new(),
        }
    }

    pub fn update(
        &mut self,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Option<Decimal> {
        let typical = (high + low + close) / Decimal::from(3u64);
        let raw_flow = typical * volume;
        let Some(previous) = self.previous_typical.replace(typical) else {
            return None;
        };

        let signed = if typical > previous {
            raw_flow
        } else if typical < previous {
            -raw_flow
        } else {
            Decimal::ZERO
        };
        self.flows.push_back(signed);
        if self.flows.len() > self.period {
            self.flows.pop_front();
        }
        if self.flows.len() < self.period {
            return None;
        }

        let positive: Decimal = self
            .flows
            .iter()
            .filter(|flow| flow.is_sign_positive() && !flow.is_zero())
            .copied()
            .sum();
        let negative: Decimal = self
            .flows
            .iter()
            .filter(|flow| flow.is_sign_negative())
            .map(|flow| -*flow)
            .sum();
        if negative.is_zero() {
            return Some(Decimal::from(100u64));
        }
        let ratio = positive / negative;
        Some(Decimal::from(100u64) - Decimal::from(100u64) / (Decimal::ONE + ratio))
    }
}

/// Volume rate of change versus the volume `period` bars ago.
#[derive(Debug, Clone)]
pub struct VolumeRateOfChange {
    period: usize,
    volumes: VecDeque<Decimal>,
}

impl VolumeRateOfChange {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            volumes: VecDeque::new(),
        }
    }

    pub fn update(&mut self, volume: Decimal) -> Option<Decimal> {
        self.volumes.push_back(volume);
        if self.volumes.len() > self.period + 1 {
            self.volumes.pop_front();
        }
        if self.volumes.len() < self.period + 1 {
            return None;
        }
        let oldest = *self.volumes.front()?;
        if oldest.is_zero() {
            return None;
        }
        Some((volume - oldest) / oldest * Decimal::from(100u64))
    }
}
