use super::moving_average::ExponentialMovingAverage;
use rust_decimal::Decimal;

/// MACD line, signal line and histogram for one update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MacdOutput {
    pub macd: Decimal,
    pub signal: Decimal,
    pub histogram: Decimal,
}

/// Moving average convergence divergence built from three EMAs.
#[derive(Debug, Clone)]
pub struct Macd {
    fast: ExponentialMovingAverage,
    slow: ExponentialMovingAverage,
    signal: ExponentialMovingAverage,
    slow_period: usize,
    samples: usize,
}

impl Macd {
    pub fn new(fast_period: usize, slow_period: usize, signal_period: usize) -> Self {
        Self {
            fast: ExponentialMovingAverage::new(fast_period),
            slow: ExponentialMovingAverage::new(slow_period),
            signal: ExponentialMovingAverage::new(signal_period),
            slow_period,
            samples: 0,
        }
    }

    pub fn update(&mut self, close: Decimal) -> Option<MacdOutput> {
        let fast = self.fast.update(close);
        let slow = self.slow.update(close);
        let macd = fast - slow;
        let signal = self.signal.update(macd);
        self.samples += 1;
        if self.samples < self.slow_period {
            return None;
        }
        Some(MacdOutput {
            macd,
            signal,
            histogram: macd - signal,
        })
    }
}

/// Average directional index with Wilder smoothing of +DI/-DI.
#[derive(Debug, Clone)]
pub struct AverageDirectionalIndex {
    period: usize,
    previous: Option<(Decimal, Decimal, Decimal)>,
    smooth_tr: Decimal,
    smooth_plus_dm: Decimal,
    smooth_minus_dm: Decimal,
    adx: Option<Decimal>,
    dx_seed: Decimal,
    samples: usize,
}

impl AverageDirectionalIndex {
    pub fn new(period: usize) -> Self {
        Self {
            period: period.max(1),
            previous: None,
            smooth_tr: Decimal::ZERO,
            smooth_plus_dm: Decimal::ZERO,
            smooth_minus_dm: Decimal::ZERO,
            adx: None,
            dx_seed: Decimal::ZERO,
            samples: 0,
        }
    }

    pub fn update(&mut self, high: Decimal, low: Decimal, close: Decimal) -> Option<Decimal> {
        let Some((prev_high, prev_low, prev_close)) = self.previous.replace((high, low, close))
        else {
            return None;
        };

        let up_move = high - prev_high;
        let down_move = prev_low - low;
        let plus_dm = if up_move > down_move && up_move > Decimal::ZERO {
            up_move
        } else {
            Decimal::ZERO
        };
        let minus_dm = if down_move > up_move && down_move > Decimal::ZERO {
            down_move
        } else {
            Decimal::ZERO
        };
        let tr = super::volatility::true_range(high, low, prev_close);
        let period = Decimal::from(self.period as u64);

        self.samples += 1;
        if self.samples <= self.period {
            self.smooth_tr += tr;
            self.smooth_plus_dm += plus_dm;
            self.smooth_minus_dm += minus_dm;
        } else {
            self.smooth_tr = self.smooth_tr - self.smooth_tr / period + tr;
            self.smooth_plus_dm = self.smooth_plus_dm - self.smooth_plus_dm / period + plus_dm;
            self.smooth_minus_dm = self.smooth_minus_dm - self.smooth_minus_dm / period + minus_dm;
        }
        if self.samples < self.period || self.smooth_tr.is_zero() {
            return None;
        }

        let plus_di = self.smooth_plus_dm / self.smooth_tr * Decimal::from(100u64);
        let minus_di = self.smooth_minus_dm / self.smooth_tr * Decimal::from(100u64);
        let di_sum = plus_di + minus_di;
        let dx = if di_sum.is_zero() {
            Decimal::ZERO
        } else {
            (plus_di - minus_di).abs() / di_sum * Decimal::from(100u64)
        };

        // The ADX line seeds from the first `period` DX values, then smooths.
        match self.adx {
            None => {
                self.dx_seed += dx;
                if self.samples >= self.period * 2 {
                    self.adx = Some(self.dx_seed / period);
                }
            }
            Some(adx) => {
                self.adx = Some((adx * (period - Decimal::ONE) + dx) / period);
            }
        }
        self.adx
    }
}

/// Parabolic stop-and-reverse.
#[derive(Debug, Clone)]
pub struct ParabolicSar {
    acceleration: Decimal,
    max_acceleration: Decimal,
    step: Decimal,
    state: Option<SarState>,
}

#[derive(Debug, Clone)]
struct SarState {
    sar: Decimal,
    extreme: Decimal,
    acceleration: Decimal,
    long: bool,
    prev_low: Decimal,
    prev_high: Decimal,
}

impl ParabolicSar {
    pub fn new(step: Decimal, max_acceleration: Decimal) -> Self {
        Self {
            acceleration: step,
            max_acceleration,
            step,
            state: None,
        }
    }

    /// Update with a bar's high/low; returns the SAR level once seeded.
    pub fn update(&mut self, high: Decimal, low: Decimal) -> Option<Decimal> {
        let state = match &mut self.state {
            None => {
                self.state = Some(SarState {
                    sar: low,
                    extreme: high,
                    acceleration: self.acceleration,
                    long: true,
                    prev_low: low,
                    prev_high: high,
                });
                return None;
            }
            Some(state) => state,
        };

        let mut sar = state.sar + state.acceleration * (state.extreme - state.sar);
        if state.long {
            // SAR may never rise above the prior two lows.
            sar = sar.min(state.prev_low).min(low);
            if low < sar {
                // Reversal to short.
                sar = state.extreme;
                state.long = false;
                state.extreme = low;
                state.acceleration = self.step;
            } else if high > state.extreme {
                state.extreme = high;
                state.acceleration =
                    (state.acceleration + self.step).min(self.max_acceleration);
            }
        } else {
            sar = sar.max(state.prev_high).max(high);
            if high > sar {
                sar = state.extreme;
                state.long = true;
                state.extreme = high;
                state.acceleration = self.step;
            } else if low < state.extreme {
                state.extreme = low;
                state.acceleration =
                    (state.acceleration + self.step).min(self.max_acceleration);
            }
        }

        state.sar = sar;
        state.prev_low = low;
        state.prev_high = high;
        Some(sar)
    }

    pub fn is_long(&self) -> Option<bool> {
        self.state.as_ref().map(|state| state.long)
    }
}
