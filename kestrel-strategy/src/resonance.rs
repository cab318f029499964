use crate::{
    Strategy,
    config::{ConfigError, ExitConfig, Validate, parse_params, require},
    signal::{Signal, SignalIntent},
};
use kestrel_data::{Side, bar::{Bar, Timeframe}};
use kestrel_execution::order::StrategyId;
use kestrel_ta::{
    indicators::{RelativeStrengthIndex, SimpleMovingAverage},
    patterns::{Cross, CrossDetector},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Multi-timeframe resonance parameters: trend on the slow stream, pullback
/// on the middle one, trigger on the fast one.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ResonanceConfig {
    #[serde(default = "default_trend_tf")]
    pub trend_timeframe: Timeframe,
    #[serde(default = "default_pullback_tf")]
    pub pullback_timeframe: Timeframe,
    #[serde(default = "default_trigger_tf")]
    pub trigger_timeframe: Timeframe,
    #[serde(default = "default_trend_period")]
    pub trend_period: usize,
    #[serde(default = "default_pullback_period")]
    pub pullback_rsi_period: usize,
    #[serde(default = "default_pullback_threshold")]
    pub pullback_threshold: Decimal,
    #[serde(default = "default_trigger_fast")]
    pub trigger_fast: usize,
    #[serde(default = "default_trigger_slow")]
    pub trigger_slow: usize,
    #[serde(default)]
    pub exits: ExitConfig,
}

fn default_trend_tf() -> Timeframe {
    Timeframe::H1
}
fn default_pullback_tf() -> Timeframe {
    Timeframe::M15
}
fn default_trigger_tf() -> Timeframe {
    Timeframe::M5
}
fn default_trend_period() -> usize {
    20
}
fn default_pullback_period() -> usize {
    14
}
fn default_pullback_threshold() -> Decimal {
    Decimal::from(40u64)
}
fn default_trigger_fast() -> usize {
    5
}
fn default_trigger_slow() -> usize {
    10
}

impl Validate for ResonanceConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require(
            self.trigger_timeframe.divides(self.pullback_timeframe),
            "trigger timeframe must divide pullback timeframe",
        )?;
        require(
            self.pullback_timeframe.divides(self.trend_timeframe),
            "pullback timeframe must divide trend timeframe",
        )?;
        require(self.trend_period >= 2, "trend_period must be >= 2")?;
        require(
            self.trigger_fast < self.trigger_slow,
            "trigger_fast must be < trigger_slow",
        )?;
        self.exits.validate()
    }
}

/// Three-stream confluence: only trades the fast trigger when the slow
/// stream trends up and the middle stream shows a pullback. The runtime
/// feeds this strategy every subscribed timeframe of the symbol; bars are
/// routed internally by `bar.timeframe`.
#[derive(Debug)]
pub struct ResonanceStrategy {
    id: StrategyId,
    config: ResonanceConfig,
    trend_sma: SimpleMovingAverage,
    trend_up: bool,
    pullback_rsi: RelativeStrengthIndex,
    pulled_back: bool,
    trigger_fast: SimpleMovingAverage,
    trigger_slow: SimpleMovingAverage,
    trigger_cross: CrossDetector,
    in_position: bool,
    sequence: u64,
}

impl ResonanceStrategy {
    pub const NAME: &'static str = "mtf_resonance";

    pub fn new(id: StrategyId, config: ResonanceConfig) -> Self {
        Self {
            id,
            trend_sma: SimpleMovingAverage::new(config.trend_period),
            trend_up: false,
            pullback_rsi: RelativeStrengthIndex::new(config.pullback_rsi_period),
            pulled_back: false,
            trigger_fast: SimpleMovingAverage::new(config.trigger_fast),
            trigger_slow: SimpleMovingAverage::new(config.trigger_slow),
            trigger_cross: CrossDetector::new(),
            in_position: false,
            sequence: 0,
            config,
        }
    }

    pub fn factory(params: &serde_json::Value) -> Result<Box<dyn Strategy>, ConfigError> {
        let config: ResonanceConfig = parse_params(params)?;
        Ok(Box::new(Self::new(StrategyId::new(Self::NAME), config)))
    }
}

impl Strategy for ResonanceStrategy {
    fn on_bar(&mut self, bar: &Bar) -> Vec<Signal> {
        if bar.timeframe == self.config.trend_timeframe {
            if let Some(sma) = self.trend_sma.update(bar.close) {
                self.trend_up = bar.close > sma;
                if !self.trend_up {
                    self.pulled_back = false;
                }
            }
            return Vec::new();
        }

        if bar.timeframe == self.config.pullback_timeframe {
            if let Some(rsi) = self.pullback_rsi.update(bar.close) {
                if self.trend_up && rsi <= self.config.pullback_threshold {
                    self.pulled_back = true;
                }
            }
            return Vec::new();
        }

        if bar.timeframe != self.config.trigger_timeframe {
            return Vec::new();
        }

        let fast = self.trigger_fast.update(bar.close);
        let slow = self.trigger_slow.update(bar.close);
        let (Some(fast), Some(slow)) = (fast, slow) else {
            return Vec::new();
        };
        let cross = self.trigger_cross.update(fast, slow);

        if !self.in_position
            && self.trend_up
            && self.pulled_back
            && cross == Some(Cross::Above)
        {
            self.in_position = true;
            self.pulled_back = false;
            self.sequence += 1;
            let mut signal = Signal::market(
                self.id.clone(),
                bar.symbol.clone(),
                Side::Buy,
                SignalIntent::Open,
                bar.time,
                self.sequence,
            );
            if let Some(stop_pct) = self.config.exits.stop_loss_pct {
                signal = signal.with_stop_loss(bar.close * (Decimal::ONE - stop_pct));
            }
            return vec![signal];
        }

        // Trend rollover or fast cross down closes the position.
        if self.in_position && (!self.trend_up || cross == Some(Cross::Below)) {
            self.in_position = false;
            self.sequence += 1;
            return vec![Signal::market(
                self.id.clone(),
                bar.symbol.clone(),
                Side::Sell,
                SignalIntent::Close,
                bar.time,
                self.sequence,
            )];
        }
        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use kestrel_data::Symbol;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn bar(timeframe: Timeframe, index: i64, close: Decimal) -> Bar {
        let step = timeframe.seconds();
        Bar::new(
            Symbol::new("BTC/USDT"),
            timeframe,
            DateTime::from_timestamp(index * step, 0).unwrap(),
            close,
            close + dec!(1),
            close - dec!(1),
            close,
            dec!(5),
        )
        .unwrap()
    }

    #[test]
    fn timeframes_must_nest() {
        assert!(
            ResonanceStrategy::factory(&json!({
                "trend_timeframe": "m5",
                "pullback_timeframe": "h1",
            }))
            .is_err()
        );
    }

    #[test]
    fn trigger_fires_only_with_trend_and_pullback() {
        let config: ResonanceConfig = parse_params(&json!({
            "trend_period": 2,
            "pullback_rsi_period": 2,
            "pullback_threshold": 45,
            "trigger_fast": 2,
            "trigger_slow": 3,
        }))
        .unwrap();
        let mut strategy = ResonanceStrategy::new(StrategyId::new("test"), config);

        // Uptrend on H1.
        for (i, close) in [100, 105, 110].iter().enumerate() {
            strategy.on_bar(&bar(Timeframe::H1, i as i64, Decimal::from(*close)));
        }
        assert!(strategy.trend_up);

        // Pullback on M15.
        for (i, close) in [110, 108, 105].iter().enumerate() {
            strategy.on_bar(&bar(Timeframe::M15, i as i64, Decimal::from(*close)));
        }
        assert!(strategy.pulled_back);

        // M5 trigger: dip then cross back up.
        let closes = [105, 104, 103, 102, 106, 112];
        let mut signals = Vec::new();
        for (i, close) in closes.iter().enumerate() {
            signals.extend(strategy.on_bar(&bar(Timeframe::M5, i as i64, Decimal::from(*close))));
        }
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Buy);
    }
}
