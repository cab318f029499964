use crate::{
    Strategy,
    config::{ConfigError, ExitConfig, Validate, parse_params, require},
    signal::{Signal, SignalIntent},
};
use kestrel_data::{Side, bar::Bar};
use kestrel_execution::order::StrategyId;
use kestrel_ta::{
    indicators::{Macd, SimpleMovingAverage},
    patterns::{Cross, CrossDetector},
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Dual SMA crossover parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DualSmaConfig {
    pub short: usize,
    pub long: usize,
    #[serde(default)]
    pub exits: ExitConfig,
}

impl Validate for DualSmaConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require(self.short >= 2, "short period must be >= 2")?;
        require(self.short < self.long, "short must be < long")?;
        self.exits.validate()
    }
}

/// Classic dual-SMA trend follower: long when the short average crosses
/// above the long average, flat again on the cross below.
#[derive(Debug)]
pub struct DualSmaStrategy {
    id: StrategyId,
    config: DualSmaConfig,
    short: SimpleMovingAverage,
    long: SimpleMovingAverage,
    cross: CrossDetector,
    in_position: bool,
    sequence: u64,
}

impl DualSmaStrategy {
    pub const NAME: &'static str = "trend_dual_sma";

    pub fn new(id: StrategyId, config: DualSmaConfig) -> Self {
        let short = SimpleMovingAverage::new(config.short);
        let long = SimpleMovingAverage::new(config.long);
        Self {
            id,
            config,
            short,
            long,
            cross: CrossDetector::new(),
            in_position: false,
            sequence: 0,
        }
    }

    pub fn factory(params: &serde_json::Value) -> Result<Box<dyn Strategy>, ConfigError> {
        let config: DualSmaConfig = parse_params(params)?;
        Ok(Box::new(Self::new(StrategyId::new(Self::NAME), config)))
    }

    fn entry(&mut self, bar: &Bar) -> Signal {
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
        if let Some(take_pct) = self.config.exits.take_profit_pct {
            signal = signal.with_take_profit(bar.close * (Decimal::ONE + take_pct));
        }
        signal
    }

    fn exit(&mut self, bar: &Bar) -> Signal {
        self.sequence += 1;
        Signal::market(
            self.id.clone(),
            bar.symbol.clone(),
            Side::Sell,
            SignalIntent::Close,
            bar.time,
            self.sequence,
        )
    }
}

impl Strategy for DualSmaStrategy {
    fn on_bar(&mut self, bar: &Bar) -> Vec<Signal> {
        let short = self.short.update(bar.close);
        let long = self.long.update(bar.close);
        let (Some(short), Some(long)) = (short, long) else {
            return Vec::new();
        };

        match self.cross.update(short, long) {
            Some(Cross::Above) if !self.in_position => {
                self.in_position = true;
                vec![self.entry(bar)]
            }
            Some(Cross::Below) if self.in_position => {
                self.in_position = false;
                vec![self.exit(bar)]
            }
            _ => Vec::new(),
        }
    }

    fn state_snapshot(&self) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "in_position": self.in_position,
            "sequence": self.sequence,
        }))
        .unwrap_or_default()
    }
}

/// MACD histogram sign-flip parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MacdTrendConfig {
    #[serde(default = "default_fast")]
    pub fast: usize,
    #[serde(default = "default_slow")]
    pub slow: usize,
    #[serde(default = "default_signal")]
    pub signal: usize,
    #[serde(default)]
    pub exits: ExitConfig,
}

fn default_fast() -> usize {
    12
}
fn default_slow() -> usize {
    26
}
fn default_signal() -> usize {
    9
}

impl Validate for MacdTrendConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require(self.fast >= 2, "fast period must be >= 2")?;
        require(self.fast < self.slow, "fast must be < slow")?;
        require(self.signal >= 1, "signal period must be >= 1")?;
        self.exits.validate()
    }
}

/// Long while the MACD line holds above its signal line.
#[derive(Debug)]
pub struct MacdTrendStrategy {
    id: StrategyId,
    config: MacdTrendConfig,
    macd: Macd,
    cross: CrossDetector,
    in_position: bool,
    sequence: u64,
}

impl MacdTrendStrategy {
    pub const NAME: &'static str = "trend_macd";

    pub fn new(id: StrategyId, config: MacdTrendConfig) -> Self {
        let macd = Macd::new(config.fast, config.slow, config.signal);
        Self {
            id,
            config,
            macd,
            cross: CrossDetector::new(),
            in_position: false,
            sequence: 0,
        }
    }

    pub fn factory(params: &serde_json::Value) -> Result<Box<dyn Strategy>, ConfigError> {
        let config: MacdTrendConfig = parse_params(params)?;
        Ok(Box::new(Self::new(StrategyId::new(Self::NAME), config)))
    }
}

impl Strategy for MacdTrendStrategy {
    fn on_bar(&mut self, bar: &Bar) -> Vec<Signal> {
        let Some(output) = self.macd.update(bar.close) else {
            return Vec::new();
        };

        match self.cross.update(output.macd, output.signal) {
            Some(Cross::Above) if !self.in_position => {
                self.in_position = true;
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
                vec![signal]
            }
            Some(Cross::Below) if self.in_position => {
                self.in_position = false;
                self.sequence += 1;
                vec![Signal::market(
                    self.id.clone(),
                    bar.symbol.clone(),
                    Side::Sell,
                    SignalIntent::Close,
                    bar.time,
                    self.sequence,
                )]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::DateTime;
    use kestrel_data::{Symbol, bar::Timeframe};
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn bar(index: i64, close: Decimal) -> Bar {
        Bar::new(
            Symbol::new("BTC/USDT"),
            Timeframe::H1,
            DateTime::from_timestamp(index * 3600, 0).unwrap(),
            close,
            close + dec!(10),
            close - dec!(10),
            close,
            dec!(5),
        )
        .unwrap()
    }

    #[test]
    fn config_rejects_inverted_periods() {
        assert!(DualSmaStrategy::factory(&json!({"short": 20, "long": 10})).is_err());
        assert!(DualSmaStrategy::factory(&json!({"short": 5, "long": 20})).is_ok());
    }

    #[test]
    fn emits_single_entry_on_cross() {
        let config: DualSmaConfig =
            parse_params(&json!({"short": 2, "long": 4, "exits": {"stop_loss_pct": "0.01"}})).unwrap();
        let mut strategy = DualSmaStrategy::new(StrategyId::new("test"), config);

        // Falling series keeps the short SMA below the long one.
        let mut signals = Vec::new();
        let closes = [100, 95, 90, 85, 80, 120, 140, 160];
        for (i, close) in closes.iter().enumerate() {
            signals.extend(strategy.on_bar(&bar(i as i64, Decimal::from(*close))));
        }
        assert_eq!(signals.len(), 1);
        let entry = &signals[0];
        assert_eq!(entry.side, Side::Buy);
        assert_eq!(entry.intent, SignalIntent::Open);
        assert!(entry.stop_loss_price.is_some());
    }
}
