use crate::{
    Strategy,
    config::{ConfigError, ExitConfig, Validate, parse_params, require},
    signal::{Signal, SignalIntent},
};
use kestrel_data::{Side, bar::Bar, ticker::Ticker};
use kestrel_execution::order::StrategyId;
use kestrel_ta::indicators::{SimpleMovingAverage, VolumeWeightedMovingAverage};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Volume spike momentum parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VolumeSpikeConfig {
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Volume must exceed the rolling average by this multiple.
    #[serde(default = "default_spike_multiple")]
    pub spike_multiple: Decimal,
    #[serde(default)]
    pub exits: ExitConfig,
}

fn default_lookback() -> usize {
    20
}
fn default_spike_multiple() -> Decimal {
    Decimal::from(3u64)
}

impl Validate for VolumeSpikeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require(self.lookback >= 2, "lookback must be >= 2")?;
        require(
            self.spike_multiple > Decimal::ONE,
            "spike_multiple must be > 1",
        )?;
        self.exits.validate()
    }
}

/// Trades in the direction of a bar whose volume spikes over the rolling
/// average; exits after the configured hold.
#[derive(Debug)]
pub struct VolumeSpikeStrategy {
    id: StrategyId,
    config: VolumeSpikeConfig,
    volume_average: SimpleMovingAverage,
    in_position: Option<Side>,
    bars_held: usize,
    sequence: u64,
}

impl VolumeSpikeStrategy {
    pub const NAME: &'static str = "flow_volume_spike";
    const HOLD_BARS: usize = 5;

    pub fn new(id: StrategyId, config: VolumeSpikeConfig) -> Self {
        let volume_average = SimpleMovingAverage::new(config.lookback);
        Self {
            id,
            config,
            volume_average,
            in_position: None,
            bars_held: 0,
            sequence: 0,
        }
    }

    pub fn factory(params: &serde_json::Value) -> Result<Box<dyn Strategy>, ConfigError> {
        let config: VolumeSpikeConfig = parse_params(params)?;
        Ok(Box::new(Self::new(StrategyId::new(Self::NAME), config)))
    }
}

impl Strategy for VolumeSpikeStrategy {
    fn on_bar(&mut self, bar: &Bar) -> Vec<Signal> {
        let average_before = self.volume_average.value();
        self.volume_average.update(bar.volume);

        if let Some(side) = self.in_position {
            self.bars_held += 1;
            if self.bars_held >= Self::HOLD_BARS {
                self.in_position = None;
                self.bars_held = 0;
                self.sequence += 1;
                return vec![Signal::market(
                    self.id.clone(),
                    bar.symbol.clone(),
                    side.opposite(),
                    SignalIntent::Close,
                    bar.time,
                    self.sequence,
                )];
            }
            return Vec::new();
        }

        let Some(average) = average_before else {
            return Vec::new();
        };
        if average.is_zero() || bar.volume < average * self.config.spike_multiple {
            return Vec::new();
        }

        // Direction of the spike bar decides the trade.
        let side = if bar.close >= bar.open {
            Side::Buy
        } else {
            Side::Sell
        };
        self.in_position = Some(side);
        self.bars_held = 0;
        self.sequence += 1;
        let mut signal = Signal::market(
            self.id.clone(),
            bar.symbol.clone(),
            side,
            SignalIntent::Open,
            bar.time,
            self.sequence,
        )
        .with_urgency(Decimal::new(8, 1));
        if let Some(stop_pct) = self.config.exits.stop_loss_pct {
            let stop = match side {
                Side::Buy => bar.close * (Decimal::ONE - stop_pct),
                Side::Sell => bar.close * (Decimal::ONE + stop_pct),
            };
            signal = signal.with_stop_loss(stop);
        }
        vec![signal]
    }
}

/// VWAP deviation parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct VwapDeviationConfig {
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    /// Deviation from rolling VWAP (as a fraction) that triggers a fade.
    #[serde(default = "default_deviation")]
    pub entry_deviation: Decimal,
    #[serde(default)]
    pub exits: ExitConfig,
}

fn default_deviation() -> Decimal {
    Decimal::new(2, 2) // 2%
}

impl Validate for VwapDeviationConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require(self.lookback >= 2, "lookback must be >= 2")?;
        require(
            self.entry_deviation > Decimal::ZERO,
            "entry_deviation must be positive",
        )?;
        self.exits.validate()
    }
}

/// Fades stretched moves away from the rolling volume-weighted price and
/// exits when price tags it again.
#[derive(Debug)]
pub struct VwapDeviationStrategy {
    id: StrategyId,
    config: VwapDeviationConfig,
    vwma: VolumeWeightedMovingAverage,
    in_position: Option<Side>,
    sequence: u64,
}

impl VwapDeviationStrategy {
    pub const NAME: &'static str = "flow_vwap_deviation";

    pub fn new(id: StrategyId, config: VwapDeviationConfig) -> Self {
        let vwma = VolumeWeightedMovingAverage::new(config.lookback);
        Self {
            id,
            config,
            vwma,
            in_position: None,
            sequence: 0,
        }
    }

    pub fn factory(params: &serde_json::Value) -> Result<Box<dyn Strategy>, ConfigError> {
        let config: VwapDeviationConfig = parse_params(params)?;
        Ok(Box::new(Self::new(StrategyId::new(Self::NAME), config)))
    }

    fn emit(&mut self, bar: &Bar, side: Side, intent: SignalIntent) -> Signal {
        self.sequence += 1;
        Signal::market(
            self.id.clone(),
            bar.symbol.clone(),
            side,
            intent,
            bar.time,
            self.sequence,
        )
    }
}

impl Strategy for VwapDeviationStrategy {
    fn on_bar(&mut self, bar: &Bar) -> Vec<Signal> {
        let Some(vwap) = self.vwma.update(bar.typical_price(), bar.volume) else {
            return Vec::new();
        };
        if vwap.is_zero() {
            return Vec::new();
        }
        let deviation = (bar.close - vwap) / vwap;

        match self.in_position {
            None => {
                if deviation >= self.config.entry_deviation {
                    self.in_position = Some(Side::Sell);
                    vec![self.emit(bar, Side::Sell, SignalIntent::Open)]
                } else if deviation <= -self.config.entry_deviation {
                    self.in_position = Some(Side::Buy);
                    vec![self.emit(bar, Side::Buy, SignalIntent::Open)]
                } else {
                    Vec::new()
                }
            }
            Some(side) => {
                let reverted = match side {
                    Side::Buy => deviation >= Decimal::ZERO,
                    Side::Sell => deviation <= Decimal::ZERO,
                };
                if reverted {
                    self.in_position = None;
                    vec![self.emit(bar, side.opposite(), SignalIntent::Close)]
                } else {
                    Vec::new()
                }
            }
        }
    }
}

/// Taker-imbalance parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TakerRatioConfig {
    /// Bid/ask volume imbalance (0.5 = balanced) that triggers an entry.
    #[serde(default = "default_imbalance")]
    pub entry_imbalance: Decimal,
}

fn default_imbalance() -> Decimal {
    Decimal::new(75, 2) // 75% one-sided
}

impl Validate for TakerRatioConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require(
            self.entry_imbalance > Decimal::new(5, 1) && self.entry_imbalance < Decimal::ONE,
            "entry_imbalance must be in (0.5, 1)",
        )
    }
}

/// Ticker-driven imbalance reader: persistent one-sided top-of-book volume
/// opens in the pressured direction, balance restores the exit.
#[derive(Debug)]
pub struct TakerRatioStrategy {
    id: StrategyId,
    config: TakerRatioConfig,
    in_position: Option<Side>,
    sequence: u64,
}

impl TakerRatioStrategy {
    pub const NAME: &'static str = "flow_taker_ratio";

    pub fn new(id: StrategyId, config: TakerRatioConfig) -> Self {
        Self {
            id,
            config,
            in_position: None,
            sequence: 0,
        }
    }

    pub fn factory(params: &serde_json::Value) -> Result<Box<dyn Strategy>, ConfigError> {
        let config: TakerRatioConfig = parse_params(params)?;
        Ok(Box::new(Self::new(StrategyId::new(Self::NAME), config)))
    }

    fn emit(&mut self, ticker: &Ticker, side: Side, intent: SignalIntent) -> Signal {
        self.sequence += 1;
        Signal::market(
            self.id.clone(),
            ticker.symbol.clone(),
            side,
            intent,
            ticker.time,
            self.sequence,
        )
    }
}

impl Strategy for TakerRatioStrategy {
    fn on_bar(&mut self, _bar: &Bar) -> Vec<Signal> {
        Vec::new()
    }

    fn on_ticker(&mut self, ticker: &Ticker) -> Vec<Signal> {
        let total = ticker.bid_volume + ticker.ask_volume;
        if total.is_zero() {
            return Vec::new();
        }
        let bid_share = ticker.bid_volume / total;

        match self.in_position {
            None => {
                if bid_share >= self.config.entry_imbalance {
                    self.in_position = Some(Side::Buy);
                    vec![self.emit(ticker, Side::Buy, SignalIntent::Open)]
                } else if bid_share <= Decimal::ONE - self.config.entry_imbalance {
                    self.in_position = Some(Side::Sell);
                    vec![self.emit(ticker, Side::Sell, SignalIntent::Open)]
                } else {
                    Vec::new()
                }
            }
            Some(side) => {
                let balanced = (bid_share - Decimal::new(5, 1)).abs() < Decimal::new(1, 1);
                if balanced {
                    self.in_position = None;
                    vec![self.emit(ticker, side.opposite(), SignalIntent::Close)]
                } else {
                    Vec::new()
                }
            }
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

    fn bar(index: i64, close: Decimal, volume: Decimal) -> Bar {
        Bar::new(
            Symbol::new("BTC/USDT"),
            Timeframe::M5,
            DateTime::from_timestamp(index * 300, 0).unwrap(),
            close,
            close + dec!(1),
            close - dec!(1),
            close,
            volume,
        )
        .unwrap()
    }

    #[test]
    fn spike_in_green_bar_buys() {
        let config: VolumeSpikeConfig =
            parse_params(&json!({"lookback": 3, "spike_multiple": "2"})).unwrap();
        let mut strategy = VolumeSpikeStrategy::new(StrategyId::new("test"), config);

        let mut signals = Vec::new();
        for i in 0..3 {
            signals.extend(strategy.on_bar(&bar(i, dec!(100), dec!(10))));
        }
        signals.extend(strategy.on_bar(&bar(3, dec!(100), dec!(50))));
        assert_eq!(signals.len(), 1);
        assert_eq!(signals[0].side, Side::Buy);
        assert_eq!(signals[0].intent, SignalIntent::Open);
    }

    #[test]
    fn taker_imbalance_round_trip() {
        let config: TakerRatioConfig = parse_params(&json!({})).unwrap();
        let mut strategy = TakerRatioStrategy::new(StrategyId::new("test"), config);

        let ticker = |bid_volume, ask_volume| Ticker::new(
            Symbol::new("BTC/USDT"),
            DateTime::from_timestamp(0, 0).unwrap(),
            dec!(99),
            dec!(101),
            dec!(100),
            bid_volume,
            ask_volume,
        );

        let open = strategy.on_ticker(&ticker(dec!(80), dec!(20)));
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].side, Side::Buy);

        let close = strategy.on_ticker(&ticker(dec!(50), dec!(50)));
        assert_eq!(close.len(), 1);
        assert_eq!(close[0].intent, SignalIntent::Close);
    }
}
