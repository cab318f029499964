use crate::{
    Strategy,
    config::{ConfigError, ExitConfig, Validate, parse_params, require},
    signal::{Signal, SignalIntent},
};
use kestrel_data::{Side, bar::Bar};
use kestrel_execution::order::StrategyId;
use kestrel_ta::indicators::{BollingerBands, RelativeStrengthIndex};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// RSI mean-reversion parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RsiReversionConfig {
    #[serde(default = "default_period")]
    pub period: usize,
    #[serde(default = "default_oversold")]
    pub oversold: Decimal,
    #[serde(default = "default_overbought")]
    pub overbought: Decimal,
    #[serde(default)]
    pub exits: ExitConfig,
}

fn default_period() -> usize {
    14
}
fn default_oversold() -> Decimal {
    Decimal::from(30u64)
}
fn default_overbought() -> Decimal {
    Decimal::from(70u64)
}

impl Validate for RsiReversionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require(self.period >= 2, "period must be >= 2")?;
        require(
            self.oversold < self.overbought,
            "oversold must be < overbought",
        )?;
        require(
            self.oversold > Decimal::ZERO && self.overbought < Decimal::from(100u64),
            "bands must sit inside (0, 100)",
        )?;
        self.exits.validate()
    }
}

/// Buys oversold, exits when RSI recovers through the midline.
#[derive(Debug)]
pub struct RsiReversionStrategy {
    id: StrategyId,
    config: RsiReversionConfig,
    rsi: RelativeStrengthIndex,
    in_position: bool,
    sequence: u64,
}

impl RsiReversionStrategy {
    pub const NAME: &'static str = "reversion_rsi";

    pub fn new(id: StrategyId, config: RsiReversionConfig) -> Self {
        let rsi = RelativeStrengthIndex::new(config.period);
        Self {
            id,
            config,
            rsi,
            in_position: false,
            sequence: 0,
        }
    }

    pub fn factory(params: &serde_json::Value) -> Result<Box<dyn Strategy>, ConfigError> {
        let config: RsiReversionConfig = parse_params(params)?;
        Ok(Box::new(Self::new(StrategyId::new(Self::NAME), config)))
    }
}

impl Strategy for RsiReversionStrategy {
    fn on_bar(&mut self, bar: &Bar) -> Vec<Signal> {
        let Some(rsi) = self.rsi.update(bar.close) else {
            return Vec::new();
        };
        let midline = Decimal::from(50u64);

        if !self.in_position && rsi <= self.config.oversold {
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
            return vec![signal];
        }
        if self.in_position && rsi >= midline {
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

/// Bollinger band reversion parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BollingerReversionConfig {
    #[serde(default = "default_bb_period")]
    pub period: usize,
    #[serde(default = "default_bb_multiplier")]
    pub multiplier: Decimal,
    #[serde(default)]
    pub exits: ExitConfig,
}

fn default_bb_period() -> usize {
    20
}
fn default_bb_multiplier() -> Decimal {
    Decimal::from(2u64)
}

impl Validate for BollingerReversionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require(self.period >= 2, "period must be >= 2")?;
        require(
            self.multiplier > Decimal::ZERO,
            "multiplier must be positive",
        )?;
        self.exits.validate()
    }
}

/// Buys closes under the lower band, exits at the middle band.
#[derive(Debug)]
pub struct BollingerReversionStrategy {
    id: StrategyId,
    config: BollingerReversionConfig,
    bands: BollingerBands,
    in_position: bool,
    sequence: u64,
}

impl BollingerReversionStrategy {
    pub const NAME: &'static str = "reversion_bollinger";

    pub fn new(id: StrategyId, config: BollingerReversionConfig) -> Self {
        let bands = BollingerBands::new(config.period, config.multiplier);
        Self {
            id,
            config,
            bands,
            in_position: false,
            sequence: 0,
        }
    }

    pub fn factory(params: &serde_json::Value) -> Result<Box<dyn Strategy>, ConfigError> {
        let config: BollingerReversionConfig = parse_params(params)?;
        Ok(Box::new(Self::new(StrategyId::new(Self::NAME), config)))
    }
}

impl Strategy for BollingerReversionStrategy {
    fn on_bar(&mut self, bar: &Bar) -> Vec<Signal> {
        let Some(bands) = self.bands.update(bar.close) else {
            return Vec::new();
        };

        if !self.in_position && bar.close < bands.lower {
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
            return vec![signal];
        }
        if self.in_position && bar.close >= bands.middle {
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
