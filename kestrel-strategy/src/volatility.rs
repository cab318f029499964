use crate::{
    Strategy,
    config::{ConfigError, ExitConfig, Validate, parse_params, require},
    signal::{Signal, SignalIntent},
};
use kestrel_data::{Side, bar::Bar};
use kestrel_execution::order::StrategyId;
use kestrel_ta::indicators::{AverageTrueRange, BollingerBands};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// ATR channel breakout parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AtrBreakoutConfig {
    #[serde(default = "default_atr_period")]
    pub atr_period: usize,
    #[serde(default = "default_channel_period")]
    pub channel_period: usize,
    /// Breakout confirmation distance in ATR multiples.
    #[serde(default = "default_multiplier")]
    pub multiplier: Decimal,
    #[serde(default)]
    pub exits: ExitConfig,
}

fn default_atr_period() -> usize {
    14
}
fn default_channel_period() -> usize {
    20
}
fn default_multiplier() -> Decimal {
    Decimal::ONE
}

impl Validate for AtrBreakoutConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require(self.atr_period >= 2, "atr_period must be >= 2")?;
        require(self.channel_period >= 2, "channel_period must be >= 2")?;
        require(self.multiplier > Decimal::ZERO, "multiplier must be positive")?;
        self.exits.validate()
    }
}

/// Long when price clears the recent high by a multiple of ATR; exits on a
/// close back under the channel midpoint. Stop defaults to one ATR.
#[derive(Debug)]
pub struct AtrBreakoutStrategy {
    id: StrategyId,
    config: AtrBreakoutConfig,
    atr: AverageTrueRange,
    highs: VecDeque<Decimal>,
    lows: VecDeque<Decimal>,
    in_position: bool,
    sequence: u64,
}

impl AtrBreakoutStrategy {
    pub const NAME: &'static str = "volatility_atr_breakout";

    pub fn new(id: StrategyId, config: AtrBreakoutConfig) -> Self {
        let atr = AverageTrueRange::new(config.atr_period);
        Self {
            id,
            config,
            atr,
            highs: VecDeque::new(),
            lows: VecDeque::new(),
            in_position: false,
            sequence: 0,
        }
    }

    pub fn factory(params: &serde_json::Value) -> Result<Box<dyn Strategy>, ConfigError> {
        let config: AtrBreakoutConfig = parse_params(params)?;
        Ok(Box::new(Self::new(StrategyId::new(Self::NAME), config)))
    }
}

impl Strategy for AtrBreakoutStrategy {
    fn on_bar(&mut self, bar: &Bar) -> Vec<Signal> {
        let atr = self.atr.update(bar.high, bar.low, bar.close);

        // Channel excludes the current bar.
        let channel_high = self.highs.iter().copied().max();
        let channel_low = self.lows.iter().copied().min();
        self.highs.push_back(bar.high);
        self.lows.push_back(bar.low);
        if self.highs.len() > self.config.channel_period {
            self.highs.pop_front();
            self.lows.pop_front();
        }

        let (Some(atr), Some(channel_high), Some(channel_low)) =
            (atr, channel_high, channel_low)
        else {
            return Vec::new();
        };
        if self.highs.len() < self.config.channel_period {
            return Vec::new();
        }

        if !self.in_position && bar.close > channel_high + atr * self.config.multiplier {
            self.in_position = true;
            self.sequence += 1;
            let stop = match self.config.exits.stop_loss_pct {
                Some(pct) => bar.close * (Decimal::ONE - pct),
                None => bar.close - atr,
            };
            return vec![
                Signal::market(
                    self.id.clone(),
                    bar.symbol.clone(),
                    Side::Buy,
                    SignalIntent::Open,
                    bar.time,
                    self.sequence,
                )
                .with_stop_loss(stop)
                .with_urgency(Decimal::new(7, 1)),
            ];
        }

        let midpoint = (channel_high + channel_low) / Decimal::from(2u64);
        if self.in_position && bar.close < midpoint {
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

/// Bollinger bandwidth squeeze parameters.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SqueezeConfig {
    #[serde(default = "default_bb_period")]
    pub period: usize,
    #[serde(default = "default_bb_multiplier")]
    pub multiplier: Decimal,
    /// Bandwidth below this fraction arms the squeeze.
    #[serde(default = "default_squeeze_threshold")]
    pub squeeze_threshold: Decimal,
    #[serde(default)]
    pub exits: ExitConfig,
}

fn default_bb_period() -> usize {
    20
}
fn default_bb_multiplier() -> Decimal {
    Decimal::from(2u64)
}
fn default_squeeze_threshold() -> Decimal {
    Decimal::new(4, 2) // 4% bandwidth
}

impl Validate for SqueezeConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require(self.period >= 2, "period must be >= 2")?;
        require(self.multiplier > Decimal::ZERO, "multiplier must be positive")?;
        require(
            self.squeeze_threshold > Decimal::ZERO,
            "squeeze_threshold must be positive",
        )?;
        self.exits.validate()
    }
}

/// Waits for the Bollinger bandwidth to compress under the threshold, then
/// trades the direction of the band break.
#[derive(Debug)]
pub struct SqueezeBreakoutStrategy {
    id: StrategyId,
    config: SqueezeConfig,
    bands: BollingerBands,
    squeezed: bool,
    in_position: Option<Side>,
    sequence: u64,
}

impl SqueezeBreakoutStrategy {
    pub const NAME: &'static str = "volatility_squeeze";

    pub fn new(id: StrategyId, config: SqueezeConfig) -> Self {
        let bands = BollingerBands::new(config.period, config.multiplier);
        Self {
            id,
            config,
            bands,
            squeezed: false,
            in_position: None,
            sequence: 0,
        }
    }

    pub fn factory(params: &serde_json::Value) -> Result<Box<dyn Strategy>, ConfigError> {
        let config: SqueezeConfig = parse_params(params)?;
        Ok(Box::new(Self::new(StrategyId::new(Self::NAME), config)))
    }

    fn emit(&mut self, bar: &Bar, side: Side, intent: SignalIntent) -> Signal {
        self.sequence += 1;
        let mut signal = Signal::market(
            self.id.clone(),
            bar.symbol.clone(),
            side,
            intent,
            bar.time,
            self.sequence,
        );
        if intent == SignalIntent::Open {
            if let Some(stop_pct) = self.config.exits.stop_loss_pct {
                let stop = match side {
                    Side::Buy => bar.close * (Decimal::ONE - stop_pct),
                    Side::Sell => bar.close * (Decimal::ONE + stop_pct),
                };
                signal = signal.with_stop_loss(stop);
            }
        }
        signal
    }
}

impl Strategy for SqueezeBreakoutStrategy {
    fn on_bar(&mut self, bar: &Bar) -> Vec<Signal> {
        let Some(bands) = self.bands.update(bar.close) else {
            return Vec::new();
        };

        match self.in_position {
            None => {
                if bands.bandwidth < self.config.squeeze_threshold {
                    self.squeezed = true;
                    return Vec::new();
                }
                if self.squeezed {
                    // Expansion out of the squeeze: trade the break direction.
                    let side = if bar.close > bands.upper {
                        Some(Side::Buy)
                    } else if bar.close < bands.lower {
                        Some(Side::Sell)
                    } else {
                        None
                    };
                    if let Some(side) = side {
                        self.squeezed = false;
                        self.in_position = Some(side);
                        return vec![self.emit(bar, side, SignalIntent::Open)];
                    }
                }
                Vec::new()
            }
            Some(side) => {
                // Exit at the midline.
                let crossed_back = match side {
                    Side::Buy => bar.close <= bands.middle,
                    Side::Sell => bar.close >= bands.middle,
                };
                if crossed_back {
                    self.in_position = None;
                    return vec![self.emit(bar, side.opposite(), SignalIntent::Close)];
                }
                Vec::new()
            }
        }
    }
}
