use crate::{
    Strategy,
    config::{ConfigError, Validate, parse_params, require},
    signal::{Signal, SignalIntent},
};
use chrono::{DateTime, Utc};
use kestrel_data::{Side, Symbol, bar::Bar};
use kestrel_execution::order::StrategyId;
use kestrel_ta::{mean, stdev};
use rust_decimal::{Decimal, MathematicalOps};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Pairs-trading parameters over a cointegrated symbol pair.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PairsConfig {
    pub symbol_a: Symbol,
    pub symbol_b: Symbol,
    #[serde(default = "default_lookback")]
    pub lookback: usize,
    #[serde(default = "default_entry_z")]
    pub entry_z: Decimal,
    #[serde(default = "default_exit_z")]
    pub exit_z: Decimal,
}

fn default_lookback() -> usize {
    30
}
fn default_entry_z() -> Decimal {
    Decimal::from(2u64)
}
fn default_exit_z() -> Decimal {
    Decimal::new(5, 1)
}

impl Validate for PairsConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require(self.symbol_a != self.symbol_b, "legs must differ")?;
        require(self.lookback >= 5, "lookback must be >= 5")?;
        require(self.entry_z > Decimal::ZERO, "entry_z must be positive")?;
        require(self.exit_z < self.entry_z, "exit_z must be < entry_z")?;
        require(self.exit_z >= Decimal::ZERO, "exit_z must be >= 0")?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PairPosition {
    /// Long A, short B (entered on a cheap spread).
    LongSpread,
    /// Short A, long B (entered on a rich spread).
    ShortSpread,
}

/// Pairs z-score strategy: tracks the price-ratio spread of two legs, opens
/// both legs when the spread stretches past `entry_z` and unwinds them when
/// it reverts inside `exit_z`. Both legs are emitted in the same callback.
#[derive(Debug)]
pub struct PairsStrategy {
    id: StrategyId,
    config: PairsConfig,
    pending_a: Option<(DateTime<Utc>, Decimal)>,
    pending_b: Option<(DateTime<Utc>, Decimal)>,
    spreads: VecDeque<Decimal>,
    position: Option<PairPosition>,
    sequence: u64,
}

impl PairsStrategy {
    pub const NAME: &'static str = "stat_arb_pairs";

    pub fn new(id: StrategyId, config: PairsConfig) -> Self {
        Self {
            id,
            config,
            pending_a: None,
            pending_b: None,
            spreads: VecDeque::new(),
            position: None,
            sequence: 0,
        }
    }

    pub fn factory(params: &serde_json::Value) -> Result<Box<dyn Strategy>, ConfigError> {
        let config: PairsConfig = parse_params(params)?;
        Ok(Box::new(Self::new(StrategyId::new(Self::NAME), config)))
    }

    /// Latest z-score of the spread, once the lookback is full.
    pub fn z_score(&self) -> Option<Decimal> {
        if self.spreads.len() < self.config.lookback {
            return None;
        }
        let spreads: Vec<Decimal> = self.spreads.iter().copied().collect();
        let mu = mean(&spreads)?;
        let sigma = stdev(&spreads)?;
        if sigma.is_zero() {
            return None;
        }
        let last = *self.spreads.back()?;
        Some((last - mu) / sigma)
    }

    /// Mean-reversion half-life in bars, from the spread's lag-1
    /// autocorrelation. `None` until warm or when the spread is not
    /// mean-reverting.
    pub fn half_life(&self) -> Option<Decimal> {
        if self.spreads.len() < self.config.lookback {
            return None;
        }
        let spreads: Vec<Decimal> = self.spreads.iter().copied().collect();
        let current = &spreads[1..];
        let lagged = &spreads[..spreads.len() - 1];
        let mu_current = mean(current)?;
        let mu_lagged = mean(lagged)?;

        let mut covariance = Decimal::ZERO;
        let mut variance = Decimal::ZERO;
        for (x, y) in lagged.iter().zip(current.iter()) {
            covariance += (*x - mu_lagged) * (*y - mu_current);
            variance += (*x - mu_lagged) * (*x - mu_lagged);
        }
        if variance.is_zero() {
            return None;
        }
        let phi = covariance / variance;
        if phi <= Decimal::ZERO || phi >= Decimal::ONE {
            return None;
        }
        // half_life = ln(0.5) / ln(phi)
        let ln_half = Decimal::new(5, 1).ln();
        Some(ln_half / phi.ln())
    }

    fn emit(
        &mut self,
        symbol: Symbol,
        side: Side,
        intent: SignalIntent,
        time: DateTime<Utc>,
        z: Decimal,
    ) -> Signal {
        self.sequence += 1;
        Signal::market(self.id.clone(), symbol, side, intent, time, self.sequence)
            .with_context(serde_json::json!({ "z_score": z.to_string() }))
    }

    fn on_pair_close(&mut self, time: DateTime<Utc>, close_a: Decimal, close_b: Decimal) -> Vec<Signal> {
        if close_b.is_zero() {
            return Vec::new();
        }
        let spread = close_a / close_b;
        self.spreads.push_back(spread);
        if self.spreads.len() > self.config.lookback {
            self.spreads.pop_front();
        }
        let Some(z) = self.z_score() else {
            return Vec::new();
        };

        match self.position {
            None => {
                if z >= self.config.entry_z {
                    // Spread rich: sell A, buy B.
                    self.position = Some(PairPosition::ShortSpread);
                    let a = self.config.symbol_a.clone();
                    let b = self.config.symbol_b.clone();
                    vec![
                        self.emit(a, Side::Sell, SignalIntent::Open, time, z),
                        self.emit(b, Side::Buy, SignalIntent::Open, time, z),
                    ]
                } else if z <= -self.config.entry_z {
                    self.position = Some(PairPosition::LongSpread);
                    let a = self.config.symbol_a.clone();
                    let b = self.config.symbol_b.clone();
                    vec![
                        self.emit(a, Side::Buy, SignalIntent::Open, time, z),
                        self.emit(b, Side::Sell, SignalIntent::Open, time, z),
                    ]
                } else {
                    Vec::new()
                }
            }
            Some(position) => {
                if z.abs() > self.config.exit_z {
                    return Vec::new();
                }
                self.position = None;
                let a = self.config.symbol_a.clone();
                let b = self.config.symbol_b.clone();
                let (side_a, side_b) = match position {
                    PairPosition::ShortSpread => (Side::Buy, Side::Sell),
                    PairPosition::LongSpread => (Side::Sell, Side::Buy),
                };
                vec![
                    self.emit(a, side_a, SignalIntent::Close, time, z),
                    self.emit(b, side_b, SignalIntent::Close, time, z),
                ]
            }
        }
    }
}

impl Strategy for PairsStrategy {
    fn on_bar(&mut self, bar: &Bar) -> Vec<Signal> {
        if bar.symbol == self.config.symbol_a {
            self.pending_a = Some((bar.time, bar.close));
        } else if bar.symbol == self.config.symbol_b {
            self.pending_b = Some((bar.time, bar.close));
        } else {
            return Vec::new();
        }

        // Act only when both legs have closed the same interval.
        let (Some((time_a, close_a)), Some((time_b, close_b))) =
            (self.pending_a, self.pending_b)
        else {
            return Vec::new();
        };
        if time_a != time_b {
            return Vec::new();
        }
        self.pending_a = None;
        self.pending_b = None;
        self.on_pair_close(time_a, close_a, close_b)
    }

    fn state_snapshot(&self) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "spreads": self.spreads.iter().map(|s| s.to_string()).collect::<Vec<_>>(),
            "sequence": self.sequence,
        }))
        .unwrap_or_default()
    }
}

/// Two-leg percentage-spread parameters, shared by the cross-venue and
/// perp-spot basis strategies.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SpreadConfig {
    /// The leg sold when the spread is rich (perp, or the rich venue).
    pub symbol_rich: Symbol,
    /// The leg bought against it (spot, or the cheap venue).
    pub symbol_cheap: Symbol,
    /// Spread fraction that opens the trade, eg/ 0.005 = 0.5%.
    #[serde(default = "default_entry_spread")]
    pub entry_spread: Decimal,
    /// Spread fraction that closes it.
    #[serde(default = "default_exit_spread")]
    pub exit_spread: Decimal,
}

fn default_entry_spread() -> Decimal {
    Decimal::new(5, 3)
}
fn default_exit_spread() -> Decimal {
    Decimal::new(1, 3)
}

impl Validate for SpreadConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        require(self.symbol_rich != self.symbol_cheap, "legs must differ")?;
        require(self.entry_spread > Decimal::ZERO, "entry_spread must be positive")?;
        require(
            self.exit_spread < self.entry_spread,
            "exit_spread must be < entry_spread",
        )?;
        require(self.exit_spread >= Decimal::ZERO, "exit_spread must be >= 0")
    }
}

/// Convergence trade over the same instrument priced on two legs: when leg
/// one trades rich against leg two beyond `entry_spread`, sell it and buy
/// the other; unwind once the spread converges. Covers both the
/// cross-venue and perp-spot basis cases, which differ only in what the
/// legs are.
#[derive(Debug)]
pub struct SpreadConvergenceStrategy {
    id: StrategyId,
    config: SpreadConfig,
    pending_rich: Option<(DateTime<Utc>, Decimal)>,
    pending_cheap: Option<(DateTime<Utc>, Decimal)>,
    in_position: bool,
    sequence: u64,
}

impl SpreadConvergenceStrategy {
    pub const CROSS_VENUE: &'static str = "stat_arb_cross_venue";
    pub const BASIS: &'static str = "stat_arb_basis";

    pub fn new(id: StrategyId, config: SpreadConfig) -> Self {
        Self {
            id,
            config,
            pending_rich: None,
            pending_cheap: None,
            in_position: false,
            sequence: 0,
        }
    }

    pub fn cross_venue_factory(
        params: &serde_json::Value,
    ) -> Result<Box<dyn Strategy>, ConfigError> {
        let config: SpreadConfig = parse_params(params)?;
        Ok(Box::new(Self::new(StrategyId::new(Self::CROSS_VENUE), config)))
    }

    pub fn basis_factory(params: &serde_json::Value) -> Result<Box<dyn Strategy>, ConfigError> {
        let config: SpreadConfig = parse_params(params)?;
        Ok(Box::new(Self::new(StrategyId::new(Self::BASIS), config)))
    }

    fn emit(
        &mut self,
        symbol: Symbol,
        side: Side,
        intent: SignalIntent,
        time: DateTime<Utc>,
        spread: Decimal,
    ) -> Signal {
        self.sequence += 1;
        Signal::market(self.id.clone(), symbol, side, intent, time, self.sequence)
            .with_context(serde_json::json!({ "spread": spread.to_string() }))
    }
}

impl Strategy for SpreadConvergenceStrategy {
    fn on_bar(&mut self, bar: &Bar) -> Vec<Signal> {
        if bar.symbol == self.config.symbol_rich {
            self.pending_rich = Some((bar.time, bar.close));
        } else if bar.symbol == self.config.symbol_cheap {
            self.pending_cheap = Some((bar.time, bar.close));
        } else {
            return Vec::new();
        }

        let (Some((time_rich, rich)), Some((time_cheap, cheap))) =
            (self.pending_rich, self.pending_cheap)
        else {
            return Vec::new();
        };
        if time_rich != time_cheap || cheap.is_zero() {
            return Vec::new();
        }
        self.pending_rich = None;
        self.pending_cheap = None;

        let spread = (rich - cheap) / cheap;
        if !self.in_position && spread >= self.config.entry_spread {
            self.in_position = true;
            let rich_symbol = self.config.symbol_rich.clone();
            let cheap_symbol = self.config.symbol_cheap.clone();
            return vec![
                self.emit(rich_symbol, Side::Sell, SignalIntent::Open, time_rich, spread),
                self.emit(cheap_symbol, Side::Buy, SignalIntent::Open, time_rich, spread),
            ];
        }
        if self.in_position && spread <= self.config.exit_spread {
            self.in_position = false;
            let rich_symbol = self.config.symbol_rich.clone();
            let cheap_symbol = self.config.symbol_cheap.clone();
            return vec![
                self.emit(rich_symbol, Side::Buy, SignalIntent::Close, time_rich, spread),
                self.emit(cheap_symbol, Side::Sell, SignalIntent::Close, time_rich, spread),
            ];
        }
        Vec::new()
    }
}
