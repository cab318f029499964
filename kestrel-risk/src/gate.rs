use crate::{
    breaker::BreakerLevel,
    event::RiskLevel,
    limits::RiskLimits,
    monitor::ActionState,
};
use chrono::{DateTime, Duration, Utc};
use kestrel_execution::{balance::AccountSnapshot, slippage::SlippageEstimate};
use kestrel_strategy::signal::Signal;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Outcome of one gate. Denial is terminal for the signal; warnings
/// accumulate for audit.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub enum GateVerdict {
    Allow,
    Warn(String),
    Deny(String),
}

/// One pre-trade check. Gates are pure over the context snapshot; ordering
/// and short-circuiting live in [`PreTradeGates`].
pub trait Gate: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;
    fn check(&self, ctx: &GateContext<'_>) -> GateVerdict;
}

/// Everything a gate may consult, assembled once per signal. Reads come
/// from consistent snapshots; gates never lock.
#[derive(Debug)]
pub struct GateContext<'a> {
    pub signal: &'a Signal,
    pub account: &'a AccountSnapshot,
    /// Provisionally sized quantity (final sizing happens after the gates).
    pub candidate_quantity: Decimal,
    /// Entry price estimate used for notional projections.
    pub reference_price: Decimal,
    pub slippage: Option<&'a SlippageEstimate>,
    pub breaker: BreakerLevel,
    pub actions: &'a ActionState,
    /// Realised + unrealised PnL since the UTC day open.
    pub day_pnl: Decimal,
    /// Realised volatility for the symbol, when known.
    pub volatility: Option<Decimal>,
    /// Last failed order time for this (symbol, side).
    pub last_failure: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

impl GateContext<'_> {
    fn candidate_notional(&self) -> Decimal {
        self.candidate_quantity * self.reference_price
    }
}

/// Gate 1: circuit-breaker state. Levels at or above L2 deny new opens;
/// closing and reducing stay allowed until Emergency.
#[derive(Debug, Clone)]
pub struct BreakerGate;

impl Gate for BreakerGate {
    fn name(&self) -> &'static str {
        "circuit_breaker"
    }

    fn check(&self, ctx: &GateContext<'_>) -> GateVerdict {
        if ctx.breaker == BreakerLevel::Emergency {
            return GateVerdict::Deny(format!("circuit breaker {}", ctx.breaker));
        }
        if ctx.breaker.halts_opens() && ctx.signal.is_opening() {
            return GateVerdict::Deny(format!("circuit breaker {}", ctx.breaker));
        }
        if ctx.breaker == BreakerLevel::L1 {
            return GateVerdict::Warn("circuit breaker L1".into());
        }
        GateVerdict::Allow
    }
}

/// Gate 2: global / per-account pause and reduce-only flags. Closing is
/// always allowed while paused.
#[derive(Debug, Clone)]
pub struct PausedGate;

impl Gate for PausedGate {
    fn name(&self) -> &'static str {
        "trading_paused"
    }

    fn check(&self, ctx: &GateContext<'_>) -> GateVerdict {
        if !ctx.signal.is_opening() {
            return GateVerdict::Allow;
        }
        if let Some(reason) = ctx.actions.pause_reason() {
            return GateVerdict::Deny(format!("trading paused: {reason}"));
        }
        if ctx.actions.is_symbol_reduce_only(&ctx.signal.symbol) {
            return GateVerdict::Deny("reduce-only mode".into());
        }
        GateVerdict::Allow
    }
}

/// Gate 3: symbol and venue allow-lists.
#[derive(Debug, Clone)]
pub struct AllowListGate {
    limits: RiskLimits,
}

impl Gate for AllowListGate {
    fn name(&self) -> &'static str {
        "allow_list"
    }

    fn check(&self, ctx: &GateContext<'_>) -> GateVerdict {
        if !self.limits.allowed_symbols.contains(&ctx.signal.symbol) {
            return GateVerdict::Deny(format!("symbol {} not allowed", ctx.signal.symbol));
        }
        if !self.limits.allowed_venues.contains(&ctx.account.venue) {
            return GateVerdict::Deny(format!("venue {} not allowed", ctx.account.venue));
        }
        GateVerdict::Allow
    }
}

/// Gate 4: per-symbol position cap, shrunk for symbols whose realized
/// volatility runs above the configured baseline, plus the aggregate
/// account notional cap.
#[derive(Debug, Clone)]
pub struct PositionLimitGate {
    limits: RiskLimits,
}

impl Gate for PositionLimitGate {
    fn name(&self) -> &'static str {
        "position_limits"
    }

    fn check(&self, ctx: &GateContext<'_>) -> GateVerdict {
        if !ctx.signal.is_opening() {
            return GateVerdict::Allow;
        }
        let cap = self
            .limits
            .position_cap_at(&ctx.signal.symbol, ctx.volatility);

        let current = ctx
            .account
            .position(&ctx.signal.symbol)
            .map(|p| p.quantity.abs())
            .unwrap_or(Decimal::ZERO);
        if current + ctx.candidate_quantity > cap {
            return GateVerdict::Deny(format!(
                "position cap {cap} exceeded: {current} held + {} requested",
                ctx.candidate_quantity
            ));
        }

        let aggregate = ctx.account.gross_exposure() + ctx.candidate_notional();
        if aggregate > self.limits.max_account_notional {
            return GateVerdict::Deny(format!(
                "account notional cap {} exceeded: {aggregate}",
                self.limits.max_account_notional
            ));
        }
        GateVerdict::Allow
    }
}

/// Gate 5: leverage cap on projected gross exposure over equity.
#[derive(Debug, Clone)]
pub struct LeverageGate {
    limits: RiskLimits,
}

impl Gate for LeverageGate {
    fn name(&self) -> &'static str {
        "leverage"
    }

    fn check(&self, ctx: &GateContext<'_>) -> GateVerdict {
        if !ctx.signal.is_opening() || ctx.account.equity.is_zero() {
            return GateVerdict::Allow;
        }
        let projected =
            (ctx.account.gross_exposure() + ctx.candidate_notional()) / ctx.account.equity;
        if projected > self.limits.max_leverage {
            return GateVerdict::Deny(format!(
                "leverage {projected} above cap {}",
                self.limits.max_leverage
            ));
        }
        GateVerdict::Allow
    }
}

/// Gate 6: single-symbol concentration against equity.
#[derive(Debug, Clone)]
pub struct ConcentrationGate {
    limits: RiskLimits,
}

impl Gate for ConcentrationGate {
    fn name(&self) -> &'static str {
        "concentration"
    }

    fn check(&self, ctx: &GateContext<'_>) -> GateVerdict {
        if !ctx.signal.is_opening() || ctx.account.equity.is_zero() {
            return GateVerdict::Allow;
        }
        let held = ctx
            .account
            .position(&ctx.signal.symbol)
            .map(|p| p.notional(ctx.reference_price))
            .unwrap_or(Decimal::ZERO);
        let share = (held + ctx.candidate_notional()) / ctx.account.equity;
        if share > self.limits.concentration_max {
            return GateVerdict::Deny(format!(
                "concentration {share} above cap {}",
                self.limits.concentration_max
            ));
        }
        GateVerdict::Allow
    }
}

/// Gate 7: projected margin headroom. Below warn is a warning, below
/// critical a denial.
#[derive(Debug, Clone)]
pub struct MarginGate {
    limits: RiskLimits,
}

impl Gate for MarginGate {
    fn name(&self) -> &'static str {
        "margin_headroom"
    }

    fn check(&self, ctx: &GateContext<'_>) -> GateVerdict {
        if !ctx.signal.is_opening() || ctx.account.equity.is_zero() {
            return GateVerdict::Allow;
        }
        let required = ctx.candidate_notional() / self.limits.max_leverage;
        let projected_free = ctx.account.free_margin - required;
        let projected_rate = projected_free / ctx.account.equity;
        if projected_rate < self.limits.margin_critical {
            return GateVerdict::Deny(format!(
                "projected margin rate {projected_rate} below critical {}",
                self.limits.margin_critical
            ));
        }
        if projected_rate < self.limits.margin_warn {
            return GateVerdict::Warn(format!(
                "projected margin rate {projected_rate} below warn {}",
                self.limits.margin_warn
            ));
        }
        GateVerdict::Allow
    }
}

/// Gate 8: daily-loss guard. A day at or past the loss limit blocks new
/// openings; closing is still allowed.
#[derive(Debug, Clone)]
pub struct DailyLossGate {
    limits: RiskLimits,
}

impl Gate for DailyLossGate {
    fn name(&self) -> &'static str {
        "daily_loss"
    }

    fn check(&self, ctx: &GateContext<'_>) -> GateVerdict {
        if !ctx.signal.is_opening() {
            return GateVerdict::Allow;
        }
        if ctx.day_pnl <= -self.limits.daily_loss_limit {
            return GateVerdict::Deny(format!(
                "daily loss {} at limit {}",
                ctx.day_pnl, self.limits.daily_loss_limit
            ));
        }
        GateVerdict::Allow
    }
}

/// Gate 9: estimated slippage within the allowance for this urgency class.
#[derive(Debug, Clone)]
pub struct SlippageGate {
    limits: RiskLimits,
}

impl Gate for SlippageGate {
    fn name(&self) -> &'static str {
        "liquidity"
    }

    fn check(&self, ctx: &GateContext<'_>) -> GateVerdict {
        let Some(estimate) = ctx.slippage else {
            // No book yet; the execution layer re-checks before submitting.
            return GateVerdict::Warn("no order book for slippage estimate".into());
        };
        if estimate.exhausted {
            return GateVerdict::Deny(format!(
                "book depth {} cannot absorb order",
                estimate.quantity_filled
            ));
        }
        let allowance = self.limits.slippage_allowance(ctx.signal.urgency);
        if estimate.slippage > allowance {
            return GateVerdict::Deny(format!(
                "estimated slippage {} above allowance {allowance}",
                estimate.slippage
            ));
        }
        GateVerdict::Allow
    }
}

/// Gate 10: repeat-failure cooldown per (symbol, side).
#[derive(Debug, Clone)]
pub struct CooldownGate {
    limits: RiskLimits,
}

impl Gate for CooldownGate {
    fn name(&self) -> &'static str {
        "cooldown"
    }

    fn check(&self, ctx: &GateContext<'_>) -> GateVerdict {
        let Some(last_failure) = ctx.last_failure else {
            return GateVerdict::Allow;
        };
        let cooldown = Duration::milliseconds(self.limits.cooldown_ms);
        let elapsed = ctx.now - last_failure;
        if elapsed < cooldown {
            return GateVerdict::Deny(format!(
                "cooldown: prior failure {}s ago",
                elapsed.num_seconds()
            ));
        }
        GateVerdict::Allow
    }
}

/// Result of running the chain: either the accumulated warnings, or the
/// first denial with the refusing gate's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateOutcome {
    Passed { warnings: Vec<(String, String)> },
    Denied { gate: &'static str, reason: String },
}

impl GateOutcome {
    pub fn is_denied(&self) -> bool {
        matches!(self, GateOutcome::Denied { .. })
    }

    /// Severity the outcome should be audited at.
    pub fn level(&self) -> RiskLevel {
        match self {
            GateOutcome::Passed { warnings } if warnings.is_empty() => RiskLevel::Info,
            GateOutcome::Passed { .. } => RiskLevel::Warn,
            GateOutcome::Denied { .. } => RiskLevel::Warn,
        }
    }
}

/// The fixed, ordered pre-trade chain. Order is part of the contract:
/// breaker, paused, allow-list, position limits, leverage, concentration,
/// margin, daily loss, liquidity, cooldown.
#[derive(Debug)]
pub struct PreTradeGates {
    gates: Vec<Box<dyn Gate>>,
}

impl PreTradeGates {
    pub fn new(limits: &RiskLimits) -> Self {
        let gates: Vec<Box<dyn Gate>> = vec![
            Box::new(BreakerGate),
            Box::new(PausedGate),
            Box::new(AllowListGate {
                limits: limits.clone(),
            }),
            Box::new(PositionLimitGate {
                limits: limits.clone(),
            }),
            Box::new(LeverageGate {
                limits: limits.clone(),
            }),
            Box::new(ConcentrationGate {
                limits: limits.clone(),
            }),
            Box::new(MarginGate {
                limits: limits.clone(),
            }),
            Box::new(DailyLossGate {
                limits: limits.clone(),
            }),
            Box::new(SlippageGate {
                limits: limits.clone(),
            }),
            Box::new(CooldownGate {
                limits: limits.clone(),
            }),
        ];
        Self { gates }
    }

    /// Run every gate in order; the first denial short-circuits.
    pub fn evaluate(&self, ctx: &GateContext<'_>) -> GateOutcome {
        let mut warnings = Vec::new();
        for gate in &self.gates {
            match gate.check(ctx) {
                GateVerdict::Allow => {}
                GateVerdict::Warn(reason) => {
                    warnings.push((gate.name().to_string(), reason));
                }
                GateVerdict::Deny(reason) => {
                    return GateOutcome::Denied {
                        gate: gate.name(),
                        reason,
                    };
                }
            }
        }
        GateOutcome::Passed { warnings }
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.gates.iter().map(|gate| gate.name()).collect()
    }
}
