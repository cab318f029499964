use crate::{
    RiskApproved, RiskRefused,
    breaker::BreakerLevel,
    gate::{GateContext, GateOutcome, PreTradeGates},
    limits::{LimitsError, RiskLimits},
    monitor::ActionState,
    sizing::size_signal,
};
use chrono::{DateTime, NaiveDate, Utc};
use fnv::FnvHashMap;
use kestrel_data::{Side, Symbol, books::OrderBook};
use kestrel_execution::{
    balance::AccountSnapshot,
    slippage::{SlippageThresholds, estimate_slippage},
};
use kestrel_strategy::signal::Signal;
use rust_decimal::Decimal;
use tracing::debug;

/// An accepted signal with its final quantity and any gate warnings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SizedSignal {
    pub signal: Signal,
    pub quantity: Decimal,
    pub warnings: Vec<(String, String)>,
}

/// Day PnL bookkeeping for the daily-loss guard. Resets at UTC midnight.
#[derive(Debug, Clone, Default)]
struct DayPnl {
    date: Option<NaiveDate>,
    realised: Decimal,
    unrealised: Decimal,
}

impl DayPnl {
    fn roll(&mut self, now: DateTime<Utc>) {
        let today = now.date_naive();
        if self.date != Some(today) {
            self.date = Some(today);
            self.realised = Decimal::ZERO;
            self.unrealised = Decimal::ZERO;
        }
    }

    fn total(&self) -> Decimal {
        self.realised + self.unrealised
    }
}

/// The synchronous pre-trade pipeline: ordered gates, then sizing.
/// Consumes each signal exactly once.
#[derive(Debug)]
pub struct RiskPipeline {
    limits: RiskLimits,
    gates: PreTradeGates,
    slippage_thresholds: SlippageThresholds,
    failures: FnvHashMap<(Symbol, Side), DateTime<Utc>>,
    volatilities: FnvHashMap<Symbol, Decimal>,
    day_pnl: DayPnl,
}

impl RiskPipeline {
    pub fn new(
        limits: RiskLimits,
        slippage_thresholds: SlippageThresholds,
    ) -> Result<Self, LimitsError> {
        limits.validate()?;
        let gates = PreTradeGates::new(&limits);
        Ok(Self {
            limits,
            gates,
            slippage_thresholds,
            failures: FnvHashMap::default(),
            volatilities: FnvHashMap::default(),
            day_pnl: DayPnl::default(),
        })
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }

    /// Record a failed order so the cooldown gate can block immediate
    /// retries of the same (symbol, side).
    pub fn record_failure(&mut self, symbol: Symbol, side: Side, now: DateTime<Utc>) {
        self.failures.insert((symbol, side), now);
    }

    /// Fold realised PnL into the daily-loss bookkeeping.
    pub fn record_realised_pnl(&mut self, delta: Decimal, now: DateTime<Utc>) {
        self.day_pnl.roll(now);
        self.day_pnl.realised += delta;
    }

    /// Replace the unrealised component of day PnL.
    pub fn set_unrealised_pnl(&mut self, value: Decimal, now: DateTime<Utc>) {
        self.day_pnl.roll(now);
        self.day_pnl.unrealised = value;
    }

    pub fn day_pnl(&self) -> Decimal {
        self.day_pnl.total()
    }

    /// Update the realised-volatility estimate for a symbol, consumed by
    /// the volatility-scaled position limits.
    pub fn set_volatility(&mut self, symbol: Symbol, volatility: Decimal) {
        self.volatilities.insert(symbol, volatility);
    }

    /// Run one signal through the ordered gates, then size it.
    ///
    /// `reference_price` is the entry estimate (book mid when available,
    /// otherwise the last trade); `book` feeds the liquidity gate.
    #[allow(clippy::too_many_arguments)]
    pub fn check(
        &mut self,
        signal: Signal,
        account: &AccountSnapshot,
        book: Option<&OrderBook>,
        reference_price: Decimal,
        breaker: BreakerLevel,
        actions: &ActionState,
        now: DateTime<Utc>,
    ) -> Result<RiskApproved<SizedSignal>, RiskRefused<Signal>> {
        self.day_pnl.roll(now);

        if reference_price <= Decimal::ZERO {
            return Err(RiskRefused::new(
                signal,
                "no reference price for signal".into(),
            ));
        }

        let candidate_quantity = size_signal(&signal, account, &self.limits, reference_price);
        if candidate_quantity <= Decimal::ZERO && signal.is_opening() {
            return Err(RiskRefused::new(signal, "sized quantity is zero".into()));
        }

        let slippage = book.and_then(|book| {
            estimate_slippage(
                book,
                signal.side,
                candidate_quantity.max(Decimal::new(1, 8)),
                &self.slippage_thresholds,
            )
        });

        let ctx = GateContext {
            signal: &signal,
            account,
            candidate_quantity,
            reference_price,
            slippage: slippage.as_ref(),
            breaker,
            actions,
            day_pnl: self.day_pnl.total(),
            volatility: self.volatilities.get(&signal.symbol).copied(),
            last_failure: self
                .failures
                .get(&(signal.symbol.clone(), signal.side))
                .copied(),
            now,
        };

        match self.gates.evaluate(&ctx) {
            GateOutcome::Denied { gate, reason } => {
                debug!(%gate, %reason, signal = %signal.id, "signal refused");
                Err(RiskRefused::new(signal, format!("{gate}: {reason}")))
            }
            GateOutcome::Passed { warnings } => Ok(RiskApproved::new(SizedSignal {
                quantity: candidate_quantity,
                warnings,
                signal,
            })),
        }
    }
}
