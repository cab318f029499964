use crate::{
    Sequence,
    account::AccountState,
    bus::{BusSubscription, EventBus},
    error::EngineError,
    event::EngineEvent,
};
use chrono::{DateTime, Duration, Utc};
use fnv::FnvHashMap;
use kestrel_audit::{AuditConfig, AuditRecord, AuditWriter, Redactor};
use kestrel_data::{
    Symbol, Venue,
    bar::{Bar, Timeframe},
    engine::MarketEngine,
    event::{MarketEvent, StreamKind},
};
use kestrel_execution::{
    backoff::VenueBackoff,
    balance::{AccountId, AccountSnapshot},
    client::ExecutionClient,
    error::ExecutionError,
    order::{ClientOrderId, Fill, Order, OrderId, OrderKind, OrderStatus, StrategyId},
    plan::Slice,
    planner::{ExecutionPlanner, ExecutionRequest, PlannerConfig},
    slippage::SlippageThresholds,
    tracker::OrderTracker,
};
use kestrel_risk::{
    black_swan::BlackSwanDetector,
    breaker::{BreakerLevel, CircuitBreaker},
    alert::AlertThrottle,
    event::{RiskAction, RiskEvent, RiskLevel},
    limits::RiskLimits,
    monitor::{
        ActionState, ConcentrationMonitor, DrawdownMonitor, LiquidationDistanceMonitor,
        MarginMonitor, MonitorThresholds, action_for,
    },
    pipeline::{RiskPipeline, SizedSignal},
};
use kestrel_strategy::{
    registry::StrategyRegistry, runtime::StrategyRuntime, signal::{Signal, SignalIntent, SignalKind},
};
use kestrel_ta::indicators::AverageTrueRange;
use rand::{SeedableRng, rngs::StdRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{error, info, warn};

/// Engine lifecycle states.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// Exit codes the process reports on shutdown.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ExitCode {
    CleanStop,
    InitFailure,
    ForcedShutdown,
}

impl ExitCode {
    pub fn code(&self) -> i32 {
        match self {
            ExitCode::CleanStop => 0,
            ExitCode::InitFailure => 1,
            ExitCode::ForcedShutdown => 2,
        }
    }
}

/// Engine configuration. Validation is total in [`Engine::new`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub account: AccountId,
    pub venue: Venue,
    pub starting_cash: Decimal,
    pub feed_timeframe: Timeframe,
    pub bar_buffer: usize,
    pub limits: RiskLimits,
    pub planner: PlannerConfig,
    pub slippage: SlippageThresholds,
    pub drawdown_thresholds: MonitorThresholds,
    pub margin_thresholds: MonitorThresholds,
    pub concentration_thresholds: MonitorThresholds,
    pub liquidation_thresholds: MonitorThresholds,
    /// Audit sink configuration and integrity key; `None` disables
    /// persistence (tests that only care about the pipeline).
    pub audit: Option<(AuditConfig, Vec<u8>)>,
    pub bus_queue_capacity: usize,
    pub shutdown_grace: Duration,
    /// Deadline on every outbound venue call; expiry marks the order
    /// rejected with a timeout.
    pub venue_call_timeout_ms: u64,
    /// Seed for execution jitter, fixed for replayable runs.
    pub rng_seed: u64,
}

impl EngineConfig {
    pub fn new(account: AccountId, venue: Venue, starting_cash: Decimal) -> Self {
        Self {
            account,
            venue,
            starting_cash,
            feed_timeframe: Timeframe::M5,
            bar_buffer: 1024,
            limits: RiskLimits::default(),
            planner: PlannerConfig::default(),
            slippage: SlippageThresholds::default(),
            drawdown_thresholds: MonitorThresholds {
                warn: Decimal::new(5, 2),
                danger: Decimal::new(1, 1),
                critical: Decimal::new(2, 1),
            },
            margin_thresholds: MonitorThresholds {
                warn: Decimal::new(5, 1),
                danger: Decimal::new(4, 1),
                critical: Decimal::new(35, 2),
            },
            concentration_thresholds: MonitorThresholds {
                warn: Decimal::new(25, 2),
                danger: Decimal::new(4, 1),
                critical: Decimal::new(6, 1),
            },
            liquidation_thresholds: MonitorThresholds {
                warn: Decimal::new(15, 2),
                danger: Decimal::new(1, 1),
                critical: Decimal::new(5, 2),
            },
            audit: None,
            bus_queue_capacity: 4096,
            shutdown_grace: Duration::seconds(30),
            venue_call_timeout_ms: 10_000,
            rng_seed: 0,
        }
    }

    /// Overlay the environment inputs the core consumes: audit directory
    /// and integrity key (`KESTREL_AUDIT_DIR` / `KESTREL_AUDIT_KEY`) and
    /// the symbol allow-list (`KESTREL_ALLOWED_SYMBOLS`, comma separated).
    pub fn apply_env(mut self) -> Self {
        if let (Ok(directory), Ok(key)) = (
            std::env::var("KESTREL_AUDIT_DIR"),
            std::env::var("KESTREL_AUDIT_KEY"),
        ) {
            self.audit = Some((AuditConfig::new(directory), key.into_bytes()));
        }
        if let Ok(symbols) = std::env::var("KESTREL_ALLOWED_SYMBOLS") {
            self.limits.allowed_symbols = symbols
                .split(',')
                .map(str::trim)
                .filter(|symbol| !symbol.is_empty())
                .map(Symbol::new)
                .collect();
        }
        self
    }
}

/// Point-in-time engine status for the operator surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineStatus {
    pub state: EngineState,
    pub started_at: Option<DateTime<Utc>>,
    pub running_strategies: Vec<StrategyId>,
    pub working_orders: usize,
    pub breaker: BreakerLevel,
    pub trading_paused: bool,
    pub events_published: u64,
}

/// A plan slice waiting for its schedule time.
#[derive(Debug, Clone)]
struct PendingSlice {
    signal: Signal,
    slice: Slice,
    slice_index: usize,
}

/// The orchestrator. Owns every component, wires them through the bus,
/// and drives the signal-to-execution pipeline.
///
/// Lifecycle: `Stopped -> Starting -> Running -> Stopping -> Stopped`.
pub struct Engine {
    config: EngineConfig,
    state: EngineState,
    started_at: Option<DateTime<Utc>>,

    bus: EventBus,
    sequence: Sequence,
    audit_subscription: Option<BusSubscription>,
    audit: Option<AuditWriter>,

    market: MarketEngine,
    market_streams: Vec<UnboundedReceiver<MarketEvent>>,
    registry: StrategyRegistry,
    runtime: StrategyRuntime,

    pipeline: RiskPipeline,
    breaker: CircuitBreaker,
    detectors: FnvHashMap<Symbol, BlackSwanDetector>,
    atr: FnvHashMap<Symbol, AverageTrueRange>,
    atr_pct: FnvHashMap<Symbol, Decimal>,
    actions: ActionState,
    drawdown_monitor: DrawdownMonitor,
    margin_monitor: MarginMonitor,
    concentration_monitor: ConcentrationMonitor,
    liquidation_monitor: LiquidationDistanceMonitor,
    throttle: AlertThrottle,

    planner: ExecutionPlanner,
    tracker: OrderTracker,
    pending_slices: Vec<PendingSlice>,
    client: Arc<dyn ExecutionClient>,
    backoff: VenueBackoff,
    account: AccountState,

    rng: StdRng,
    order_counter: u64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.state)
            .field("sequence", &self.sequence)
            .finish()
    }
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        client: Arc<dyn ExecutionClient>,
        now: DateTime<Utc>,
    ) -> Result<Self, EngineError> {
        config.limits.validate()?;
        let pipeline = RiskPipeline::new(config.limits.clone(), config.slippage)?;

        let bus = EventBus::new();
        let (audit_subscription, audit) = match &config.audit {
            Some((audit_config, integrity_key)) => {
                let writer = AuditWriter::new(
                    audit_config.clone(),
                    Redactor::default(),
                    integrity_key.clone(),
                )?;
                (
                    Some(bus.subscribe("audit", config.bus_queue_capacity)),
                    Some(writer),
                )
            }
            None => (None, None),
        };

        let account = AccountState::new(
            config.account.clone(),
            config.venue,
            config.starting_cash,
            now,
        );

        Ok(Self {
            market: MarketEngine::new(config.feed_timeframe, config.bar_buffer),
            market_streams: Vec::new(),
            registry: StrategyRegistry::with_builtin(),
            runtime: StrategyRuntime::new(),
            breaker: CircuitBreaker::default(),
            detectors: FnvHashMap::default(),
            atr: FnvHashMap::default(),
            atr_pct: FnvHashMap::default(),
            actions: ActionState::new(),
            drawdown_monitor: DrawdownMonitor::new(config.drawdown_thresholds),
            margin_monitor: MarginMonitor::new(config.margin_thresholds),
            concentration_monitor: ConcentrationMonitor::new(config.concentration_thresholds),
            liquidation_monitor: LiquidationDistanceMonitor::new(config.liquidation_thresholds),
            throttle: AlertThrottle::default(),
            planner: ExecutionPlanner::new(config.planner.clone()),
            tracker: OrderTracker::default(),
            pending_slices: Vec::new(),
            client,
            backoff: VenueBackoff::default(),
            account,
            rng: StdRng::seed_from_u64(config.rng_seed),
            order_counter: 0,
            sequence: Sequence(0),
            state: EngineState::Stopped,
            started_at: None,
            audit_subscription,
            audit,
            bus,
            pipeline,
            config,
        })
    }

    /// Subscribe an external consumer to the spine.
    pub fn subscribe(&self, name: impl AsRef<str>) -> BusSubscription {
        self.bus.subscribe(name, self.config.bus_queue_capacity)
    }

    /// Idempotent start.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.state == EngineState::Running {
            return Ok(());
        }
        self.state = EngineState::Starting;
        self.started_at = Some(now);
        info!(venue = %self.config.venue, "engine starting");
        self.state = EngineState::Running;
        self.publish(EngineEvent::EngineStarted { time: now });
        Ok(())
    }

    /// Register market streams for a symbol. Strategies receive every
    /// subscribed timeframe.
    pub fn watch_symbol(
        &mut self,
        symbol: Symbol,
        timeframes: &[Timeframe],
    ) -> Result<(), EngineError> {
        for timeframe in timeframes {
            let (_, receiver) = self
                .market
                .subscribe(symbol.clone(), StreamKind::Bars(*timeframe))?;
            self.market_streams.push(receiver);
        }
        self.detectors
            .entry(symbol.clone())
            .or_insert_with(BlackSwanDetector::default);
        self.atr
            .entry(symbol)
            .or_insert_with(|| AverageTrueRange::new(14));
        Ok(())
    }

    /// Build, validate and start a strategy instance.
    pub fn run_strategy(
        &mut self,
        id: StrategyId,
        name: &str,
        params: &serde_json::Value,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.runtime.add(&self.registry, id.clone(), name, params)?;
        self.runtime.start(&id)?;
        self.publish(EngineEvent::StrategyStarted {
            strategy: id,
            time: now,
        });
        Ok(())
    }

    /// Scope which streams a strategy instance receives.
    pub fn set_strategy_filter(
        &mut self,
        id: &StrategyId,
        filter: kestrel_strategy::runtime::StreamFilter,
    ) -> Result<(), EngineError> {
        self.runtime.set_filter(id, filter)?;
        Ok(())
    }

    pub fn stop_strategy(&mut self, id: &StrategyId, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.runtime.stop(id)?;
        self.runtime.finish_stop(id)?;
        self.publish(EngineEvent::StrategyStopped {
            strategy: id.clone(),
            time: now,
        });
        Ok(())
    }

    /// Ingest one feed bar and run the pipeline end to end: fan-out,
    /// strategy callbacks, risk gates, planning, submission.
    pub async fn on_bar(&mut self, bar: Bar, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.state != EngineState::Running {
            return Ok(());
        }
        self.market.feed_bar(bar)?;

        // Drain the per-stream channels in registration order; bars within
        // one stream stay strictly ordered.
        let mut delivered: Vec<MarketEvent> = Vec::new();
        for stream in &mut self.market_streams {
            while let Ok(event) = stream.try_recv() {
                delivered.push(event);
            }
        }

        let mut signals: Vec<Signal> = Vec::new();
        for event in delivered {
            match event {
                MarketEvent::Bar(bar) => {
                    self.observe_bar(&bar, now);
                    self.publish(EngineEvent::Bar(bar.clone()));
                    signals.extend(self.runtime.on_bar(&bar));
                }
                MarketEvent::Gap {
                    symbol,
                    timeframe,
                    expected,
                    actual,
                } => {
                    let event = RiskEvent::new("market_data", "dataGap", RiskLevel::Warn, now)
                        .with_symbol(symbol)
                        .with_payload(serde_json::json!({
                            "timeframe": timeframe.to_string(),
                            "expected": expected.to_rfc3339(),
                            "actual": actual.to_rfc3339(),
                        }));
                    self.publish_risk_event(event, now);
                }
                MarketEvent::FeedInterrupted { symbol } => {
                    self.publish(EngineEvent::ConnectionLost { symbol, time: now });
                }
                MarketEvent::FeedRestored { symbol } => {
                    self.publish(EngineEvent::ConnectionRestored { symbol, time: now });
                }
                MarketEvent::Ticker(ticker) => {
                    signals.extend(self.runtime.on_ticker(&ticker));
                    self.publish(EngineEvent::Ticker(ticker));
                }
                MarketEvent::Book(book) => {
                    signals.extend(self.runtime.on_book(&book));
                    self.publish(EngineEvent::Book(book));
                }
            }
        }

        for signal in signals {
            self.process_signal(signal, now).await;
        }
        self.pump_audit()?;
        Ok(())
    }

    /// Ingest a ticker snapshot: strategies see it, the bus carries it.
    pub async fn on_ticker(
        &mut self,
        ticker: kestrel_data::ticker::Ticker,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if self.state != EngineState::Running {
            return Ok(());
        }
        self.account.mark(&ticker.symbol, ticker.last, now);
        self.market.feed_ticker(ticker.clone());
        let signals = self.runtime.on_ticker(&ticker);
        self.publish(EngineEvent::Ticker(ticker));
        for signal in signals {
            self.process_signal(signal, now).await;
        }
        self.pump_audit()?;
        Ok(())
    }

    /// Ingest an order book snapshot: feeds the depth-collapse detector and
    /// the slippage model used by gates and planning.
    pub async fn on_book(
        &mut self,
        book: kestrel_data::books::OrderBook,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        if self.state != EngineState::Running {
            return Ok(());
        }
        let trigger = self
            .detectors
            .get_mut(&book.symbol)
            .and_then(|detector| detector.on_book(&book));
        if let Some(trigger) = trigger {
            let level = trigger.level();
            let event = RiskEvent::new("black_swan", "blackSwan", RiskLevel::Critical, now)
                .with_symbol(book.symbol.clone())
                .with_payload(serde_json::to_value(&trigger).unwrap_or_default());
            self.publish_risk_event(event, now);
            self.escalate_breaker(level, now);
        }

        self.market.feed_book(book.clone());
        let signals = self.runtime.on_book(&book);
        self.publish(EngineEvent::Book(book));
        for signal in signals {
            self.process_signal(signal, now).await;
        }
        self.pump_audit()?;
        Ok(())
    }

    /// Track ATR and feed the black-swan detector for the bar's symbol.
    fn observe_bar(&mut self, bar: &Bar, now: DateTime<Utc>) {
        self.account.mark(&bar.symbol, bar.close, now);

        let atr_pct = self
            .atr
            .get_mut(&bar.symbol)
            .and_then(|atr| atr.update(bar.high, bar.low, bar.close))
            .and_then(|atr| {
                if bar.close.is_zero() {
                    None
                } else {
                    Some(atr / bar.close)
                }
            })
            .unwrap_or(Decimal::ZERO);
        self.atr_pct.insert(bar.symbol.clone(), atr_pct);

        let trigger = self
            .detectors
            .get_mut(&bar.symbol)
            .and_then(|detector| detector.on_price(bar.time, bar.close, atr_pct));

        if let Some(trigger) = trigger {
            let level = trigger.level();
            let event = RiskEvent::new("black_swan", "blackSwan", RiskLevel::Critical, now)
                .with_symbol(bar.symbol.clone())
                .with_payload(serde_json::to_value(&trigger).unwrap_or_default());
            self.publish_risk_event(event, now);
            self.escalate_breaker(level, now);
        }
    }

    /// Run one signal through risk, then plan and submit.
    async fn process_signal(&mut self, signal: Signal, now: DateTime<Utc>) {
        let snapshot = self.account.snapshot();
        let book = self.market.latest_book(&signal.symbol).cloned();
        let reference_price = book
            .as_ref()
            .and_then(|book| book.mid_price())
            .or_else(|| {
                self.market
                    .latest_bar(&signal.symbol, self.config.feed_timeframe)
                    .map(|bar| bar.close)
            })
            .unwrap_or(Decimal::ZERO);

        self.publish(EngineEvent::Signal(signal.clone()));
        let outcome = self.pipeline.check(
            signal,
            &snapshot,
            book.as_ref(),
            reference_price,
            self.breaker.level(),
            &self.actions,
            now,
        );

        match outcome {
            Err(refused) => {
                info!(signal = %refused.item.id, reason = %refused.reason, "signal rejected");
                self.publish(EngineEvent::SignalRejected {
                    signal: refused.item,
                    reason: refused.reason,
                });
            }
            Ok(approved) => {
                let sized = approved.into_item();
                self.execute_sized(sized, book.as_ref(), now).await;
            }
        }
    }

    /// Plan an accepted signal and submit the slices that are due now;
    /// later slices wait for the monitor tick.
    async fn execute_sized(
        &mut self,
        sized: SizedSignal,
        book: Option<&kestrel_data::books::OrderBook>,
        now: DateTime<Utc>,
    ) {
        let request = ExecutionRequest {
            symbol: sized.signal.symbol.clone(),
            side: sized.signal.side,
            quantity: sized.quantity,
            urgency: sized.signal.urgency,
        };

        let plan = match book {
            Some(book) => {
                let adv = self.average_daily_volume(&sized.signal.symbol);
                self.planner.plan(&request, book, adv, now, &mut self.rng)
            }
            // No book: a single immediate slice, the venue decides.
            None => kestrel_execution::plan::ExecutionPlan::new(
                kestrel_execution::plan::ExecutionAlgorithm::Immediate,
                sized.quantity,
                vec![Slice::new(sized.quantity, now)],
                now,
            ),
        };

        let plan = match plan {
            Ok(plan) => plan,
            Err(error) => {
                warn!(%error, "execution planning failed");
                self.publish(EngineEvent::SignalRejected {
                    signal: sized.signal,
                    reason: format!("planning: {error}"),
                });
                return;
            }
        };

        for (index, slice) in plan.slices.iter().enumerate() {
            if slice.scheduled_at <= now {
                self.submit_slice(&sized.signal, slice, index, now).await;
            } else {
                self.pending_slices.push(PendingSlice {
                    signal: sized.signal.clone(),
                    slice: slice.clone(),
                    slice_index: index,
                });
            }
        }
    }

    async fn submit_slice(
        &mut self,
        signal: &Signal,
        slice: &Slice,
        slice_index: usize,
        now: DateTime<Utc>,
    ) {
        self.order_counter += 1;
        let kind = match signal.kind {
            SignalKind::Market => OrderKind::Market,
            SignalKind::Limit => OrderKind::Limit,
            SignalKind::Stop => OrderKind::Stop,
            SignalKind::StopLimit => OrderKind::StopLimit,
        };
        let order = Order::new(
            OrderId::new(format!("k-{}", self.order_counter)),
            ClientOrderId::random(&mut self.rng),
            signal.symbol.clone(),
            self.config.venue,
            signal.side,
            kind,
            signal.limit_price,
            slice.quantity,
            signal.strategy.clone(),
            signal.id.clone(),
            now,
        );

        let order = match order {
            Ok(order) => order.with_slice_index(slice_index),
            Err(error) => {
                warn!(%error, "malformed order slice");
                return;
            }
        };

        let deadline = std::time::Duration::from_millis(self.config.venue_call_timeout_ms);
        let response = match tokio::time::timeout(deadline, self.client.open_order(order.clone()))
            .await
        {
            Ok(response) => response,
            Err(_) => Err(ExecutionError::Timeout {
                venue: self.config.venue,
                timeout_ms: self.config.venue_call_timeout_ms,
            }),
        };
        match response {
            Ok(acknowledged) => {
                self.backoff.record_success(self.config.venue);
                self.publish(EngineEvent::OrderSubmitted(acknowledged.clone()));
                match acknowledged.status {
                    OrderStatus::Filled | OrderStatus::PartiallyFilled => {
                        self.absorb_venue_fill(&acknowledged, now);
                    }
                    _ => self.tracker.insert(acknowledged),
                }
            }
            Err(error) => {
                self.handle_submit_failure(order, error, now);
            }
        }
    }

    /// The mock (and fast venues) can acknowledge with fills already
    /// applied; fold them straight into position state.
    fn absorb_venue_fill(&mut self, order: &Order, now: DateTime<Utc>) {
        let fill = Fill::new(
            order.id.clone(),
            order.symbol.clone(),
            order.side,
            order.average_fill_price,
            order.filled_quantity,
            Decimal::ZERO,
            now,
        );
        let realised = self.account.apply_fill(&fill);
        self.pipeline.record_realised_pnl(realised, now);
        self.record_slippage_feedback(order);
        if order.status == OrderStatus::Filled {
            self.publish(EngineEvent::OrderFilled(order.clone()));
        } else {
            self.tracker.insert(order.clone());
            self.publish(EngineEvent::OrderPartial(order.clone()));
        }
    }

    /// Feed the adaptive planner's realised-vs-predicted slippage loop.
    fn record_slippage_feedback(&mut self, order: &Order) {
        let Some(book) = self.market.latest_book(&order.symbol).cloned() else {
            return;
        };
        let Some(mid) = book.mid_price() else { return };
        if mid.is_zero() || order.filled_quantity.is_zero() {
            return;
        }
        let realised = match order.side {
            kestrel_data::Side::Buy => (order.average_fill_price - mid) / mid,
            kestrel_data::Side::Sell => (mid - order.average_fill_price) / mid,
        }
        .max(Decimal::ZERO);
        let predicted = kestrel_execution::slippage::estimate_slippage(
            &book,
            order.side,
            order.filled_quantity,
            &self.config.slippage,
        )
        .map(|estimate| estimate.slippage)
        .unwrap_or(realised);
        self.planner.feedback_mut().record(predicted, realised);
    }

    fn handle_submit_failure(&mut self, order: Order, error: ExecutionError, now: DateTime<Utc>) {
        let permanent = !error.is_transient();
        if error.is_transient() {
            let delay = self.backoff.record_failure(self.config.venue);
            warn!(%error, backoff_ms = delay.num_milliseconds(), "transient venue failure");
        } else {
            error!(%error, "permanent venue failure");
        }
        self.pipeline
            .record_failure(order.symbol.clone(), order.side, now);

        let mut failed = order;
        let _ = failed.reject(now);
        let event = RiskEvent::new(
            "execution",
            "orderFailed",
            if permanent {
                RiskLevel::Danger
            } else {
                RiskLevel::Warn
            },
            now,
        )
        .with_symbol(failed.symbol.clone())
        .with_payload(serde_json::json!({ "reason": error.to_string() }));
        self.publish_risk_event(event, now);
        self.publish(EngineEvent::OrderFailed {
            order: failed,
            reason: error.to_string(),
            permanent,
        });
    }

    /// Record a fill pushed by the venue for a resting order.
    pub fn record_fill(&mut self, fill: Fill, now: DateTime<Utc>) -> Result<(), EngineError> {
        let updated = self.tracker.apply_fill(&fill)?;
        let realised = self.account.apply_fill(&fill);
        self.pipeline.record_realised_pnl(realised, now);
        self.record_slippage_feedback(&updated);
        if updated.status == OrderStatus::Filled {
            self.publish(EngineEvent::OrderFilled(updated));
        } else {
            self.publish(EngineEvent::OrderPartial(updated));
        }
        self.pump_audit()?;
        Ok(())
    }

    /// Periodic monitor pass: continuous risk monitors, breaker
    /// de-escalation, due execution slices, bus overflow accounting.
    pub async fn tick(&mut self, now: DateTime<Utc>) -> Result<(), EngineError> {
        if self.state != EngineState::Running {
            return Ok(());
        }
        let snapshot = self.account.snapshot();
        self.pipeline
            .set_unrealised_pnl(self.account.unrealised_pnl(), now);

        // Continuous monitors.
        let mut events: Vec<RiskEvent> = Vec::new();
        if let Some(event) = self.drawdown_monitor.update(snapshot.equity, now) {
            events.push(event);
        }
        if let Some(event) = self.margin_monitor.assess(&snapshot, now) {
            events.push(event);
        }
        events.extend(self.concentration_monitor.assess(&snapshot, now));
        let marks: Vec<(Symbol, Decimal)> = snapshot
            .positions
            .iter()
            .filter_map(|position| {
                self.market
                    .latest_bar(&position.symbol, self.config.feed_timeframe)
                    .map(|bar| (position.symbol.clone(), bar.close))
            })
            .collect();
        events.extend(self.liquidation_monitor.assess(&snapshot, &marks, now));

        for event in events {
            let level = event.level;
            let symbol = event.symbol.clone();
            let kind = event.kind.clone();
            if self.publish_risk_event(event, now) {
                self.apply_action(action_for(level), &format!("{kind} {level}"), symbol, now)
                    .await;
            }
        }

        // Breaker de-escalation once every detector reads calm at its
        // symbol's current ATR.
        let calm = self.detectors.iter().all(|(symbol, detector)| {
            let atr_pct = self
                .atr_pct
                .get(symbol)
                .copied()
                .unwrap_or(Decimal::new(5, 3));
            detector.is_calm(atr_pct)
        });
        if let Some(level) = self.breaker.maybe_deescalate(now, calm) {
            self.publish(EngineEvent::CircuitBreaker { level, time: now });
            if level == BreakerLevel::Normal && self.actions.resume_trading() {
                self.publish(EngineEvent::TradingResumed { time: now });
            }
        }

        // Due execution slices.
        let due: Vec<PendingSlice> = {
            let (due, rest): (Vec<_>, Vec<_>) = self
                .pending_slices
                .drain(..)
                .partition(|pending| pending.slice.scheduled_at <= now);
            self.pending_slices = rest;
            due
        };
        for pending in due {
            self.submit_slice(&pending.signal, &pending.slice, pending.slice_index, now)
                .await;
        }

        // Bus overflow accounting.
        for (subscriber, count) in self.bus.collect_drops() {
            self.publish(EngineEvent::EventDropped {
                subscriber,
                count,
                time: now,
            });
        }

        if let Some(audit) = &self.audit {
            let _ = audit.sweep_retention(now);
        }
        self.pump_audit()?;
        Ok(())
    }

    /// Escalate the circuit breaker and apply the armed level's actions.
    fn escalate_breaker(&mut self, level: BreakerLevel, now: DateTime<Utc>) {
        let Some(armed_actions) = self.breaker.arm(level, now) else {
            return;
        };
        self.publish(EngineEvent::CircuitBreaker {
            level: self.breaker.level(),
            time: now,
        });
        for action in armed_actions {
            // Breaker actions are synchronous: cancellation is queued via
            // the tracker, venue cancels follow on the next tick.
            match action {
                RiskAction::CancelWorking => {
                    let cancelled = self.tracker.drain_cancelled(None, now);
                    for order in cancelled {
                        self.publish(EngineEvent::OrderFailed {
                            order,
                            reason: "cancelled by circuit breaker".into(),
                            permanent: false,
                        });
                    }
                    self.pending_slices.clear();
                }
                RiskAction::PauseTrading => {
                    if self.actions.pause_trading(format!("circuit breaker {level}")) {
                        self.publish(EngineEvent::TradingPaused {
                            reason: format!("circuit breaker {level}"),
                            time: now,
                        });
                    }
                }
                RiskAction::ReduceNewExposure => {
                    self.actions.reduce_new_exposure();
                }
                RiskAction::Notify | RiskAction::ForceClose => {}
            }
        }
    }

    /// Apply a monitor-driven action. Idempotent by way of [`ActionState`].
    async fn apply_action(
        &mut self,
        action: RiskAction,
        reason: &str,
        symbol: Option<Symbol>,
        now: DateTime<Utc>,
    ) {
        match action {
            RiskAction::Notify => {}
            RiskAction::ReduceNewExposure => {
                if let Some(symbol) = symbol {
                    self.actions.set_symbol_reduce_only(symbol);
                } else {
                    self.actions.reduce_new_exposure();
                }
            }
            RiskAction::PauseTrading => {
                if self.actions.pause_trading(reason) {
                    self.publish(EngineEvent::TradingPaused {
                        reason: reason.to_string(),
                        time: now,
                    });
                }
            }
            RiskAction::CancelWorking => {
                self.cancel_working(None, now).await;
            }
            RiskAction::ForceClose => {
                if self.actions.pause_trading(reason) {
                    self.publish(EngineEvent::TradingPaused {
                        reason: reason.to_string(),
                        time: now,
                    });
                }
                self.cancel_working(None, now).await;
                self.force_close_positions(now).await;
            }
        }
    }

    async fn cancel_working(&mut self, symbol: Option<&Symbol>, now: DateTime<Utc>) {
        let _ = self.client.cancel_all(symbol).await;
        let cancelled = self.tracker.drain_cancelled(symbol, now);
        for order in cancelled {
            self.publish(EngineEvent::OrderFailed {
                order,
                reason: "cancelled by risk action".into(),
                permanent: false,
            });
        }
        self.pending_slices
            .retain(|pending| symbol.is_some_and(|symbol| &pending.signal.symbol != symbol));
    }

    /// Emergency unwind: close every open position at market.
    async fn force_close_positions(&mut self, now: DateTime<Utc>) {
        let snapshot = self.account.snapshot();
        for position in snapshot.positions {
            let Some(side) = position.side() else { continue };
            let close_signal = Signal::market(
                StrategyId::new("risk_engine"),
                position.symbol.clone(),
                side.opposite(),
                SignalIntent::Close,
                now,
                self.sequence.value(),
            )
            .with_quantity(position.quantity.abs())
            .with_urgency(Decimal::ONE);
            let slice = Slice::new(position.quantity.abs(), now);
            self.submit_slice(&close_signal, &slice, 0, now).await;
        }
    }

    /// Graceful stop: refuse new signals, cancel working orders, drain
    /// in-flight fills up to the grace deadline, stop market data, flush
    /// audit, announce.
    pub async fn stop(&mut self, now: DateTime<Utc>) -> ExitCode {
        if self.state == EngineState::Stopped {
            return ExitCode::CleanStop;
        }
        self.state = EngineState::Stopping;
        info!("engine stopping");

        // (1) No new signals: stop every running strategy.
        for id in self.runtime.running() {
            let _ = self.runtime.stop(&id);
            let _ = self.runtime.finish_stop(&id);
            self.publish(EngineEvent::StrategyStopped {
                strategy: id,
                time: now,
            });
        }

        // (2) Cancel all working orders. Only cancels the venue confirms
        // leave the tracker; anything else stays working and must drain.
        self.pending_slices.clear();
        match self.client.cancel_all(None).await {
            Ok(cancelled_ids) => {
                for order in self.tracker.working(None) {
                    if !cancelled_ids.contains(&order.id) {
                        continue;
                    }
                    if let Ok(cancelled) = self.tracker.cancel(&order.symbol, &order.id, now) {
                        self.publish(EngineEvent::OrderFailed {
                            order: cancelled,
                            reason: "cancelled on shutdown".into(),
                            permanent: false,
                        });
                    }
                }
            }
            Err(error) => {
                warn!(%error, "venue cancel-all failed during shutdown");
            }
        }

        // (3) Drain in-flight fills up to the grace deadline. Orders still
        // working when it passes are abandoned with a forced shutdown.
        let grace = self.config.shutdown_grace.to_std().unwrap_or_default();
        let drained = tokio::time::timeout(grace, async {
            while !self.tracker.is_empty() {
                tokio::time::sleep(std::time::Duration::from_millis(25)).await;
            }
        })
        .await;
        let forced = drained.is_err();
        if forced {
            warn!(
                abandoned = self.tracker.len(),
                "grace deadline passed with orders still working"
            );
            self.publish(EngineEvent::ShutdownForced { time: now });
        }

        // (4) Market data stops with its subscriptions.
        self.market_streams.clear();

        // (5) Flush the audit sink.
        self.publish(EngineEvent::EngineStopped { time: now });
        if let Err(error) = self.pump_audit() {
            error!(%error, "audit flush failed during shutdown");
        }

        self.state = EngineState::Stopped;
        info!("engine stopped");
        if forced {
            ExitCode::ForcedShutdown
        } else {
            ExitCode::CleanStop
        }
    }

    /// Run until the process receives SIGINT/SIGTERM, ticking monitors
    /// once per second.
    pub async fn run_until_shutdown(&mut self) -> Result<ExitCode, EngineError> {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick(Utc::now()).await?;
                }
                _ = shutdown_signal() => {
                    self.publish(EngineEvent::Shutdown { time: Utc::now() });
                    return Ok(self.stop(Utc::now()).await);
                }
            }
        }
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.state,
            started_at: self.started_at,
            running_strategies: self.runtime.running(),
            working_orders: self.tracker.len(),
            breaker: self.breaker.level(),
            trading_paused: self.actions.is_trading_paused(),
            events_published: self.sequence.value(),
        }
    }

    pub fn query_account(&self) -> AccountSnapshot {
        self.account.snapshot()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    /// Rough ADV from the cached feed-timeframe history.
    fn average_daily_volume(&self, symbol: &Symbol) -> Option<Decimal> {
        let bars = self.market.bars(symbol, self.config.feed_timeframe);
        if bars.is_empty() {
            return None;
        }
        let total: Decimal = bars.iter().map(|bar| bar.volume).sum();
        let mean = total / Decimal::from(bars.len() as u64);
        let per_day = 86_400 / self.config.feed_timeframe.seconds().max(1);
        Some(mean * Decimal::from(per_day as u64))
    }

    /// Publish, throttled, as both a risk event and an action trigger.
    /// Returns true when the event was delivered (not suppressed).
    fn publish_risk_event(&mut self, event: RiskEvent, _now: DateTime<Utc>) -> bool {
        match self.throttle.filter(event) {
            Some(delivered) => {
                self.publish(EngineEvent::RiskEvent(delivered));
                true
            }
            None => false,
        }
    }

    fn publish(&mut self, event: EngineEvent) {
        self.sequence.fetch_add();
        self.bus.publish(&event);
    }

    /// Drain the audit subscription into the chained writer.
    fn pump_audit(&mut self) -> Result<(), EngineError> {
        let (Some(subscription), Some(writer)) = (&self.audit_subscription, &mut self.audit)
        else {
            return Ok(());
        };
        for event in subscription.drain() {
            let ts = event.time().unwrap_or_else(Utc::now);
            let record = AuditRecord::new(
                format!("{}-{}", event.topic(), self.sequence.value()),
                ts,
                event.topic(),
                event.level(),
                serde_json::to_value(&event).unwrap_or_default(),
            );
            writer.append(record)?;
        }
        Ok(())
    }
}

/// Resolves when the process receives SIGINT or SIGTERM.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(error) => {
                error!(%error, "SIGTERM handler failed, falling back to SIGINT only");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                if let Err(error) = result {
                    error!(%error, "SIGINT handler failed");
                }
            }
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
