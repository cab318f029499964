use chrono::{DateTime, Utc};
use derive_more::From;
use kestrel_data::{Symbol, bar::Bar, books::OrderBook, ticker::Ticker};
use kestrel_execution::{
    balance::AccountId,
    order::{Order, OrderId, StrategyId},
};
use kestrel_risk::{breaker::BreakerLevel, event::RiskEvent};
use kestrel_strategy::signal::Signal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// The closed set of events carried on the spine. Every stage publishes;
/// the audit sink subscribes to everything.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, From)]
#[serde(rename_all = "camelCase", tag = "topic")]
pub enum EngineEvent {
    Bar(Bar),
    Ticker(Ticker),
    Book(OrderBook),
    Signal(Signal),
    #[from(ignore)]
    SignalRejected {
        signal: Signal,
        reason: String,
    },
    #[from(ignore)]
    OrderSubmitted(Order),
    #[from(ignore)]
    OrderPartial(Order),
    #[from(ignore)]
    OrderFilled(Order),
    #[from(ignore)]
    OrderFailed {
        order: Order,
        reason: String,
        permanent: bool,
    },
    RiskEvent(RiskEvent),
    #[from(ignore)]
    CircuitBreaker {
        level: BreakerLevel,
        time: DateTime<Utc>,
    },
    #[from(ignore)]
    TradingPaused {
        reason: String,
        time: DateTime<Utc>,
    },
    #[from(ignore)]
    TradingResumed {
        time: DateTime<Utc>,
    },
    #[from(ignore)]
    ConnectionLost {
        symbol: Symbol,
        time: DateTime<Utc>,
    },
    #[from(ignore)]
    ConnectionRestored {
        symbol: Symbol,
        time: DateTime<Utc>,
    },
    #[from(ignore)]
    StrategyStarted {
        strategy: StrategyId,
        time: DateTime<Utc>,
    },
    #[from(ignore)]
    StrategyStopped {
        strategy: StrategyId,
        time: DateTime<Utc>,
    },
    #[from(ignore)]
    EventDropped {
        subscriber: SmolStr,
        count: u64,
        time: DateTime<Utc>,
    },
    #[from(ignore)]
    EngineStarted {
        time: DateTime<Utc>,
    },
    #[from(ignore)]
    EngineStopped {
        time: DateTime<Utc>,
    },
    #[from(ignore)]
    ShutdownForced {
        time: DateTime<Utc>,
    },
    #[from(ignore)]
    Shutdown {
        time: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Topic name, stable across releases; audit records key on it.
    pub fn topic(&self) -> &'static str {
        match self {
            EngineEvent::Bar(_) => "bar",
            EngineEvent::Ticker(_) => "ticker",
            EngineEvent::Book(_) => "book",
            EngineEvent::Signal(_) => "signal",
            EngineEvent::SignalRejected { .. } => "signalRejected",
            EngineEvent::OrderSubmitted(_) => "orderSubmitted",
            EngineEvent::OrderPartial(_) => "orderPartial",
            EngineEvent::OrderFilled(_) => "orderFilled",
            EngineEvent::OrderFailed { .. } => "orderFailed",
            EngineEvent::RiskEvent(_) => "riskEvent",
            EngineEvent::CircuitBreaker { .. } => "circuitBreaker",
            EngineEvent::TradingPaused { .. } => "tradingPaused",
            EngineEvent::TradingResumed { .. } => "tradingResumed",
            EngineEvent::ConnectionLost { .. } => "connectionLost",
            EngineEvent::ConnectionRestored { .. } => "connectionRestored",
            EngineEvent::StrategyStarted { .. } => "strategyStarted",
            EngineEvent::StrategyStopped { .. } => "strategyStopped",
            EngineEvent::EventDropped { .. } => "eventDropped",
            EngineEvent::EngineStarted { .. } => "engineStarted",
            EngineEvent::EngineStopped { .. } => "engineStopped",
            EngineEvent::ShutdownForced { .. } => "shutdownForced",
            EngineEvent::Shutdown { .. } => "shutdown",
        }
    }

    /// Partition key for ordering: market and order events order per
    /// symbol, account events per account. Events without a key share the
    /// global partition.
    pub fn partition_key(&self) -> Option<&str> {
        match self {
            EngineEvent::Bar(bar) => Some(bar.symbol.as_str()),
            EngineEvent::Ticker(ticker) => Some(ticker.symbol.as_str()),
            EngineEvent::Book(book) => Some(book.symbol.as_str()),
            EngineEvent::Signal(signal) => Some(signal.symbol.as_str()),
            EngineEvent::SignalRejected { signal, .. } => Some(signal.symbol.as_str()),
            EngineEvent::OrderSubmitted(order)
            | EngineEvent::OrderPartial(order)
            | EngineEvent::OrderFilled(order) => Some(order.symbol.as_str()),
            EngineEvent::OrderFailed { order, .. } => Some(order.symbol.as_str()),
            EngineEvent::RiskEvent(event) => event
                .account
                .as_ref()
                .map(|account| account.0.as_str())
                .or(event.symbol.as_ref().map(|symbol| symbol.as_str())),
            EngineEvent::ConnectionLost { symbol, .. }
            | EngineEvent::ConnectionRestored { symbol, .. } => Some(symbol.as_str()),
            _ => None,
        }
    }

    /// Severity label used by the audit sink.
    pub fn level(&self) -> &'static str {
        match self {
            EngineEvent::RiskEvent(event) => match event.level {
                kestrel_risk::event::RiskLevel::Info => "info",
                kestrel_risk::event::RiskLevel::Warn => "warn",
                kestrel_risk::event::RiskLevel::Danger => "danger",
                kestrel_risk::event::RiskLevel::Critical => "critical",
                kestrel_risk::event::RiskLevel::Emergency => "emergency",
            },
            EngineEvent::SignalRejected { .. }
            | EngineEvent::OrderFailed { .. }
            | EngineEvent::EventDropped { .. }
            | EngineEvent::ConnectionLost { .. } => "warn",
            EngineEvent::CircuitBreaker { .. }
            | EngineEvent::TradingPaused { .. }
            | EngineEvent::ShutdownForced { .. } => "danger",
            _ => "info",
        }
    }

    /// Event time where the payload carries one.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        match self {
            EngineEvent::Bar(bar) => Some(bar.time),
            EngineEvent::Ticker(ticker) => Some(ticker.time),
            EngineEvent::Book(book) => Some(book.time),
            EngineEvent::Signal(signal) => Some(signal.time),
            EngineEvent::SignalRejected { signal, .. } => Some(signal.time),
            EngineEvent::OrderSubmitted(order)
            | EngineEvent::OrderPartial(order)
            | EngineEvent::OrderFilled(order) => Some(order.updated_at),
            EngineEvent::OrderFailed { order, .. } => Some(order.updated_at),
            EngineEvent::RiskEvent(event) => Some(event.time),
            EngineEvent::CircuitBreaker { time, .. }
            | EngineEvent::TradingPaused { time, .. }
            | EngineEvent::TradingResumed { time }
            | EngineEvent::ConnectionLost { time, .. }
            | EngineEvent::ConnectionRestored { time, .. }
            | EngineEvent::StrategyStarted { time, .. }
            | EngineEvent::StrategyStopped { time, .. }
            | EngineEvent::EventDropped { time, .. }
            | EngineEvent::EngineStarted { time }
            | EngineEvent::EngineStopped { time }
            | EngineEvent::ShutdownForced { time }
            | EngineEvent::Shutdown { time } => Some(*time),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, EngineEvent::Shutdown { .. })
    }

    /// Account the event belongs to, for per-account ordering checks.
    pub fn account(&self) -> Option<&AccountId> {
        match self {
            EngineEvent::RiskEvent(event) => event.account.as_ref(),
            _ => None,
        }
    }

    /// Order id for order lifecycle events.
    pub fn order_id(&self) -> Option<&OrderId> {
        match self {
            EngineEvent::OrderSubmitted(order)
            | EngineEvent::OrderPartial(order)
            | EngineEvent::OrderFilled(order) => Some(&order.id),
            EngineEvent::OrderFailed { order, .. } => Some(&order.id),
            _ => None,
        }
    }
}
