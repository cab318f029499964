use chrono::{DateTime, Utc};
use derive_more::Display;
use kestrel_data::{Side, Symbol};
use kestrel_execution::order::{SignalId, StrategyId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What the signal intends to do to the position.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum SignalIntent {
    Open,
    Close,
    Reduce,
}

/// Requested order type.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Market,
    Limit,
    Stop,
    StopLimit,
}

/// A trade intent emitted by a strategy. Consumed exactly once by the risk
/// pipeline: either rejected (terminal) or transformed into orders.
///
/// `time` is the originating bar timestamp, which keeps live runs replayable
/// bar-for-bar.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Signal {
    pub id: SignalId,
    pub strategy: StrategyId,
    pub symbol: Symbol,
    pub side: Side,
    pub intent: SignalIntent,
    pub kind: SignalKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notional: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss_price: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit_price: Option<Decimal>,
    /// Urgency in [0, 1]; drives execution schedule compression.
    pub urgency: Decimal,
    pub time: DateTime<Utc>,
    /// Opaque strategy context carried through to the audit log.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub context: serde_json::Value,
}

impl Signal {
    /// A market-order signal with defaults; strategies refine with the
    /// builder methods.
    pub fn market(
        strategy: StrategyId,
        symbol: Symbol,
        side: Side,
        intent: SignalIntent,
        time: DateTime<Utc>,
        sequence: u64,
    ) -> Self {
        let id = SignalId::new(format!(
            "{}-{}-{}",
            strategy,
            time.timestamp_millis(),
            sequence
        ));
        Self {
            id,
            strategy,
            symbol,
            side,
            intent,
            kind: SignalKind::Market,
            quantity: None,
            notional: None,
            limit_price: None,
            stop_price: None,
            stop_loss_price: None,
            take_profit_price: None,
            urgency: Decimal::new(5, 1),
            time,
            context: serde_json::Value::Null,
        }
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_stop_loss(mut self, price: Decimal) -> Self {
        self.stop_loss_price = Some(price);
        self
    }

    pub fn with_take_profit(mut self, price: Decimal) -> Self {
        self.take_profit_price = Some(price);
        self
    }

    pub fn with_urgency(mut self, urgency: Decimal) -> Self {
        self.urgency = urgency.clamp(Decimal::ZERO, Decimal::ONE);
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = context;
        self
    }

    pub fn is_opening(&self) -> bool {
        matches!(self.intent, SignalIntent::Open)
    }
}
