use crate::error::ExecutionError;
use chrono::{DateTime, Utc};
use derive_more::{Constructor, Display, From};
use kestrel_data::{Side, Symbol, Venue};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Venue-assigned order identifier.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct OrderId(pub SmolStr);

impl OrderId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id))
    }
}

/// Client-assigned order identifier, unique per engine run.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct ClientOrderId(pub SmolStr);

impl ClientOrderId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id))
    }

    /// Generate a random alphanumeric id.
    pub fn random<R: Rng>(rng: &mut R) -> Self {
        let id: String = (0..20)
            .map(|_| {
                const CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
                let index = rng.random_range(0..CHARSET.len());
                CHARSET[index] as char
            })
            .collect();
        Self(SmolStr::new(id))
    }
}

/// Identifier of the strategy an order originated from.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct StrategyId(pub SmolStr);

impl StrategyId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id))
    }
}

/// Identifier of the signal an order realises.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display, From,
)]
pub struct SignalId(pub SmolStr);

impl SignalId {
    pub fn new(id: impl AsRef<str>) -> Self {
        Self(SmolStr::new(id))
    }
}

#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    Market,
    Limit,
    Stop,
    StopLimit,
}

/// Order status. Transitions are monotone:
/// `New -> PartiallyFilled -> Filled | Cancelled | Rejected`.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    New,
    PartiallyFilled,
    Filled,
    Cancelled,
    Rejected,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled | OrderStatus::Cancelled | OrderStatus::Rejected
        )
    }
}

/// One execution against a working order.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Constructor)]
pub struct Fill {
    pub order_id: OrderId,
    pub symbol: Symbol,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub fee: Decimal,
    pub time: DateTime<Utc>,
}

/// A working or terminal order owned by the execution layer.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub client_id: ClientOrderId,
    pub symbol: Symbol,
    pub venue: Venue,
    pub side: Side,
    pub kind: OrderKind,
    pub price: Option<Decimal>,
    pub quantity: Decimal,
    pub filled_quantity: Decimal,
    pub average_fill_price: Decimal,
    pub status: OrderStatus,
    pub strategy: StrategyId,
    pub parent_signal: SignalId,
    /// Index of the execution-plan slice this order realises, if sliced.
    pub slice_index: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: OrderId,
        client_id: ClientOrderId,
        symbol: Symbol,
        venue: Venue,
        side: Side,
        kind: OrderKind,
        price: Option<Decimal>,
        quantity: Decimal,
        strategy: StrategyId,
        parent_signal: SignalId,
        created_at: DateTime<Utc>,
    ) -> Result<Self, ExecutionError> {
        if quantity <= Decimal::ZERO {
            return Err(ExecutionError::Validation(format!(
                "order quantity must be positive, got {quantity}"
            )));
        }
        if matches!(kind, OrderKind::Limit | OrderKind::StopLimit) && price.is_none() {
            return Err(ExecutionError::Validation(format!(
                "{kind} order requires a price"
            )));
        }
        if let Some(price) = price {
            if price <= Decimal::ZERO {
                return Err(ExecutionError::Validation(format!(
                    "order price must be positive, got {price}"
                )));
            }
        }
        Ok(Self {
            id,
            client_id,
            symbol,
            venue,
            side,
            kind,
            price,
            quantity,
            filled_quantity: Decimal::ZERO,
            average_fill_price: Decimal::ZERO,
            status: OrderStatus::New,
            strategy,
            parent_signal,
            slice_index: None,
            created_at,
            updated_at: created_at,
        })
    }

    pub fn with_slice_index(mut self, index: usize) -> Self {
        self.slice_index = Some(index);
        self
    }

    pub fn remaining_quantity(&self) -> Decimal {
        self.quantity - self.filled_quantity
    }

    /// Fold a fill in, keeping `filled_quantity <= quantity` and the status
    /// transition monotone. Over-fills and fills against terminal orders are
    /// rejected.
    pub fn apply_fill(&mut self, fill: &Fill) -> Result<(), ExecutionError> {
        if self.status.is_terminal() {
            return Err(ExecutionError::AlreadyTerminal(self.id.clone()));
        }
        if fill.quantity <= Decimal::ZERO {
            return Err(ExecutionError::Validation(format!(
                "fill quantity must be positive, got {}",
                fill.quantity
            )));
        }
        if self.filled_quantity + fill.quantity > self.quantity {
            return Err(ExecutionError::Validation(format!(
                "fill {} over-fills order {} ({} of {} filled)",
                fill.quantity, self.id, self.filled_quantity, self.quantity
            )));
        }

        let notional_before = self.average_fill_price * self.filled_quantity;
        self.filled_quantity += fill.quantity;
        self.average_fill_price =
            (notional_before + fill.price * fill.quantity) / self.filled_quantity;
        self.status = if self.filled_quantity == self.quantity {
            OrderStatus::Filled
        } else {
            OrderStatus::PartiallyFilled
        };
        self.updated_at = fill.time;
        Ok(())
    }

    /// Cancel the unfilled remainder. No-op error on terminal orders.
    pub fn cancel(&mut self, time: DateTime<Utc>) -> Result<(), ExecutionError> {
        if self.status.is_terminal() {
            return Err(ExecutionError::AlreadyTerminal(self.id.clone()));
        }
        self.status = OrderStatus::Cancelled;
        self.updated_at = time;
        Ok(())
    }

    /// Mark the order venue-rejected.
    pub fn reject(&mut self, time: DateTime<Utc>) -> Result<(), ExecutionError> {
        if self.status.is_terminal() {
            return Err(ExecutionError::AlreadyTerminal(self.id.clone()));
        }
        self.status = OrderStatus::Rejected;
        self.updated_at = time;
        Ok(())
    }
}
