use crate::order::OrderId;
use kestrel_data::{Symbol, Venue};
use thiserror::Error;

/// Defines all possible errors in the execution layer.
///
/// Venue errors split into transient (retry with backoff) and permanent
/// (surface immediately, never retry).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("malformed order: {0}")]
    Validation(String),

    #[error("unknown order: {0}")]
    UnknownOrder(OrderId),

    #[error("order {0} already terminal")]
    AlreadyTerminal(OrderId),

    #[error("venue {venue} rate limited")]
    RateLimited { venue: Venue },

    #[error("venue {venue} transient failure: {reason}")]
    TransientVenue { venue: Venue, reason: String },

    #[error("venue {venue} rejected order: {reason}")]
    PermanentVenue { venue: Venue, reason: String },

    #[error("request to {venue} timed out after {timeout_ms}ms")]
    Timeout { venue: Venue, timeout_ms: u64 },

    #[error("no market data for {symbol}")]
    MissingMarketData { symbol: Symbol },
}

impl ExecutionError {
    /// True for errors worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExecutionError::RateLimited { .. }
                | ExecutionError::TransientVenue { .. }
                | ExecutionError::Timeout { .. }
        )
    }
}
