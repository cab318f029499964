use kestrel_audit::AuditError;
use kestrel_data::error::DataError;
use kestrel_execution::error::ExecutionError;
use kestrel_risk::limits::LimitsError;
use kestrel_strategy::error::StrategyError;
use thiserror::Error;

/// Engine-level error taxonomy. Kinds decide the recovery policy, not the
/// component they came from.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Invalid configuration. Fatal at startup, never seen at runtime.
    #[error("config: {0}")]
    Config(String),

    /// Malformed signal, bar or order. Denied synchronously, never fatal.
    #[error("validation: {0}")]
    Validation(String),

    /// Rate limits, timeouts, disconnects. Retried with backoff.
    #[error("transient venue failure: {0}")]
    TransientVenue(String),

    /// Insufficient balance, unknown symbol, bad signature. Never retried.
    #[error("permanent venue failure: {0}")]
    PermanentVenue(String),

    /// A pre-trade gate refused a signal. A normal outcome, not a fault.
    #[error("risk denied: {0}")]
    RiskDenied(String),

    /// Feed discontinuity. Strategies may quiesce; never fatal.
    #[error("data gap: {0}")]
    DataGap(String),

    /// Audit chain integrity failure. Fatal when detected during write.
    #[error("integrity: {0}")]
    Integrity(#[from] AuditError),

    /// Anything unexpected. The affected task restarts.
    #[error("internal: {0}")]
    Internal(String),
}

/// What the orchestrator does with a surfaced error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Recovery {
    /// Handled inside the originating component; nothing to do.
    RecoverLocal,
    RestartTask,
    PauseTrading,
    Shutdown,
}

impl EngineError {
    /// Propagation policy: transient, validation, risk-denied and data-gap
    /// errors recover locally; the rest surface to the orchestrator.
    pub fn recovery(&self) -> Recovery {
        match self {
            EngineError::Validation(_)
            | EngineError::TransientVenue(_)
            | EngineError::RiskDenied(_)
            | EngineError::DataGap(_) => Recovery::RecoverLocal,
            EngineError::PermanentVenue(_) => Recovery::PauseTrading,
            EngineError::Internal(_) => Recovery::RestartTask,
            EngineError::Config(_) | EngineError::Integrity(_) => Recovery::Shutdown,
        }
    }

    pub fn is_unrecoverable(&self) -> bool {
        self.recovery() == Recovery::Shutdown
    }
}

impl From<DataError> for EngineError {
    fn from(error: DataError) -> Self {
        EngineError::Validation(error.to_string())
    }
}

impl From<ExecutionError> for EngineError {
    fn from(error: ExecutionError) -> Self {
        match &error {
            ExecutionError::Validation(_) | ExecutionError::UnknownOrder(_) => {
                EngineError::Validation(error.to_string())
            }
            _ if error.is_transient() => EngineError::TransientVenue(error.to_string()),
            _ => EngineError::PermanentVenue(error.to_string()),
        }
    }
}

impl From<StrategyError> for EngineError {
    fn from(error: StrategyError) -> Self {
        match error {
            StrategyError::Config(inner) => EngineError::Config(inner.to_string()),
            other => EngineError::Validation(other.to_string()),
        }
    }
}

impl From<LimitsError> for EngineError {
    fn from(error: LimitsError) -> Self {
        EngineError::Config(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovery_policy_by_kind() {
        assert_eq!(
            EngineError::Validation("bad".into()).recovery(),
            Recovery::RecoverLocal
        );
        assert_eq!(
            EngineError::TransientVenue("rate limit".into()).recovery(),
            Recovery::RecoverLocal
        );
        assert_eq!(
            EngineError::PermanentVenue("balance".into()).recovery(),
            Recovery::PauseTrading
        );
        assert_eq!(
            EngineError::Internal("panic".into()).recovery(),
            Recovery::RestartTask
        );
        assert!(EngineError::Config("bad".into()).is_unrecoverable());
    }

    #[test]
    fn execution_errors_map_by_transience() {
        let transient = ExecutionError::RateLimited {
            venue: kestrel_data::Venue::Mock,
        };
        assert!(matches!(
            EngineError::from(transient),
            EngineError::TransientVenue(_)
        ));

        let permanent = ExecutionError::PermanentVenue {
            venue: kestrel_data::Venue::Mock,
            reason: "insufficient balance".into(),
        };
        assert!(matches!(
            EngineError::from(permanent),
            EngineError::PermanentVenue(_)
        ));
    }
}
