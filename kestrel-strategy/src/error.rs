use crate::runtime::StrategyPhase;
use kestrel_execution::order::StrategyId;
use thiserror::Error;

/// Defines all possible errors in the strategy layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StrategyError {
    #[error("strategy {0} not found")]
    NotFound(StrategyId),

    #[error("strategy {0} already registered")]
    AlreadyRunning(StrategyId),

    #[error("strategy {id} cannot {action} while {phase}")]
    InvalidTransition {
        id: StrategyId,
        action: &'static str,
        phase: StrategyPhase,
    },

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}
