use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Configuration rejection. Always fatal at startup, never at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unknown strategy '{0}'")]
    UnknownStrategy(String),

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("constraint violated: {0}")]
    ConstraintViolated(String),
}

/// Deserialize strategy parameters strictly: unknown fields are rejected,
/// defaults applied, then the schema's cross-field constraints checked.
pub fn parse_params<T>(params: &serde_json::Value) -> Result<T, ConfigError>
where
    T: DeserializeOwned + Validate,
{
    let parsed: T = serde_json::from_value(params.clone())
        .map_err(|error| ConfigError::InvalidParameters(error.to_string()))?;
    parsed.validate()?;
    Ok(parsed)
}

/// Range and cross-field constraints per strategy schema. Validation is
/// total at startup, not lazy.
pub trait Validate {
    fn validate(&self) -> Result<(), ConfigError>;
}

pub(crate) fn require(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        Err(ConfigError::ConstraintViolated(message.to_string()))
    }
}

/// Common exit levels shared by the entry strategies.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ExitConfig {
    /// Stop-loss distance as a fraction of entry price, eg/ 0.01 = 1%.
    #[serde(default)]
    pub stop_loss_pct: Option<Decimal>,
    /// Take-profit distance as a fraction of entry price.
    #[serde(default)]
    pub take_profit_pct: Option<Decimal>,
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            stop_loss_pct: None,
            take_profit_pct: None,
        }
    }
}

impl Validate for ExitConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(stop) = self.stop_loss_pct {
            require(
                stop > Decimal::ZERO && stop < Decimal::ONE,
                "stop_loss_pct must be in (0, 1)",
            )?;
        }
        if let Some(take) = self.take_profit_pct {
            require(
                take > Decimal::ZERO,
                "take_profit_pct must be positive",
            )?;
        }
        Ok(())
    }
}
