use chrono::{DateTime, Utc};
use derive_more::Display;
use kestrel_data::Symbol;
use kestrel_execution::balance::AccountId;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

/// Severity ladder for risk events.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    Info,
    Warn,
    Danger,
    Critical,
    Emergency,
}

impl RiskLevel {
    /// One step up the ladder, saturating at `Emergency`.
    pub fn escalated(&self) -> RiskLevel {
        match self {
            RiskLevel::Info => RiskLevel::Warn,
            RiskLevel::Warn => RiskLevel::Danger,
            RiskLevel::Danger => RiskLevel::Critical,
            RiskLevel::Critical | RiskLevel::Emergency => RiskLevel::Emergency,
        }
    }
}

/// Mitigation vocabulary the monitors speak. Actions are idempotent: the
/// action state tracks what is already in force and re-application is a
/// no-op.
#[derive(
    Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum RiskAction {
    Notify,
    /// New exposure may only shrink: opens denied, closes and reduces pass.
    ReduceNewExposure,
    PauseTrading,
    CancelWorking,
    ForceClose,
}

/// One risk pipeline observation. The audit sink adds the integrity chain
/// fields when the event is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RiskEvent {
    pub id: SmolStr,
    /// Originating module, eg/ "drawdown_monitor".
    pub module: SmolStr,
    /// Event kind, eg/ "marginRate", "blackSwan".
    pub kind: SmolStr,
    pub level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<Symbol>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountId>,
    pub time: DateTime<Utc>,
    pub payload: serde_json::Value,
}

impl RiskEvent {
    pub fn new(
        module: impl AsRef<str>,
        kind: impl AsRef<str>,
        level: RiskLevel,
        time: DateTime<Utc>,
    ) -> Self {
        let module = SmolStr::new(module);
        let kind = SmolStr::new(kind);
        let id = SmolStr::new(format!("{module}-{kind}-{}", time.timestamp_millis()));
        Self {
            id,
            module,
            kind,
            level,
            symbol: None,
            account: None,
            time,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_symbol(mut self, symbol: Symbol) -> Self {
        self.symbol = Some(symbol);
        self
    }

    pub fn with_account(mut self, account: AccountId) -> Self {
        self.account = Some(account);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}
