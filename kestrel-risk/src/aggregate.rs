use crate::{
    event::{RiskAction, RiskEvent, RiskLevel},
    monitor::{MonitorThresholds, action_for},
};
use chrono::{DateTime, Utc};
use kestrel_execution::balance::{AccountId, AccountSnapshot};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Global thresholds over the cross-account rollup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AggregateLimits {
    /// Combined gross exposure over combined equity.
    pub max_global_leverage: Decimal,
    /// Combined drawdown ladder against the global high-water mark.
    pub drawdown: MonitorThresholds,
}

impl Default for AggregateLimits {
    fn default() -> Self {
        Self {
            max_global_leverage: Decimal::from(4u64),
            drawdown: MonitorThresholds {
                warn: Decimal::new(5, 2),
                danger: Decimal::new(1, 1),
                critical: Decimal::new(2, 1),
            },
        }
    }
}

/// Rollup across every account the engine trades.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AggregateSnapshot {
    pub total_equity: Decimal,
    pub total_exposure: Decimal,
    pub accounts: usize,
    pub time: DateTime<Utc>,
}

/// Sums equity and exposure across accounts; when a global threshold is
/// crossed it escalates through the same action vocabulary applied
/// system-wide.
#[derive(Debug, Clone)]
pub struct CrossAccountAggregator {
    limits: AggregateLimits,
    snapshots: BTreeMap<AccountId, AccountSnapshot>,
    high_water_mark: Option<Decimal>,
}

impl CrossAccountAggregator {
    pub fn new(limits: AggregateLimits) -> Self {
        Self {
            limits,
            snapshots: BTreeMap::new(),
            high_water_mark: None,
        }
    }

    pub fn update_account(&mut self, snapshot: AccountSnapshot) {
        self.snapshots.insert(snapshot.account.clone(), snapshot);
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> AggregateSnapshot {
        AggregateSnapshot {
            total_equity: self.snapshots.values().map(|s| s.equity).sum(),
            total_exposure: self.snapshots.values().map(|s| s.gross_exposure()).sum(),
            accounts: self.snapshots.len(),
            time: now,
        }
    }

    /// Evaluate global thresholds; every event carries the system-wide
    /// action to apply.
    pub fn assess(&mut self, now: DateTime<Utc>) -> Vec<(RiskEvent, RiskAction)> {
        let aggregate = self.snapshot(now);
        let mut out = Vec::new();

        // Global leverage.
        if !aggregate.total_equity.is_zero() {
            let leverage = aggregate.total_exposure / aggregate.total_equity;
            if leverage > self.limits.max_global_leverage {
                let event =
                    RiskEvent::new("cross_account", "globalLeverage", RiskLevel::Danger, now)
                        .with_payload(serde_json::json!({
                            "leverage": leverage.to_string(),
                            "limit": self.limits.max_global_leverage.to_string(),
                        }));
                out.push((event, RiskAction::ReduceNewExposure));
            }
        }

        // Global drawdown against the combined high-water mark.
        let hwm = match self.high_water_mark {
            Some(hwm) if aggregate.total_equity > hwm => {
                self.high_water_mark = Some(aggregate.total_equity);
                aggregate.total_equity
            }
            Some(hwm) => hwm,
            None => {
                self.high_water_mark = Some(aggregate.total_equity);
                aggregate.total_equity
            }
        };
        if !hwm.is_zero() {
            let drawdown = (hwm - aggregate.total_equity) / hwm;
            if let Some(level) = self.limits.drawdown.classify_high(drawdown) {
                let event = RiskEvent::new("cross_account", "globalDrawdown", level, now)
                    .with_payload(serde_json::json!({
                        "drawdown": drawdown.to_string(),
                        "high_water_mark": hwm.to_string(),
                    }));
                out.push((event, action_for(level)));
            }
        }
        out
    }
}

impl Default for CrossAccountAggregator {
    fn default() -> Self {
        Self::new(AggregateLimits::default())
    }
}
