use crate::event::{RiskAction, RiskEvent, RiskLevel};
use chrono::{DateTime, Utc};
use kestrel_data::Symbol;
use kestrel_execution::balance::AccountSnapshot;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::warn;

/// Warn/danger/critical ladder for one monitored quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct MonitorThresholds {
    pub warn: Decimal,
    pub danger: Decimal,
    pub critical: Decimal,
}

impl MonitorThresholds {
    /// Classify a value where larger is worse (drawdown, concentration).
    pub fn classify_high(&self, value: Decimal) -> Option<RiskLevel> {
        if value >= self.critical {
            Some(RiskLevel::Critical)
        } else if value >= self.danger {
            Some(RiskLevel::Danger)
        } else if value >= self.warn {
            Some(RiskLevel::Warn)
        } else {
            None
        }
    }

    /// Classify a value where smaller is worse (margin rate, liquidation
    /// distance).
    pub fn classify_low(&self, value: Decimal) -> Option<RiskLevel> {
        if value <= self.critical {
            Some(RiskLevel::Critical)
        } else if value <= self.danger {
            Some(RiskLevel::Danger)
        } else if value <= self.warn {
            Some(RiskLevel::Warn)
        } else {
            None
        }
    }
}

/// Escalating mitigation per severity, shared by the monitors:
/// warn notifies, danger blocks new exposure, critical pauses trading,
/// emergency force-closes.
pub fn action_for(level: RiskLevel) -> RiskAction {
    match level {
        RiskLevel::Info => RiskAction::Notify,
        RiskLevel::Warn => RiskAction::Notify,
        RiskLevel::Danger => RiskAction::ReduceNewExposure,
        RiskLevel::Critical => RiskAction::PauseTrading,
        RiskLevel::Emergency => RiskAction::ForceClose,
    }
}

/// Tracks equity against its high-water mark.
#[derive(Debug, Clone)]
pub struct DrawdownMonitor {
    thresholds: MonitorThresholds,
    high_water_mark: Option<Decimal>,
}

impl DrawdownMonitor {
    pub fn new(thresholds: MonitorThresholds) -> Self {
        Self {
            thresholds,
            high_water_mark: None,
        }
    }

    pub fn high_water_mark(&self) -> Option<Decimal> {
        self.high_water_mark
    }

    /// Update with current equity; returns a leveled event when the
    /// drawdown from the high-water mark crosses a threshold.
    pub fn update(&mut self, equity: Decimal, now: DateTime<Utc>) -> Option<RiskEvent> {
        let hwm = match self.high_water_mark {
            Some(hwm) if equity > hwm => {
                self.high_water_mark = Some(equity);
                return None;
            }
            Some(hwm) => hwm,
            None => {
                self.high_water_mark = Some(equity);
                return None;
            }
        };
        if hwm.is_zero() {
            return None;
        }
        let drawdown = (hwm - equity) / hwm;
        let level = self.thresholds.classify_high(drawdown)?;
        Some(
            RiskEvent::new("drawdown_monitor", "drawdown", level, now).with_payload(
                serde_json::json!({
                    "drawdown": drawdown.to_string(),
                    "high_water_mark": hwm.to_string(),
                    "equity": equity.to_string(),
                }),
            ),
        )
    }
}

/// Watches the account margin rate (free margin / equity).
#[derive(Debug, Clone)]
pub struct MarginMonitor {
    thresholds: MonitorThresholds,
}

impl MarginMonitor {
    pub fn new(thresholds: MonitorThresholds) -> Self {
        Self { thresholds }
    }

    pub fn assess(&self, snapshot: &AccountSnapshot, now: DateTime<Utc>) -> Option<RiskEvent> {
        let rate = snapshot.margin_rate();
        let level = self.thresholds.classify_low(rate)?;
        Some(
            RiskEvent::new("margin_monitor", "marginRate", level, now)
                .with_account(snapshot.account.clone())
                .with_payload(serde_json::json!({
                    "margin_rate": rate.to_string(),
                })),
        )
    }
}

/// Watches per-symbol share of account equity.
#[derive(Debug, Clone)]
pub struct ConcentrationMonitor {
    thresholds: MonitorThresholds,
}

impl ConcentrationMonitor {
    pub fn new(thresholds: MonitorThresholds) -> Self {
        Self { thresholds }
    }

    pub fn assess(&self, snapshot: &AccountSnapshot, now: DateTime<Utc>) -> Vec<RiskEvent> {
        if snapshot.equity.is_zero() {
            return Vec::new();
        }
        let mut events = Vec::new();
        for position in &snapshot.positions {
            if position.is_flat() {
                continue;
            }
            let share = position.notional(position.average_entry_price) / snapshot.equity;
            if let Some(level) = self.thresholds.classify_high(share) {
                events.push(
                    RiskEvent::new("concentration_monitor", "concentration", level, now)
                        .with_account(snapshot.account.clone())
                        .with_symbol(position.symbol.clone())
                        .with_payload(serde_json::json!({
                            "share": share.to_string(),
                        })),
                );
            }
        }
        events
    }
}

/// Watches the distance between mark price and liquidation price; inside
/// the critical band the position goes reduce-only.
#[derive(Debug, Clone)]
pub struct LiquidationDistanceMonitor {
    thresholds: MonitorThresholds,
}

impl LiquidationDistanceMonitor {
    pub fn new(thresholds: MonitorThresholds) -> Self {
        Self { thresholds }
    }

    pub fn assess(
        &self,
        snapshot: &AccountSnapshot,
        marks: &[(Symbol, Decimal)],
        now: DateTime<Utc>,
    ) -> Vec<RiskEvent> {
        let mut events = Vec::new();
        for position in &snapshot.positions {
            let Some(liquidation) = position.liquidation_price else {
                continue;
            };
            let Some((_, mark)) = marks.iter().find(|(symbol, _)| symbol == &position.symbol)
            else {
                continue;
            };
            if mark.is_zero() {
                continue;
            }
            let distance = ((*mark - liquidation) / *mark).abs();
            if let Some(level) = self.thresholds.classify_low(distance) {
                events.push(
                    RiskEvent::new("liquidation_monitor", "liquidationDistance", level, now)
                        .with_account(snapshot.account.clone())
                        .with_symbol(position.symbol.clone())
                        .with_payload(serde_json::json!({
                            "distance": distance.to_string(),
                            "mark": mark.to_string(),
                            "liquidation": liquidation.to_string(),
                        })),
                );
            }
        }
        events
    }
}

/// Actions currently in force. Applying an action twice is a no-op, which
/// is what makes monitor re-triggering safe.
#[derive(Debug, Clone, Default)]
pub struct ActionState {
    trading_paused: Option<String>,
    reduce_only: bool,
    reduce_only_symbols: BTreeSet<Symbol>,
}

impl ActionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_trading_paused(&self) -> bool {
        self.trading_paused.is_some()
    }

    pub fn pause_reason(&self) -> Option<&str> {
        self.trading_paused.as_deref()
    }

    pub fn is_reduce_only(&self) -> bool {
        self.reduce_only
    }

    pub fn is_symbol_reduce_only(&self, symbol: &Symbol) -> bool {
        self.reduce_only || self.reduce_only_symbols.contains(symbol)
    }

    /// Pause trading. Returns true the first time only; repeated pauses
    /// emit nothing.
    pub fn pause_trading(&mut self, reason: impl Into<String>) -> bool {
        if self.trading_paused.is_some() {
            return false;
        }
        let reason = reason.into();
        warn!(%reason, "trading paused");
        self.trading_paused = Some(reason);
        true
    }

    pub fn resume_trading(&mut self) -> bool {
        self.trading_paused.take().is_some()
    }

    /// Block new exposure globally. Idempotent.
    pub fn reduce_new_exposure(&mut self) -> bool {
        if self.reduce_only {
            return false;
        }
        self.reduce_only = true;
        true
    }

    pub fn allow_new_exposure(&mut self) -> bool {
        let was = self.reduce_only;
        self.reduce_only = false;
        was
    }

    /// Put one symbol in reduce-only mode. Idempotent.
    pub fn set_symbol_reduce_only(&mut self, symbol: Symbol) -> bool {
        self.reduce_only_symbols.insert(symbol)
    }

    pub fn clear_symbol_reduce_only(&mut self, symbol: &Symbol) -> bool {
        self.reduce_only_symbols.remove(symbol)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_data::Venue;
    use kestrel_execution::balance::AccountId;
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn thresholds() -> MonitorThresholds {
        MonitorThresholds {
            warn: dec!(0.05),
            danger: dec!(0.10),
            critical: dec!(0.20),
        }
    }

    #[test]
    fn drawdown_tracks_high_water_mark() {
        let mut monitor = DrawdownMonitor::new(thresholds());
        assert!(monitor.update(dec!(10000), at(0)).is_none());
        assert!(monitor.update(dec!(11000), at(1)).is_none());
        // 6% off the 11k high-water mark.
        let event = monitor.update(dec!(10340), at(2)).unwrap();
        assert_eq!(event.level, RiskLevel::Warn);
        // 20% off: critical.
        let event = monitor.update(dec!(8800), at(3)).unwrap();
        assert_eq!(event.level, RiskLevel::Critical);
        assert_eq!(monitor.high_water_mark(), Some(dec!(11000)));
    }

    #[test]
    fn margin_monitor_uses_low_classification() {
        let monitor = MarginMonitor::new(MonitorThresholds {
            warn: dec!(0.5),
            danger: dec!(0.4),
            critical: dec!(0.35),
        });
        let snapshot = AccountSnapshot::new(
            AccountId::new("main"),
            Venue::Mock,
            dec!(10000),
            dec!(3400),
            dec!(6600),
            Vec::new(),
            at(0),
        );
        let event = monitor.assess(&snapshot, at(0)).unwrap();
        assert_eq!(event.level, RiskLevel::Critical);
        assert_eq!(event.kind.as_str(), "marginRate");
    }

    #[test]
    fn pause_trading_is_idempotent() {
        let mut state = ActionState::new();
        assert!(state.pause_trading("margin"));
        assert!(!state.pause_trading("margin"));
        assert!(state.is_trading_paused());
        assert_eq!(state.pause_reason(), Some("margin"));
        assert!(state.resume_trading());
        assert!(!state.resume_trading());
    }
}
