use crate::event::RiskAction;
use chrono::{DateTime, Duration, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Circuit breaker levels. Escalation is monotone within an episode;
/// de-escalation steps down one level at a time after a calm cool-down.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum BreakerLevel {
    Normal,
    /// Warn only.
    L1,
    /// New opening orders halted.
    L2,
    /// All trading halted, working orders cancelled.
    L3,
    /// Force-close everything.
    Emergency,
}

impl BreakerLevel {
    pub fn halts_opens(&self) -> bool {
        *self >= BreakerLevel::L2
    }

    pub fn halts_all(&self) -> bool {
        *self >= BreakerLevel::L3
    }

    /// Actions that come into force when this level arms.
    pub fn actions(&self) -> Vec<RiskAction> {
        match self {
            BreakerLevel::Normal => Vec::new(),
            BreakerLevel::L1 => vec![RiskAction::Notify],
            BreakerLevel::L2 => vec![RiskAction::ReduceNewExposure, RiskAction::CancelWorking],
            BreakerLevel::L3 => vec![RiskAction::PauseTrading, RiskAction::CancelWorking],
            BreakerLevel::Emergency => vec![RiskAction::ForceClose],
        }
    }

    fn step_down(&self) -> BreakerLevel {
        match self {
            BreakerLevel::Normal | BreakerLevel::L1 => BreakerLevel::Normal,
            BreakerLevel::L2 => BreakerLevel::L1,
            BreakerLevel::L3 => BreakerLevel::L2,
            BreakerLevel::Emergency => BreakerLevel::L3,
        }
    }
}

/// Leveled trading halt. Detectors arm levels; the monitor tick offers
/// de-escalation once conditions calm; operators can override either way.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    level: BreakerLevel,
    cool_down: Duration,
    last_change: Option<DateTime<Utc>>,
}

impl CircuitBreaker {
    pub fn new(cool_down: Duration) -> Self {
        Self {
            level: BreakerLevel::Normal,
            cool_down,
            last_change: None,
        }
    }

    pub fn level(&self) -> BreakerLevel {
        self.level
    }

    /// Arm `level` if it is above the current one. Returns the newly armed
    /// level's actions, or `None` if this was not an escalation.
    pub fn arm(&mut self, level: BreakerLevel, now: DateTime<Utc>) -> Option<Vec<RiskAction>> {
        if level <= self.level {
            return None;
        }
        info!(from = %self.level, to = %level, "circuit breaker escalated");
        self.level = level;
        self.last_change = Some(now);
        Some(level.actions())
    }

    /// Step down one level if the cool-down has elapsed and conditions are
    /// calm. Returns the new level when a step occurred.
    pub fn maybe_deescalate(&mut self, now: DateTime<Utc>, calm: bool) -> Option<BreakerLevel> {
        if self.level == BreakerLevel::Normal || !calm {
            return None;
        }
        let since = self.last_change?;
        if now - since < self.cool_down {
            return None;
        }
        self.level = self.level.step_down();
        self.last_change = Some(now);
        info!(to = %self.level, "circuit breaker de-escalated");
        Some(self.level)
    }

    /// Operator override in either direction. Always permitted.
    pub fn force(&mut self, level: BreakerLevel, now: DateTime<Utc>) {
        info!(from = %self.level, to = %level, "circuit breaker forced");
        self.level = level;
        self.last_change = Some(now);
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(Duration::minutes(5))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn arming_is_monotone() {
        let mut breaker = CircuitBreaker::default();
        assert!(breaker.arm(BreakerLevel::L2, at(0)).is_some());
        // Lower or equal levels do not re-arm.
        assert!(breaker.arm(BreakerLevel::L1, at(1)).is_none());
        assert!(breaker.arm(BreakerLevel::L2, at(1)).is_none());
        assert!(breaker.arm(BreakerLevel::L3, at(2)).is_some());
        assert_eq!(breaker.level(), BreakerLevel::L3);
    }

    #[test]
    fn deescalates_one_step_after_calm_cooldown() {
        let mut breaker = CircuitBreaker::new(Duration::minutes(5));
        breaker.arm(BreakerLevel::L2, at(0));

        // Too early, or not calm: no step.
        assert_eq!(breaker.maybe_deescalate(at(60), true), None);
        assert_eq!(breaker.maybe_deescalate(at(600), false), None);

        assert_eq!(breaker.maybe_deescalate(at(601), true), Some(BreakerLevel::L1));
        assert_eq!(breaker.maybe_deescalate(at(1202), true), Some(BreakerLevel::Normal));
        assert_eq!(breaker.maybe_deescalate(at(1803), true), None);
    }

    #[test]
    fn manual_override_goes_anywhere() {
        let mut breaker = CircuitBreaker::default();
        breaker.arm(BreakerLevel::Emergency, at(0));
        breaker.force(BreakerLevel::Normal, at(1));
        assert_eq!(breaker.level(), BreakerLevel::Normal);
    }

    #[test]
    fn level_predicates() {
        assert!(!BreakerLevel::L1.halts_opens());
        assert!(BreakerLevel::L2.halts_opens());
        assert!(!BreakerLevel::L2.halts_all());
        assert!(BreakerLevel::L3.halts_all());
        assert!(BreakerLevel::Emergency.halts_all());
    }
}
