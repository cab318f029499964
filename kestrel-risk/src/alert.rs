use crate::event::{RiskEvent, RiskLevel};
use chrono::{DateTime, Duration, Utc};
use fnv::FnvHashMap;
use kestrel_data::Symbol;
use kestrel_execution::balance::AccountId;
use parking_lot::Mutex;

/// Trait allowing consumers to receive delivered risk events.
pub trait RiskAlertHook: Send + Sync {
    fn alert(&self, event: &RiskEvent);
}

/// Simple alert hook that stores delivered events in a vector.
#[derive(Debug, Default)]
pub struct VecAlertHook {
    pub events: Mutex<Vec<RiskEvent>>,
}

impl RiskAlertHook for VecAlertHook {
    fn alert(&self, event: &RiskEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Per-level delivery cooldowns: quiet levels are throttled hard, an
/// emergency is effectively never suppressed.
#[derive(Debug, Clone)]
pub struct ThrottleConfig {
    pub info_cooldown: Duration,
    pub warn_cooldown: Duration,
    pub danger_cooldown: Duration,
    pub critical_cooldown: Duration,
    pub emergency_cooldown: Duration,
    /// Triggers inside this window count toward escalation.
    pub escalation_window: Duration,
    /// Suppressed-or-delivered triggers within the window needed to bump
    /// the level one step.
    pub escalation_count: u32,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            info_cooldown: Duration::minutes(10),
            warn_cooldown: Duration::minutes(5),
            danger_cooldown: Duration::minutes(1),
            critical_cooldown: Duration::seconds(15),
            emergency_cooldown: Duration::seconds(1),
            escalation_window: Duration::minutes(5),
            escalation_count: 3,
        }
    }
}

impl ThrottleConfig {
    fn cooldown(&self, level: RiskLevel) -> Duration {
        match level {
            RiskLevel::Info => self.info_cooldown,
            RiskLevel::Warn => self.warn_cooldown,
            RiskLevel::Danger => self.danger_cooldown,
            RiskLevel::Critical => self.critical_cooldown,
            RiskLevel::Emergency => self.emergency_cooldown,
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct ThrottleKey {
    kind: smol_str::SmolStr,
    level: RiskLevel,
    symbol: Option<Symbol>,
    account: Option<AccountId>,
}

#[derive(Debug, Clone)]
struct ThrottleEntry {
    last_delivered: Option<DateTime<Utc>>,
    window_start: DateTime<Utc>,
    triggers_in_window: u32,
}

/// Cooldown / deduplication filter in front of the alert hooks.
///
/// Escalation counters are independent from the cooldown gates: a
/// suppressed event still counts toward escalation, so a burst that never
/// beats the cooldown can still raise the next delivery one level.
#[derive(Debug, Default)]
pub struct AlertThrottle {
    config: ThrottleConfig,
    entries: FnvHashMap<ThrottleKey, ThrottleEntry>,
}

impl AlertThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            config,
            entries: FnvHashMap::default(),
        }
    }

    /// Filter one event. Returns the event to deliver (possibly escalated)
    /// or `None` when suppressed by cooldown.
    pub fn filter(&mut self, event: RiskEvent) -> Option<RiskEvent> {
        let key = ThrottleKey {
            kind: event.kind.clone(),
            level: event.level,
            symbol: event.symbol.clone(),
            account: event.account.clone(),
        };
        let now = event.time;
        let cooldown = self.config.cooldown(event.level);

        let entry = self.entries.entry(key).or_insert(ThrottleEntry {
            last_delivered: None,
            window_start: now,
            triggers_in_window: 0,
        });

        // Counting is unconditional; cooldown only gates delivery.
        if now - entry.window_start > self.config.escalation_window {
            entry.window_start = now;
            entry.triggers_in_window = 0;
        }
        entry.triggers_in_window += 1;

        let escalate = entry.triggers_in_window >= self.config.escalation_count;

        if let Some(last) = entry.last_delivered {
            if now - last < cooldown && !escalate {
                return None;
            }
        }
        entry.last_delivered = Some(now);
        if escalate {
            entry.triggers_in_window = 0;
            entry.window_start = now;
            let mut escalated = event;
            escalated.level = escalated.level.escalated();
            return Some(escalated);
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn event(secs: i64, level: RiskLevel) -> RiskEvent {
        RiskEvent::new("test", "drawdown", level, at(secs))
    }

    #[test]
    fn cooldown_suppresses_repeats() {
        let mut throttle = AlertThrottle::new(ThrottleConfig {
            info_cooldown: Duration::minutes(10),
            warn_cooldown: Duration::minutes(5),
            danger_cooldown: Duration::minutes(1),
            critical_cooldown: Duration::seconds(15),
            emergency_cooldown: Duration::seconds(1),
            escalation_window: Duration::minutes(5),
            escalation_count: 10,
        });
        assert!(throttle.filter(event(0, RiskLevel::Warn)).is_some());
        assert!(throttle.filter(event(10, RiskLevel::Warn)).is_none());
        assert!(throttle.filter(event(400, RiskLevel::Warn)).is_some());
    }

    #[test]
    fn suppressed_events_still_escalate() {
        let mut throttle = AlertThrottle::new(ThrottleConfig {
            info_cooldown: Duration::minutes(10),
            warn_cooldown: Duration::minutes(5),
            danger_cooldown: Duration::minutes(1),
            critical_cooldown: Duration::seconds(15),
            emergency_cooldown: Duration::seconds(1),
            escalation_window: Duration::minutes(5),
            escalation_count: 3,
        });
        // First delivers, second suppressed but counted, third escalates
        // straight through the cooldown.
        assert_eq!(
            throttle.filter(event(0, RiskLevel::Warn)).unwrap().level,
            RiskLevel::Warn
        );
        assert!(throttle.filter(event(5, RiskLevel::Warn)).is_none());
        let escalated = throttle.filter(event(10, RiskLevel::Warn)).unwrap();
        assert_eq!(escalated.level, RiskLevel::Danger);
    }

    #[test]
    fn distinct_keys_do_not_interfere() {
        let mut throttle = AlertThrottle::new(ThrottleConfig::default());
        let mut a = event(0, RiskLevel::Warn);
        a.symbol = Some(Symbol::new("BTC/USDT"));
        let mut b = event(1, RiskLevel::Warn);
        b.symbol = Some(Symbol::new("ETH/USDT"));
        assert!(throttle.filter(a).is_some());
        assert!(throttle.filter(b).is_some());
    }
}
