use kestrel_data::{Symbol, Venue};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Invalid risk configuration. Fatal at startup.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid risk limits: {0}")]
pub struct LimitsError(pub String);

/// Risk limit configuration shared by gates, sizing and monitors.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RiskLimits {
    /// Symbols the engine may trade.
    pub allowed_symbols: BTreeSet<Symbol>,
    /// Venues the engine may trade on.
    pub allowed_venues: BTreeSet<Venue>,

    /// Per-symbol position caps in base quantity; `default_position_cap`
    /// covers unlisted symbols.
    #[serde(default)]
    pub position_caps: BTreeMap<Symbol, Decimal>,
    pub default_position_cap: Decimal,
    /// Realized volatility at which position caps apply unscaled. When a
    /// symbol runs hotter than this its cap shrinks proportionally; calmer
    /// symbols earn more room, bounded by the cap-scale band. `None`
    /// disables volatility scaling.
    #[serde(default)]
    pub baseline_volatility: Option<Decimal>,
    /// Lower bound on the volatility cap multiplier.
    pub min_cap_scale: Decimal,
    /// Upper bound on the volatility cap multiplier.
    pub max_cap_scale: Decimal,
    /// Aggregate account notional cap (quote units).
    pub max_account_notional: Decimal,
    /// Gross notional over equity cap.
    pub max_leverage: Decimal,
    /// Single symbol's share of equity cap, eg/ 0.25.
    pub concentration_max: Decimal,

    /// Margin-rate thresholds: warn above, deny below critical.
    pub margin_warn: Decimal,
    pub margin_critical: Decimal,

    /// Day loss that halts new openings (positive quote amount).
    pub daily_loss_limit: Decimal,

    /// Fraction of equity risked per trade between entry and stop.
    pub risk_per_trade: Decimal,
    /// Cap on position notional as a fraction of equity.
    pub position_percent: Decimal,

    /// Slippage allowance per urgency class: patient orders tolerate less.
    pub max_slippage_patient: Decimal,
    pub max_slippage_urgent: Decimal,

    /// Repeat-failure cooldown per (symbol, side).
    pub cooldown_ms: i64,
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            allowed_symbols: BTreeSet::new(),
            allowed_venues: BTreeSet::from([Venue::Mock]),
            position_caps: BTreeMap::new(),
            default_position_cap: Decimal::from(10u64),
            baseline_volatility: None,
            min_cap_scale: Decimal::new(25, 2),
            max_cap_scale: Decimal::from(2u64),
            max_account_notional: Decimal::from(1_000_000u64),
            max_leverage: Decimal::from(5u64),
            concentration_max: Decimal::new(25, 2),
            margin_warn: Decimal::new(5, 1),
            margin_critical: Decimal::new(35, 2),
            daily_loss_limit: Decimal::from(1_000u64),
            risk_per_trade: Decimal::new(1, 2),
            position_percent: Decimal::new(2, 1),
            max_slippage_patient: Decimal::new(1, 3),
            max_slippage_urgent: Decimal::new(5, 3),
            cooldown_ms: 60_000,
        }
    }
}

impl RiskLimits {
    /// Total validation at startup; never at runtime.
    pub fn validate(&self) -> Result<(), LimitsError> {
        let unit = |v: Decimal| v > Decimal::ZERO && v < Decimal::ONE;
        if !unit(self.risk_per_trade) {
            return Err(LimitsError("risk_per_trade must be in (0, 1)".into()));
        }
        if !unit(self.concentration_max) {
            return Err(LimitsError("concentration_max must be in (0, 1)".into()));
        }
        if self.margin_critical >= self.margin_warn {
            return Err(LimitsError(
                "margin_critical must be below margin_warn".into(),
            ));
        }
        if self.position_percent <= Decimal::ZERO || self.position_percent > Decimal::ONE {
            return Err(LimitsError("position_percent must be in (0, 1]".into()));
        }
        if self.max_leverage < Decimal::ONE {
            return Err(LimitsError("max_leverage must be >= 1".into()));
        }
        if self.daily_loss_limit <= Decimal::ZERO {
            return Err(LimitsError("daily_loss_limit must be positive".into()));
        }
        if self.cooldown_ms < 0 {
            return Err(LimitsError("cooldown_ms must be >= 0".into()));
        }
        if self.max_slippage_patient > self.max_slippage_urgent {
            return Err(LimitsError(
                "patient slippage allowance cannot exceed urgent".into(),
            ));
        }
        if let Some(baseline) = self.baseline_volatility {
            if baseline <= Decimal::ZERO {
                return Err(LimitsError("baseline_volatility must be positive".into()));
            }
        }
        if self.min_cap_scale <= Decimal::ZERO || self.min_cap_scale > self.max_cap_scale {
            return Err(LimitsError(
                "cap-scale band must satisfy 0 < min_cap_scale <= max_cap_scale".into(),
            ));
        }
        Ok(())
    }

    pub fn position_cap(&self, symbol: &Symbol) -> Decimal {
        self.position_caps
            .get(symbol)
            .copied()
            .unwrap_or(self.default_position_cap)
    }

    /// Position cap for a symbol at its current realized volatility. With a
    /// configured baseline, a symbol running at twice the baseline gets half
    /// the cap (within the cap-scale band); without one, or without an
    /// estimate for the symbol, the raw cap applies.
    pub fn position_cap_at(&self, symbol: &Symbol, volatility: Option<Decimal>) -> Decimal {
        let cap = self.position_cap(symbol);
        let (Some(baseline), Some(volatility)) = (self.baseline_volatility, volatility) else {
            return cap;
        };
        if volatility <= Decimal::ZERO {
            return cap * self.max_cap_scale;
        }
        cap * (baseline / volatility).clamp(self.min_cap_scale, self.max_cap_scale)
    }

    /// Slippage allowance for an urgency in [0, 1], linearly interpolated
    /// between the patient and urgent allowances.
    pub fn slippage_allowance(&self, urgency: Decimal) -> Decimal {
        let urgency = urgency.clamp(Decimal::ZERO, Decimal::ONE);
        self.max_slippage_patient
            + (self.max_slippage_urgent - self.max_slippage_patient) * urgency
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn default_limits_validate() {
        assert!(RiskLimits::default().validate().is_ok());
    }

    #[test]
    fn margin_ordering_enforced() {
        let limits = RiskLimits {
            margin_warn: dec!(0.3),
            margin_critical: dec!(0.5),
            ..RiskLimits::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn volatile_symbols_get_smaller_caps() {
        let limits = RiskLimits {
            default_position_cap: dec!(10),
            baseline_volatility: Some(dec!(0.02)),
            ..RiskLimits::default()
        };
        let symbol = Symbol::new("BTC/USDT");
        // Twice the baseline halves the cap; an eighth of it hits the
        // upper bound of the band.
        assert_eq!(limits.position_cap_at(&symbol, Some(dec!(0.04))), dec!(5));
        assert_eq!(limits.position_cap_at(&symbol, Some(dec!(0.0025))), dec!(20));
        // Unknown volatility, or scaling disabled, leaves the raw cap.
        assert_eq!(limits.position_cap_at(&symbol, None), dec!(10));
        let unscaled = RiskLimits {
            default_position_cap: dec!(10),
            ..RiskLimits::default()
        };
        assert_eq!(unscaled.position_cap_at(&symbol, Some(dec!(0.5))), dec!(10));
    }

    #[test]
    fn cap_scale_band_is_validated() {
        let limits = RiskLimits {
            min_cap_scale: dec!(3),
            max_cap_scale: dec!(2),
            ..RiskLimits::default()
        };
        assert!(limits.validate().is_err());
        let limits = RiskLimits {
            baseline_volatility: Some(dec!(0)),
            ..RiskLimits::default()
        };
        assert!(limits.validate().is_err());
    }

    #[test]
    fn slippage_allowance_interpolates() {
        let limits = RiskLimits::default();
        assert_eq!(limits.slippage_allowance(dec!(0)), limits.max_slippage_patient);
        assert_eq!(limits.slippage_allowance(dec!(1)), limits.max_slippage_urgent);
        let mid = limits.slippage_allowance(dec!(0.5));
        assert!(mid > limits.max_slippage_patient && mid < limits.max_slippage_urgent);
    }
}
