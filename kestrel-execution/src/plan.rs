use crate::error::ExecutionError;
use chrono::{DateTime, Utc};
use derive_more::Display;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Execution algorithm chosen for a sized intent.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionAlgorithm {
    Immediate,
    Twap,
    Vwap,
    Iceberg,
    Adaptive,
}

/// One scheduled child order of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Slice {
    pub quantity: Decimal,
    pub scheduled_at: DateTime<Utc>,
    /// Publicly visible quantity for iceberg slices; `None` displays the
    /// full slice.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_quantity: Option<Decimal>,
}

impl Slice {
    pub fn new(quantity: Decimal, scheduled_at: DateTime<Utc>) -> Self {
        Self {
            quantity,
            scheduled_at,
            display_quantity: None,
        }
    }

    pub fn with_display(mut self, display_quantity: Decimal) -> Self {
        self.display_quantity = Some(display_quantity);
        self
    }
}

/// A validated schedule of child orders summing exactly to the target size.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ExecutionPlan {
    pub algorithm: ExecutionAlgorithm,
    pub total_quantity: Decimal,
    pub slices: Vec<Slice>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl ExecutionPlan {
    /// Build a plan, enforcing `Σ slice.quantity == total_quantity`, positive
    /// slices, and `display_quantity <= quantity` per slice.
    pub fn new(
        algorithm: ExecutionAlgorithm,
        total_quantity: Decimal,
        slices: Vec<Slice>,
        started_at: DateTime<Utc>,
    ) -> Result<Self, ExecutionError> {
        if slices.is_empty() {
            return Err(ExecutionError::Validation("plan has no slices".into()));
        }
        let sum: Decimal = slices.iter().map(|slice| slice.quantity).sum();
        if sum != total_quantity {
            return Err(ExecutionError::Validation(format!(
                "slice quantities sum to {sum}, expected {total_quantity}"
            )));
        }
        for (index, slice) in slices.iter().enumerate() {
            if slice.quantity <= Decimal::ZERO {
                return Err(ExecutionError::Validation(format!(
                    "slice {index} has non-positive quantity {}",
                    slice.quantity
                )));
            }
            if let Some(display) = slice.display_quantity {
                if display > slice.quantity || display <= Decimal::ZERO {
                    return Err(ExecutionError::Validation(format!(
                        "slice {index} display {display} outside (0, {}]",
                        slice.quantity
                    )));
                }
            }
        }
        Ok(Self {
            algorithm,
            total_quantity,
            slices,
            started_at,
            finished_at: None,
        })
    }

    /// Total publicly visible quantity across slices.
    pub fn displayed_quantity(&self) -> Decimal {
        self.slices
            .iter()
            .map(|slice| slice.display_quantity.unwrap_or(slice.quantity))
            .sum()
    }

    /// Fraction of the plan hidden from the book.
    pub fn hidden_ratio(&self) -> Decimal {
        if self.total_quantity.is_zero() {
            return Decimal::ZERO;
        }
        (self.total_quantity - self.displayed_quantity()) / self.total_quantity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn sum_mismatch_rejected() {
        let result = ExecutionPlan::new(
            ExecutionAlgorithm::Twap,
            dec!(10),
            vec![Slice::new(dec!(4), at(0)), Slice::new(dec!(5), at(60))],
            at(0),
        );
        assert!(result.is_err());
    }

    #[test]
    fn display_above_quantity_rejected() {
        let result = ExecutionPlan::new(
            ExecutionAlgorithm::Iceberg,
            dec!(2),
            vec![Slice::new(dec!(2), at(0)).with_display(dec!(3))],
            at(0),
        );
        assert!(result.is_err());
    }

    #[test]
    fn hidden_ratio_counts_undisplayed() {
        let plan = ExecutionPlan::new(
            ExecutionAlgorithm::Iceberg,
            dec!(10),
            vec![
                Slice::new(dec!(5), at(0)).with_display(dec!(1)),
                Slice::new(dec!(5), at(60)).with_display(dec!(1)),
            ],
            at(0),
        )
        .unwrap();
        assert_eq!(plan.hidden_ratio(), dec!(0.8));
    }
}
