use crate::error::ExecutionError;
use crate::plan::{ExecutionAlgorithm, ExecutionPlan, Slice};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// How iceberg slice sizes decay across the schedule.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStyle {
    /// Equal slice sizes.
    Linear,
    /// Each slice is a fixed fraction of the remainder, front-loading the
    /// schedule.
    Exponential,
    /// Linear sizing, but the display quantity shrinks as slices go deeper,
    /// hiding more of the tail.
    Adaptive,
}

/// Build an iceberg plan: `slices` child orders of which at most
/// `max_display` is visible per slice.
#[allow(clippy::too_many_arguments)]
pub fn iceberg_plan(
    total_quantity: Decimal,
    slices: usize,
    max_display: Decimal,
    style: SplitStyle,
    interval: Duration,
    start: DateTime<Utc>,
) -> Result<ExecutionPlan, ExecutionError> {
    if total_quantity <= Decimal::ZERO {
        return Err(ExecutionError::Validation(format!(
            "iceberg total must be positive, got {total_quantity}"
        )));
    }
    if max_display <= Decimal::ZERO {
        return Err(ExecutionError::Validation(format!(
            "iceberg display cap must be positive, got {max_display}"
        )));
    }
    let slices = slices.max(1);

    let quantities: Vec<Decimal> = match style {
        SplitStyle::Linear | SplitStyle::Adaptive => {
            let base = total_quantity / Decimal::from(slices as u64);
            let mut quantities = vec![base; slices];
            let diff = total_quantity - quantities.iter().copied().sum::<Decimal>();
            if let Some(last) = quantities.last_mut() {
                *last += diff;
            }
            quantities
        }
        SplitStyle::Exponential => {
            // Halve the remainder each slice; the tail takes what is left.
            let mut quantities = Vec::with_capacity(slices);
            let mut remaining = total_quantity;
            let half = Decimal::new(5, 1);
            for index in 0..slices {
                let quantity = if index + 1 == slices {
                    remaining
                } else {
                    remaining * half
                };
                quantities.push(quantity);
                remaining -= quantity;
            }
            quantities
        }
    };

    let count = quantities.len();
    let built = quantities
        .into_iter()
        .enumerate()
        .map(|(index, quantity)| {
            let display = match style {
                SplitStyle::Adaptive => {
                    // Later slices display less: cap scaled by remaining depth.
                    let depth = Decimal::from((count - index) as u64) / Decimal::from(count as u64);
                    (max_display * depth).min(quantity)
                }
                _ => max_display.min(quantity),
            };
            Slice::new(quantity, start + interval * index as i32).with_display(display)
        })
        .collect();

    ExecutionPlan::new(ExecutionAlgorithm::Iceberg, total_quantity, built, start)
}

/// Minimum slice count so that no visible tranche exceeds `max_display`.
pub fn min_slices_for_display(total_quantity: Decimal, max_display: Decimal) -> usize {
    use rust_decimal::prelude::ToPrimitive;
    if max_display <= Decimal::ZERO {
        return 1;
    }
    (total_quantity / max_display)
        .ceil()
        .to_usize()
        .unwrap_or(1)
        .max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    #[test]
    fn linear_slices_display_capped() {
        let plan = iceberg_plan(
            dec!(10),
            10,
            dec!(0.5),
            SplitStyle::Linear,
            Duration::seconds(15),
            at(0),
        )
        .unwrap();
        assert_eq!(plan.slices.len(), 10);
        for slice in &plan.slices {
            assert!(slice.display_quantity.unwrap() <= dec!(0.5));
        }
        assert_eq!(
            plan.slices.iter().map(|s| s.quantity).sum::<Decimal>(),
            dec!(10)
        );
    }

    #[test]
    fn exponential_front_loads() {
        let plan = iceberg_plan(
            dec!(8),
            4,
            dec!(1),
            SplitStyle::Exponential,
            Duration::seconds(15),
            at(0),
        )
        .unwrap();
        assert_eq!(plan.slices[0].quantity, dec!(4));
        assert_eq!(plan.slices[1].quantity, dec!(2));
        assert!(plan.slices[0].quantity > plan.slices[3].quantity);
    }

    #[test]
    fn adaptive_display_decays() {
        let plan = iceberg_plan(
            dec!(10),
            5,
            dec!(1),
            SplitStyle::Adaptive,
            Duration::seconds(15),
            at(0),
        )
        .unwrap();
        let displays: Vec<Decimal> = plan
            .slices
            .iter()
            .map(|s| s.display_quantity.unwrap())
            .collect();
        assert!(displays.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    #[test]
    fn min_slices_covers_total() {
        assert_eq!(min_slices_for_display(dec!(10), dec!(1)), 10);
        assert_eq!(min_slices_for_display(dec!(10.5), dec!(1)), 11);
        assert_eq!(min_slices_for_display(dec!(0.5), dec!(1)), 1);
    }
}
