use crate::plan::{ExecutionAlgorithm, ExecutionPlan, Slice};
use crate::error::ExecutionError;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;

/// Generate TWAP (time-weighted average price) slice quantities with
/// randomised weights. The returned quantities sum to `total_quantity`
/// exactly; any rounding remainder lands on the last slice.
pub fn twap_slices<R: Rng>(
    total_quantity: Decimal,
    slices: usize,
    randomness: f64,
    rng: &mut R,
) -> Vec<Decimal> {
    let slices = slices.max(1);
    let randomness = randomness.clamp(0.0, 0.9);
    let mut weights: Vec<f64> = (0..slices)
        .map(|_| 1.0 + rng.random_range(-randomness..=randomness))
        .collect();
    let sum: f64 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= sum);

    let mut quantities: Vec<Decimal> = weights
        .iter()
        .map(|w| total_quantity * Decimal::from_f64(*w).unwrap_or(Decimal::ZERO))
        .collect();
    let diff: Decimal = total_quantity - quantities.iter().copied().sum::<Decimal>();
    if let Some(last) = quantities.last_mut() {
        *last += diff;
    }
    quantities
}

/// Build a TWAP plan: near-equal slices spaced by `interval` with per-slice
/// quantity jitter of ±`randomness`.
pub fn twap_plan<R: Rng>(
    total_quantity: Decimal,
    slices: usize,
    interval: Duration,
    randomness: f64,
    start: DateTime<Utc>,
    rng: &mut R,
) -> Result<ExecutionPlan, ExecutionError> {
    let quantities = twap_slices(total_quantity, slices, randomness, rng);
    let slices = quantities
        .into_iter()
        .enumerate()
        .map(|(index, quantity)| Slice::new(quantity, start + interval * index as i32))
        .collect();
    ExecutionPlan::new(ExecutionAlgorithm::Twap, total_quantity, slices, start)
}
