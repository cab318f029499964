use crate::error::ExecutionError;
use crate::plan::{ExecutionAlgorithm, ExecutionPlan, Slice};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};

/// Intraday volume profile used to weight VWAP slices.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum VolumeCurve {
    /// Equal weights; degenerates to TWAP.
    Flat,
    /// Heavier at both ends of the schedule, the classic session shape.
    UShaped,
    /// Weights normalised from an observed historical profile.
    Historical(Vec<Decimal>),
}

impl VolumeCurve {
    /// Relative weights for `slices` slots. Always non-empty, always
    /// positive.
    pub fn weights(&self, slices: usize) -> Vec<Decimal> {
        let slices = slices.max(1);
        match self {
            VolumeCurve::Flat => vec![Decimal::ONE; slices],
            VolumeCurve::UShaped => (0..slices)
                .map(|i| {
                    // 1 + (2i/(n-1) - 1)^2 gives weight 2 at the ends, 1 in
                    // the middle.
                    if slices == 1 {
                        return Decimal::ONE;
                    }
                    let position = Decimal::from(2 * i as u64) / Decimal::from(slices as u64 - 1)
                        - Decimal::ONE;
                    Decimal::ONE + position * position
                })
                .collect(),
            VolumeCurve::Historical(profile) => {
                if profile.is_empty() {
                    return vec![Decimal::ONE; slices];
                }
                // Resample the profile onto the slice count.
                (0..slices)
                    .map(|i| {
                        let index = i * profile.len() / slices;
                        profile[index].max(Decimal::new(1, 6))
                    })
                    .collect()
            }
        }
    }
}

/// Generate VWAP slice quantities weighted by `volumes`, with randomised
/// perturbation. The returned quantities sum to `total_quantity` exactly.
pub fn vwap_slices<R: Rng>(
    total_quantity: Decimal,
    volumes: &[Decimal],
    randomness: f64,
    rng: &mut R,
) -> Vec<Decimal> {
    if volumes.is_empty() {
        return vec![total_quantity];
    }
    let randomness = randomness.clamp(0.0, 0.9);
    let total_volume: Decimal = volumes.iter().copied().sum();
    let mut weights: Vec<f64> = volumes
        .iter()
        .map(|v| {
            if total_volume.is_zero() {
                1.0 / volumes.len() as f64
            } else {
                (*v / total_volume).to_f64().unwrap_or(0.0)
            }
        })
        .collect();
    weights
        .iter_mut()
        .for_each(|w| *w *= 1.0 + rng.random_range(-randomness..=randomness));
    let sum: f64 = weights.iter().sum();
    weights.iter_mut().for_each(|w| *w /= sum);

    let mut quantities: Vec<Decimal> = weights
        .iter()
        .map(|w| total_quantity * Decimal::from_f64(*w).unwrap_or(Decimal::ZERO))
        .collect();
    let diff = total_quantity - quantities.iter().copied().sum::<Decimal>();
    if let Some(last) = quantities.last_mut() {
        *last += diff;
    }
    quantities
}

/// Build a VWAP plan from a volume curve.
#[allow(clippy::too_many_arguments)]
pub fn vwap_plan<R: Rng>(
    total_quantity: Decimal,
    slices: usize,
    curve: &VolumeCurve,
    interval: Duration,
    randomness: f64,
    start: DateTime<Utc>,
    rng: &mut R,
) -> Result<ExecutionPlan, ExecutionError> {
    let weights = curve.weights(slices);
    let quantities = vwap_slices(total_quantity, &weights, randomness, rng);
    let slices = quantities
        .into_iter()
        .enumerate()
        .map(|(index, quantity)| Slice::new(quantity, start + interval * index as i32))
        .collect();
    ExecutionPlan::new(ExecutionAlgorithm::Vwap, total_quantity, slices, start)
}
