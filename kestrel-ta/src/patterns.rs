use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Type of crossover event detected between two data series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub enum Cross {
    Above,
    Below,
}

/// Determine if a crossover occurred between the previous and current values.
pub fn crossover(
    prev_fast: Decimal,
    prev_slow: Decimal,
    fast: Decimal,
    slow: Decimal,
) -> Option<Cross> {
    if prev_fast <= prev_slow && fast > slow {
        Some(Cross::Above)
    } else if prev_fast >= prev_slow && fast < slow {
        Some(Cross::Below)
    } else {
        None
    }
}

/// Stateful crossover detector that remembers the previous pair of values.
#[derive(Debug, Clone, Default)]
pub struct CrossDetector {
    previous: Option<(Decimal, Decimal)>,
}

impl CrossDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, fast: Decimal, slow: Decimal) -> Option<Cross> {
        let previous = self.previous.replace((fast, slow));
        let (prev_fast, prev_slow) = previous?;
        crossover(prev_fast, prev_slow, fast, slow)
    }
}
