use crate::bar::Bar;
use std::collections::VecDeque;

/// Bounded ring buffer of closed bars for one (symbol, timeframe) stream.
/// Oldest bars are evicted once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct BarBuffer {
    capacity: usize,
    bars: VecDeque<Bar>,
}

impl BarBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            bars: VecDeque::new(),
        }
    }

    pub fn push(&mut self, bar: Bar) {
        self.bars.push_back(bar);
        if self.bars.len() > self.capacity {
            self.bars.pop_front();
        }
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.back()
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bar> {
        self.bars.iter()
    }

    /// Most recent `count` bars, oldest first.
    pub fn tail(&self, count: usize) -> Vec<&Bar> {
        let skip = self.bars.len().saturating_sub(count);
        self.bars.iter().skip(skip).collect()
    }
}
