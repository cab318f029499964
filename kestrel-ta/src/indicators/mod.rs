//! Streaming indicators over bar data.
//!
//! Grouped by family; everything re-exported flat so strategies can
//! `use kestrel_ta::indicators::*`.

pub mod level;
pub mod moving_average;
pub mod oscillator;
pub mod regime;
pub mod trend;
pub mod volatility;
pub mod volume;

pub use level::{FibonacciRetracement, PivotPoints};
pub use moving_average::{
    ExponentialMovingAverage, SimpleMovingAverage, VolumeWeightedMovingAverage,
    WeightedMovingAverage,
};
pub use oscillator::{
    CommodityChannelIndex, Momentum, RateOfChange, RelativeStrengthIndex, StochasticOscillator,
    WilliamsPercentR,
};
pub use regime::{HurstExponent, VolatilityPercentile};
pub use trend::{AverageDirectionalIndex, Macd, MacdOutput, ParabolicSar};
pub use volatility::{
    AverageTrueRange, BollingerBands, BollingerOutput, KeltnerChannels, KeltnerOutput, true_range,
};
pub use volume::{MoneyFlowIndex, OnBalanceVolume, VolumeRateOfChange};
