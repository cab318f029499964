use crate::{
    Strategy, StrategyFactory,
    config::ConfigError,
    flow::{TakerRatioStrategy, VolumeSpikeStrategy, VwapDeviationStrategy},
    resonance::ResonanceStrategy,
    reversion::{BollingerReversionStrategy, RsiReversionStrategy},
    stat_arb::{PairsStrategy, SpreadConvergenceStrategy},
    trend::{DualSmaStrategy, MacdTrendStrategy},
    volatility::{AtrBreakoutStrategy, SqueezeBreakoutStrategy},
};
use fnv::FnvHashMap;

/// Registry from strategy name to factory. Construction goes through the
/// factory so configuration is always validated before an instance exists.
#[derive(Debug, Default)]
pub struct StrategyRegistry {
    factories: FnvHashMap<&'static str, StrategyFactory>,
}

impl StrategyRegistry {
    pub fn new() -> Self {
        Self {
            factories: FnvHashMap::default(),
        }
    }

    /// Every strategy shipped with the engine.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        registry.register(DualSmaStrategy::NAME, DualSmaStrategy::factory);
        registry.register(MacdTrendStrategy::NAME, MacdTrendStrategy::factory);
        registry.register(RsiReversionStrategy::NAME, RsiReversionStrategy::factory);
        registry.register(
            BollingerReversionStrategy::NAME,
            BollingerReversionStrategy::factory,
        );
        registry.register(AtrBreakoutStrategy::NAME, AtrBreakoutStrategy::factory);
        registry.register(SqueezeBreakoutStrategy::NAME, SqueezeBreakoutStrategy::factory);
        registry.register(VolumeSpikeStrategy::NAME, VolumeSpikeStrategy::factory);
        registry.register(VwapDeviationStrategy::NAME, VwapDeviationStrategy::factory);
        registry.register(TakerRatioStrategy::NAME, TakerRatioStrategy::factory);
        registry.register(ResonanceStrategy::NAME, ResonanceStrategy::factory);
        registry.register(PairsStrategy::NAME, PairsStrategy::factory);
        registry.register(
            SpreadConvergenceStrategy::CROSS_VENUE,
            SpreadConvergenceStrategy::cross_venue_factory,
        );
        registry.register(
            SpreadConvergenceStrategy::BASIS,
            SpreadConvergenceStrategy::basis_factory,
        );
        registry
    }

    pub fn register(&mut self, name: &'static str, factory: StrategyFactory) {
        self.factories.insert(name, factory);
    }

    /// Build a validated instance. Unknown names and invalid parameters are
    /// both configuration errors.
    pub fn build(
        &self,
        name: &str,
        params: &serde_json::Value,
    ) -> Result<Box<dyn Strategy>, ConfigError> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| ConfigError::UnknownStrategy(name.to_string()))?;
        factory(params)
    }

    pub fn names(&self) -> Vec<&'static str> {
        let mut names: Vec<&'static str> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}
