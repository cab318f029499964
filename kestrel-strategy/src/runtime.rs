use crate::{
    Strategy,
    error::StrategyError,
    registry::StrategyRegistry,
    signal::Signal,
};
use derive_more::Display;
use fnv::FnvHashMap;
use kestrel_data::{Symbol, bar::{Bar, Timeframe}, books::OrderBook, ticker::Ticker};
use kestrel_execution::order::StrategyId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Lifecycle of a hosted strategy instance.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Deserialize, Serialize, Display,
)]
#[serde(rename_all = "snake_case")]
pub enum StrategyPhase {
    Created,
    Initialized,
    Running,
    /// No new signals accepted; in-flight callbacks may complete.
    Stopping,
    Stopped,
}

/// Which streams an instance receives. Empty sets mean "everything"; a
/// multi-timeframe strategy scopes by symbol only.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StreamFilter {
    pub symbols: BTreeSet<Symbol>,
    pub timeframes: BTreeSet<Timeframe>,
}

impl StreamFilter {
    pub fn symbol(symbol: Symbol) -> Self {
        Self {
            symbols: BTreeSet::from([symbol]),
            timeframes: BTreeSet::new(),
        }
    }

    pub fn with_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.timeframes.insert(timeframe);
        self
    }

    fn accepts_symbol(&self, symbol: &Symbol) -> bool {
        self.symbols.is_empty() || self.symbols.contains(symbol)
    }

    fn accepts_bar(&self, bar: &Bar) -> bool {
        self.accepts_symbol(&bar.symbol)
            && (self.timeframes.is_empty() || self.timeframes.contains(&bar.timeframe))
    }
}

#[derive(Debug)]
struct Hosted {
    strategy: Box<dyn Strategy>,
    phase: StrategyPhase,
    filter: StreamFilter,
}

/// Hosts strategy instances, enforces the lifecycle state machine, and
/// collects emitted signals. Instances are exclusively owned, which gives
/// the at-most-one-concurrent-callback guarantee for free.
#[derive(Debug, Default)]
pub struct StrategyRuntime {
    instances: FnvHashMap<StrategyId, Hosted>,
}

impl StrategyRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a strategy through the registry (validating its config) and
    /// host it in `Initialized` state.
    pub fn add(
        &mut self,
        registry: &StrategyRegistry,
        id: StrategyId,
        name: &str,
        params: &serde_json::Value,
    ) -> Result<(), StrategyError> {
        if self.instances.contains_key(&id) {
            return Err(StrategyError::AlreadyRunning(id));
        }
        let strategy = registry.build(name, params)?;
        info!(%id, name, "strategy initialised");
        self.instances.insert(id, Hosted {
            strategy,
            phase: StrategyPhase::Initialized,
            filter: StreamFilter::default(),
        });
        Ok(())
    }

    /// Scope which streams an instance receives. Unscoped instances see
    /// every stream and must filter internally.
    pub fn set_filter(&mut self, id: &StrategyId, filter: StreamFilter) -> Result<(), StrategyError> {
        let hosted = self
            .instances
            .get_mut(id)
            .ok_or_else(|| StrategyError::NotFound(id.clone()))?;
        hosted.filter = filter;
        Ok(())
    }

    pub fn start(&mut self, id: &StrategyId) -> Result<(), StrategyError> {
        let hosted = self
            .instances
            .get_mut(id)
            .ok_or_else(|| StrategyError::NotFound(id.clone()))?;
        match hosted.phase {
            StrategyPhase::Initialized | StrategyPhase::Stopped => {
                hosted.phase = StrategyPhase::Running;
                info!(%id, "strategy started");
                Ok(())
            }
            phase => Err(StrategyError::InvalidTransition {
                id: id.clone(),
                action: "start",
                phase,
            }),
        }
    }

    /// Begin stopping: signals emitted from this point are discarded.
    pub fn stop(&mut self, id: &StrategyId) -> Result<(), StrategyError> {
        let hosted = self
            .instances
            .get_mut(id)
            .ok_or_else(|| StrategyError::NotFound(id.clone()))?;
        match hosted.phase {
            StrategyPhase::Running => {
                hosted.phase = StrategyPhase::Stopping;
                Ok(())
            }
            phase => Err(StrategyError::InvalidTransition {
                id: id.clone(),
                action: "stop",
                phase,
            }),
        }
    }

    /// Finish stopping once in-flight callbacks have drained.
    pub fn finish_stop(&mut self, id: &StrategyId) -> Result<(), StrategyError> {
        let hosted = self
            .instances
            .get_mut(id)
            .ok_or_else(|| StrategyError::NotFound(id.clone()))?;
        hosted.phase = StrategyPhase::Stopped;
        info!(%id, "strategy stopped");
        Ok(())
    }

    pub fn remove(&mut self, id: &StrategyId) -> Result<(), StrategyError> {
        self.instances
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StrategyError::NotFound(id.clone()))
    }

    pub fn phase(&self, id: &StrategyId) -> Option<StrategyPhase> {
        self.instances.get(id).map(|hosted| hosted.phase)
    }

    pub fn running(&self) -> Vec<StrategyId> {
        let mut ids: Vec<StrategyId> = self
            .instances
            .iter()
            .filter(|(_, hosted)| hosted.phase == StrategyPhase::Running)
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Deliver a bar to every running instance whose filter accepts it,
    /// collecting the signals. Signals from a `Stopping` instance are
    /// dropped.
    pub fn on_bar(&mut self, bar: &Bar) -> Vec<Signal> {
        self.dispatch(
            |filter| filter.accepts_bar(bar),
            |strategy| strategy.on_bar(bar),
        )
    }

    pub fn on_ticker(&mut self, ticker: &Ticker) -> Vec<Signal> {
        self.dispatch(
            |filter| filter.accepts_symbol(&ticker.symbol),
            |strategy| strategy.on_ticker(ticker),
        )
    }

    pub fn on_book(&mut self, book: &OrderBook) -> Vec<Signal> {
        self.dispatch(
            |filter| filter.accepts_symbol(&book.symbol),
            |strategy| strategy.on_book(book),
        )
    }

    fn dispatch(
        &mut self,
        accepts: impl Fn(&StreamFilter) -> bool,
        mut callback: impl FnMut(&mut Box<dyn Strategy>) -> Vec<Signal>,
    ) -> Vec<Signal> {
        let mut collected = Vec::new();
        for (id, hosted) in &mut self.instances {
            if !accepts(&hosted.filter) {
                continue;
            }
            match hosted.phase {
                StrategyPhase::Running => {
                    collected.extend(callback(&mut hosted.strategy));
                }
                StrategyPhase::Stopping => {
                    // Callback still runs (in-flight work completes) but its
                    // signals are discarded.
                    let dropped = callback(&mut hosted.strategy);
                    if !dropped.is_empty() {
                        warn!(%id, count = dropped.len(), "signals dropped while stopping");
                    }
                }
                _ => {
                    debug!(%id, phase = %hosted.phase, "skipping idle strategy");
                }
            }
        }
        collected
    }

    /// Serialized state per instance, for crash recovery.
    pub fn snapshots(&self) -> Vec<(StrategyId, Vec<u8>)> {
        self.instances
            .iter()
            .map(|(id, hosted)| (id.clone(), hosted.strategy.state_snapshot()))
            .collect()
    }
}
