use crate::{
    error::ExecutionError,
    iceberg::{SplitStyle, iceberg_plan, min_slices_for_display},
    plan::{ExecutionAlgorithm, ExecutionPlan},
    slippage::{SlippageEstimate, SlippageSeverity, SlippageThresholds, estimate_slippage},
    twap::twap_plan,
    vwap::{VolumeCurve, vwap_plan},
};
use chrono::{DateTime, Duration, Utc};
use kestrel_data::{Side, Symbol, books::OrderBook};
use rand::Rng;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::debug;

/// A sized intent ready for execution planning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub symbol: Symbol,
    pub side: Side,
    pub quantity: Decimal,
    /// Urgency in [0, 1]; higher compresses the schedule.
    pub urgency: Decimal,
}

/// Planner tuning. Defaults follow the slippage thresholds and a
/// 15s..120s slice-interval band.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlannerConfig {
    pub thresholds: SlippageThresholds,
    /// Order is "small" when quantity <= ADV * this ratio.
    pub small_order_adv_ratio: Decimal,
    pub min_slice_interval_secs: i64,
    pub max_slice_interval_secs: i64,
    pub default_slices: usize,
    pub max_slices: usize,
    pub twap_randomness: f64,
    pub vwap_curve: VolumeCurve,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            thresholds: SlippageThresholds::default(),
            small_order_adv_ratio: Decimal::new(1, 3), // 0.1% of ADV
            min_slice_interval_secs: 15,
            max_slice_interval_secs: 120,
            default_slices: 8,
            max_slices: 64,
            twap_randomness: 0.15,
            vwap_curve: VolumeCurve::UShaped,
        }
    }
}

/// Rolling realised-vs-predicted slippage feedback driving the adaptive
/// algorithm.
#[derive(Debug, Clone, Default)]
pub struct SlippageFeedback {
    window: VecDeque<(Decimal, Decimal)>,
}

impl SlippageFeedback {
    const WINDOW: usize = 32;

    pub fn record(&mut self, predicted: Decimal, realised: Decimal) {
        self.window.push_back((predicted, realised));
        if self.window.len() > Self::WINDOW {
            self.window.pop_front();
        }
    }

    /// Average realised/predicted ratio. Above one the market is punishing
    /// us harder than the book walk suggested.
    pub fn bias(&self) -> Decimal {
        if self.window.is_empty() {
            return Decimal::ONE;
        }
        let mut ratios = Decimal::ZERO;
        let mut count = 0u64;
        for (predicted, realised) in &self.window {
            if predicted.is_zero() {
                continue;
            }
            ratios += *realised / *predicted;
            count += 1;
        }
        if count == 0 {
            Decimal::ONE
        } else {
            ratios / Decimal::from(count)
        }
    }
}

/// Chooses an execution algorithm for each accepted intent from order size
/// versus book liquidity and the intent's urgency.
#[derive(Debug, Clone, Default)]
pub struct ExecutionPlanner {
    config: PlannerConfig,
    feedback: SlippageFeedback,
}

impl ExecutionPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            config,
            feedback: SlippageFeedback::default(),
        }
    }

    pub fn feedback_mut(&mut self) -> &mut SlippageFeedback {
        &mut self.feedback
    }

    /// Slice interval compressed by urgency inside the configured band.
    fn slice_interval(&self, urgency: Decimal) -> Duration {
        let min = self.config.min_slice_interval_secs;
        let max = self.config.max_slice_interval_secs.max(min);
        let urgency = urgency.clamp(Decimal::ZERO, Decimal::ONE);
        let span = Decimal::from((max - min) as u64);
        let offset = (span * urgency).to_i64().unwrap_or(0);
        Duration::seconds(max - offset)
    }

    /// Choose and build the execution plan for a sized intent against the
    /// current book snapshot.
    pub fn plan<R: Rng>(
        &mut self,
        request: &ExecutionRequest,
        book: &OrderBook,
        average_daily_volume: Option<Decimal>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<ExecutionPlan, ExecutionError> {
        let estimate = estimate_slippage(book, request.side, request.quantity, &self.config.thresholds)
            .ok_or_else(|| ExecutionError::MissingMarketData {
                symbol: request.symbol.clone(),
            })?;

        let small_enough = average_daily_volume
            .map(|adv| request.quantity <= adv * self.config.small_order_adv_ratio)
            .unwrap_or(false);

        let algorithm = self.select(&estimate, small_enough, request.urgency);
        debug!(
            symbol = %request.symbol,
            side = %request.side,
            quantity = %request.quantity,
            slippage = %estimate.slippage,
            severity = %estimate.severity,
            %algorithm,
            "execution plan selected"
        );

        let interval = self.slice_interval(request.urgency);
        match algorithm {
            ExecutionAlgorithm::Immediate => ExecutionPlan::new(
                ExecutionAlgorithm::Immediate,
                request.quantity,
                vec![crate::plan::Slice::new(request.quantity, now)],
                now,
            ),
            ExecutionAlgorithm::Twap => twap_plan(
                request.quantity,
                self.config.default_slices,
                interval,
                self.config.twap_randomness,
                now,
                rng,
            ),
            ExecutionAlgorithm::Vwap => vwap_plan(
                request.quantity,
                self.config.default_slices,
                &self.config.vwap_curve,
                interval,
                self.config.twap_randomness,
                now,
                rng,
            ),
            ExecutionAlgorithm::Iceberg => {
                let display_cap = display_cap(book, request.side, request.quantity);
                let slices = min_slices_for_display(request.quantity, display_cap)
                    .clamp(self.config.default_slices, self.config.max_slices);
                iceberg_plan(
                    request.quantity,
                    slices,
                    display_cap,
                    SplitStyle::Linear,
                    interval,
                    now,
                )
            }
            ExecutionAlgorithm::Adaptive => {
                self.adaptive_plan(request, book, interval, now)
            }
        }
    }

    /// Algorithm choice:
    /// * small and cheap -> immediate;
    /// * book cannot absorb the order -> adaptive;
    /// * high impact -> iceberg;
    /// * medium impact -> vwap for patient intents, twap otherwise.
    fn select(
        &self,
        estimate: &SlippageEstimate,
        small_enough: bool,
        urgency: Decimal,
    ) -> ExecutionAlgorithm {
        if small_enough
            && !estimate.exhausted
            && estimate.slippage < self.config.thresholds.warn
        {
            return ExecutionAlgorithm::Immediate;
        }
        if estimate.exhausted || estimate.severity == SlippageSeverity::Extreme {
            return ExecutionAlgorithm::Adaptive;
        }
        match estimate.severity {
            SlippageSeverity::High => ExecutionAlgorithm::Iceberg,
            SlippageSeverity::Medium | SlippageSeverity::Low => {
                if urgency >= Decimal::new(5, 1) {
                    ExecutionAlgorithm::Twap
                } else {
                    ExecutionAlgorithm::Vwap
                }
            }
            SlippageSeverity::Extreme => ExecutionAlgorithm::Adaptive,
        }
    }

    /// Adaptive plan: iceberg-style hidden slices sized by the touch
    /// liquidity, with slice count scaled by the realised-slippage feedback
    /// bias. When realised slippage has been running hot the plan slices
    /// finer and hides more.
    fn adaptive_plan(
        &self,
        request: &ExecutionRequest,
        book: &OrderBook,
        interval: Duration,
        now: DateTime<Utc>,
    ) -> Result<ExecutionPlan, ExecutionError> {
        let touch = touch_liquidity(book, request.side, request.quantity);
        let base_slices = min_slices_for_display(request.quantity, touch);
        let bias = self.feedback.bias();
        let scaled = if bias > Decimal::ONE {
            let extra = (Decimal::from(base_slices as u64) * (bias - Decimal::ONE))
                .to_usize()
                .unwrap_or(0);
            base_slices + extra
        } else {
            base_slices
        };
        let max_slices = self.config.max_slices.max(2);
        let floor = base_slices.clamp(2, max_slices);
        let slices = scaled.clamp(floor, max_slices);

        // Display well under the touch so the resting tranche never reads as
        // the full intent.
        let display_cap = (touch * Decimal::new(4, 1)).max(Decimal::new(1, 6));
        let mut plan = iceberg_plan(
            request.quantity,
            slices,
            display_cap,
            SplitStyle::Adaptive,
            interval,
            now,
        )?;
        plan.algorithm = ExecutionAlgorithm::Adaptive;
        Ok(plan)
    }
}

/// Liquidity resting at the touch on the side the taker would consume.
fn touch_liquidity(book: &OrderBook, side: Side, quantity: Decimal) -> Decimal {
    let best = match side {
        Side::Buy => book.best_ask(),
        Side::Sell => book.best_bid(),
    };
    best.map(|level| level.amount)
        .unwrap_or(quantity)
        .max(Decimal::new(1, 6))
}

/// Display cap for plain iceberg plans: bounded by the touch so a slice
/// never dominates the best level.
fn display_cap(book: &OrderBook, side: Side, quantity: Decimal) -> Decimal {
    touch_liquidity(book, side, quantity).min(quantity)
}
