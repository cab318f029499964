use chrono::DateTime;
use kestrel_data::{Symbol, bar::{Bar, Timeframe}};
use kestrel_execution::order::StrategyId;
use kestrel_strategy::{
    registry::StrategyRegistry,
    runtime::{StrategyPhase, StrategyRuntime},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;

fn bar(index: i64, close: Decimal) -> Bar {
    Bar::new(
        Symbol::new("BTC/USDT"),
        Timeframe::H1,
        DateTime::from_timestamp(index * 3600, 0).unwrap(),
        close,
        close + dec!(10),
        close - dec!(10),
        close,
        dec!(5),
    )
    .unwrap()
}

fn sine_closes(count: usize) -> Vec<Decimal> {
    // 50000 + 2000 * sin(i/5), precomputed to keep the engine decimal-only.
    (0..count)
        .map(|i| {
            let radians = i as f64 / 5.0;
            let close = 50000.0 + 2000.0 * radians.sin();
            Decimal::try_from(close).unwrap().round_dp(2)
        })
        .collect()
}

#[test]
fn lifecycle_transitions_are_enforced() {
    let registry = StrategyRegistry::with_builtin();
    let mut runtime = StrategyRuntime::new();
    let id = StrategyId::new("sma-1");

    runtime
        .add(&registry, id.clone(), "trend_dual_sma", &json!({"short": 10, "long": 20}))
        .unwrap();
    assert_eq!(runtime.phase(&id), Some(StrategyPhase::Initialized));

    // Cannot stop before running.
    assert!(runtime.stop(&id).is_err());
    runtime.start(&id).unwrap();
    assert_eq!(runtime.phase(&id), Some(StrategyPhase::Running));

    runtime.stop(&id).unwrap();
    assert_eq!(runtime.phase(&id), Some(StrategyPhase::Stopping));
    runtime.finish_stop(&id).unwrap();
    assert_eq!(runtime.phase(&id), Some(StrategyPhase::Stopped));

    // Restartable after a clean stop.
    runtime.start(&id).unwrap();
    assert_eq!(runtime.phase(&id), Some(StrategyPhase::Running));
}

/// The dual-SMA strategy fed the sine series emits its first buy at the
/// first short-over-long cross.
#[test]
fn dual_sma_cross_emits_buy_on_sine_series() {
    let registry = StrategyRegistry::with_builtin();
    let mut runtime = StrategyRuntime::new();
    let id = StrategyId::new("sma-1");
    runtime
        .add(
            &registry,
            id.clone(),
            "trend_dual_sma",
            &json!({"short": 10, "long": 20, "exits": {"stop_loss_pct": "0.01"}}),
        )
        .unwrap();
    runtime.start(&id).unwrap();

    let mut buys = Vec::new();
    for (i, close) in sine_closes(50).into_iter().enumerate() {
        for signal in runtime.on_bar(&bar(i as i64, close)) {
            buys.push((i, signal));
        }
    }
    assert!(!buys.is_empty(), "sine series must produce a cross");
    let (first_index, first) = &buys[0];
    // The long window is 20 bars; nothing can fire before it is warm.
    assert!(*first_index >= 20);
    assert_eq!(first.side, kestrel_data::Side::Buy);
    assert!(first.stop_loss_price.is_some());
}

#[test]
fn stopping_instance_drops_signals() {
    let registry = StrategyRegistry::with_builtin();
    let mut runtime = StrategyRuntime::new();
    let id = StrategyId::new("sma-1");
    runtime
        .add(&registry, id.clone(), "trend_dual_sma", &json!({"short": 2, "long": 3}))
        .unwrap();
    runtime.start(&id).unwrap();

    // Drive toward a cross, then stop right before it completes.
    for (i, close) in [100, 90, 80, 70].iter().enumerate() {
        runtime.on_bar(&bar(i as i64, Decimal::from(*close)));
    }
    runtime.stop(&id).unwrap();
    let signals = runtime.on_bar(&bar(4, dec!(140)));
    assert!(signals.is_empty(), "stopping instances emit nothing");
}
