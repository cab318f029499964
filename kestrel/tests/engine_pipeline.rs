use chrono::{DateTime, Utc};
use kestrel::{
    engine::{Engine, EngineConfig, EngineState, ExitCode},
    event::EngineEvent,
};
use kestrel_audit::{AuditConfig, verify_segment};
use kestrel_data::{Side, Symbol, Venue, bar::{Bar, Timeframe}};
use kestrel_execution::{balance::AccountId, client::MockExecutionClient, order::OrderKind};
use kestrel_risk::limits::RiskLimits;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

const INTEGRITY_KEY: &[u8] = b"engine-test-key";

fn at(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn sine_bar(index: i64) -> Bar {
    let radians = index as f64 / 5.0;
    let close = 50_000.0 + 2_000.0 * radians.sin();
    let close = Decimal::try_from(close).unwrap().round_dp(2);
    Bar::new(
        Symbol::new("BTC/USDT"),
        Timeframe::H1,
        at(index * 3600),
        close,
        close + dec!(50),
        close - dec!(50),
        close,
        dec!(100),
    )
    .unwrap()
}

fn config(audit_dir: Option<PathBuf>) -> EngineConfig {
    let mut config = EngineConfig::new(AccountId::new("main"), Venue::Mock, dec!(10000));
    config.feed_timeframe = Timeframe::H1;
    config.limits = RiskLimits {
        allowed_symbols: BTreeSet::from([Symbol::new("BTC/USDT")]),
        allowed_venues: BTreeSet::from([Venue::Mock]),
        position_percent: dec!(1),
        concentration_max: dec!(0.99),
        ..RiskLimits::default()
    };
    config.audit = audit_dir.map(|dir| (AuditConfig::new(dir), INTEGRITY_KEY.to_vec()));
    config
}

/// Dual-SMA long entry, end to end: fifty sine bars drive one buy signal
/// through the gates, sizing honours the risk-per-trade rule, and the
/// executor submits one market order.
#[tokio::test]
async fn dual_sma_entry_reaches_the_venue() {
    let client = Arc::new(MockExecutionClient::new());
    let mut engine = Engine::new(config(None), client.clone(), at(0)).unwrap();
    let events = engine.subscribe("test");

    engine.start(at(0)).unwrap();
    engine
        .watch_symbol(Symbol::new("BTC/USDT"), &[Timeframe::H1])
        .unwrap();
    engine
        .run_strategy(
            kestrel_execution::order::StrategyId::new("sma-1"),
            "trend_dual_sma",
            &serde_json::json!({"short": 10, "long": 20, "exits": {"stop_loss_pct": "0.01"}}),
            at(0),
        )
        .unwrap();

    for index in 0..50 {
        let bar = sine_bar(index);
        let now = bar.close_time();
        engine.on_bar(bar, now).await.unwrap();
    }

    let submitted = client.submitted();
    assert!(!submitted.is_empty(), "the cross must reach the venue");
    let entry = &submitted[0];
    assert_eq!(entry.side, Side::Buy);
    assert_eq!(entry.kind, OrderKind::Market);

    // Sizing: equity 10_000, risk 1%, stop 1% of entry price -> quantity
    // within the concentration haircut of 10_000 / px.
    let full_risk_quantity = dec!(10000) / entry_price_of(&events);
    assert!(entry.quantity <= full_risk_quantity);
    assert!(entry.quantity >= full_risk_quantity * dec!(0.95));

    // Exactly one buy submission before any sell appears.
    let first_sell = submitted.iter().position(|order| order.side == Side::Sell);
    let buys_before = submitted
        .iter()
        .take(first_sell.unwrap_or(submitted.len()))
        .filter(|order| order.side == Side::Buy)
        .count();
    assert_eq!(buys_before, 1);
}

/// Entry price implied by the first accepted signal's bar close.
fn entry_price_of(events: &kestrel::bus::BusSubscription) -> Decimal {
    let mut price = dec!(50000);
    for event in events.drain() {
        match event {
            EngineEvent::Bar(bar) => price = bar.close,
            EngineEvent::OrderSubmitted(_) => return price,
            _ => {}
        }
    }
    price
}

/// The engine publishes every pipeline stage to the bus, the audit sink
/// persists them, and the resulting chain verifies end to end.
#[tokio::test]
async fn audit_chain_covers_the_whole_run() {
    let dir = std::env::temp_dir().join(format!("kestrel-engine-audit-{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);

    let client = Arc::new(MockExecutionClient::new());
    let mut engine = Engine::new(config(Some(dir.clone())), client, at(0)).unwrap();
    engine.start(at(0)).unwrap();
    engine
        .watch_symbol(Symbol::new("BTC/USDT"), &[Timeframe::H1])
        .unwrap();
    engine
        .run_strategy(
            kestrel_execution::order::StrategyId::new("sma-1"),
            "trend_dual_sma",
            &serde_json::json!({"short": 10, "long": 20, "exits": {"stop_loss_pct": "0.01"}}),
            at(0),
        )
        .unwrap();

    for index in 0..50 {
        let bar = sine_bar(index);
        let now = bar.close_time();
        engine.on_bar(bar, now).await.unwrap();
    }
    assert_eq!(engine.stop(at(50 * 3600)).await, ExitCode::CleanStop);
    assert_eq!(engine.state(), EngineState::Stopped);

    // One segment per UTC day of bar time; every segment verifies, and the
    // stream contains the pipeline stages.
    let mut segments: Vec<PathBuf> = fs::read_dir(&dir)
        .unwrap()
        .flatten()
        .map(|entry| entry.path())
        .collect();
    segments.sort();
    assert!(!segments.is_empty());

    let mut all_content = String::new();
    for segment in &segments {
        let report = verify_segment(segment, INTEGRITY_KEY).unwrap();
        assert!(report.valid, "segment {segment:?} must verify");
        all_content.push_str(&fs::read_to_string(segment).unwrap());
    }
    for topic in ["\"bar\"", "\"signal\"", "\"orderSubmitted\"", "\"engineStarted\""] {
        assert!(all_content.contains(topic), "missing topic {topic}");
    }

    let _ = fs::remove_dir_all(&dir);
}

/// Unsubscribed symbols are refused by the allow-list gate and surface as
/// signalRejected on the spine.
#[tokio::test]
async fn foreign_symbol_signal_is_rejected() {
    let client = Arc::new(MockExecutionClient::new());
    let mut config = config(None);
    // Allow-list covers BTC only, but the engine watches ETH too.
    config
        .limits
        .allowed_symbols
        .remove(&Symbol::new("ETH/USDT"));
    let mut engine = Engine::new(config, client.clone(), at(0)).unwrap();
    let events = engine.subscribe("test");

    engine.start(at(0)).unwrap();
    engine
        .watch_symbol(Symbol::new("ETH/USDT"), &[Timeframe::H1])
        .unwrap();
    engine
        .run_strategy(
            kestrel_execution::order::StrategyId::new("rsi-1"),
            "reversion_rsi",
            &serde_json::json!({"period": 3, "oversold": 45, "overbought": 70}),
            at(0),
        )
        .unwrap();

    // Collapse hard enough for an RSI entry on ETH.
    for (index, close) in [3000i64, 2900, 2700, 2400, 2100, 1900].iter().enumerate() {
        let close = Decimal::from(*close);
        let bar = Bar::new(
            Symbol::new("ETH/USDT"),
            Timeframe::H1,
            at(index as i64 * 3600),
            close,
            close + dec!(10),
            close - dec!(10),
            close,
            dec!(100),
        )
        .unwrap();
        let now = bar.close_time();
        engine.on_bar(bar, now).await.unwrap();
    }

    assert!(client.submitted().is_empty());
    let rejected = events
        .drain()
        .into_iter()
        .any(|event| matches!(event, EngineEvent::SignalRejected { reason, .. } if reason.contains("allow_list")));
    assert!(rejected, "allow-list rejection must reach the spine");
}

/// A venue that refuses the shutdown cancel leaves orders working; once
/// the grace deadline passes they are abandoned with `shutdownForced` and
/// the process reports exit code 2.
#[tokio::test]
async fn forced_shutdown_when_working_orders_cannot_drain() {
    let client = Arc::new(MockExecutionClient::new());
    let mut config = config(None);
    config.shutdown_grace = chrono::Duration::milliseconds(100);
    let mut engine = Engine::new(config, client.clone(), at(0)).unwrap();
    let events = engine.subscribe("test");

    engine.start(at(0)).unwrap();
    engine
        .watch_symbol(Symbol::new("BTC/USDT"), &[Timeframe::H1])
        .unwrap();
    engine
        .run_strategy(
            kestrel_execution::order::StrategyId::new("sma-1"),
            "trend_dual_sma",
            &serde_json::json!({"short": 10, "long": 20, "exits": {"stop_loss_pct": "0.01"}}),
            at(0),
        )
        .unwrap();

    // Drive to an entry so at least one acknowledged order rests.
    for index in 0..50 {
        let bar = sine_bar(index);
        let now = bar.close_time();
        engine.on_bar(bar, now).await.unwrap();
    }
    assert!(!client.submitted().is_empty());
    assert!(engine.status().working_orders > 0);

    client.fail_next_cancel(kestrel_execution::error::ExecutionError::TransientVenue {
        venue: Venue::Mock,
        reason: "maintenance window".into(),
    });

    let exit = engine.stop(at(50 * 3600)).await;
    assert_eq!(exit, ExitCode::ForcedShutdown);
    assert_eq!(exit.code(), 2);
    assert_eq!(engine.state(), EngineState::Stopped);

    let forced = events
        .drain()
        .into_iter()
        .any(|event| matches!(event, EngineEvent::ShutdownForced { .. }));
    assert!(forced, "shutdownForced must reach the spine");
}

/// Idempotent start and clean stop transitions.
#[tokio::test]
async fn lifecycle_is_idempotent() {
    let client = Arc::new(MockExecutionClient::new());
    let mut engine = Engine::new(config(None), client, at(0)).unwrap();

    engine.start(at(0)).unwrap();
    engine.start(at(1)).unwrap();
    assert_eq!(engine.state(), EngineState::Running);
    let status = engine.status();
    assert!(!status.trading_paused);
    assert_eq!(status.working_orders, 0);

    assert_eq!(engine.stop(at(2)).await, ExitCode::CleanStop);
    assert_eq!(engine.stop(at(3)).await, ExitCode::CleanStop);

    let snapshot = engine.query_account();
    assert_eq!(snapshot.equity, dec!(10000));
}
