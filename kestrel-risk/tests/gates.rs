use chrono::DateTime;
use kestrel_data::{Side, Symbol, Venue, books::{Level, OrderBook}};
use kestrel_execution::{
    balance::{AccountId, AccountSnapshot, Position},
    order::StrategyId,
    slippage::SlippageThresholds,
};
use kestrel_risk::{
    breaker::BreakerLevel,
    limits::RiskLimits,
    monitor::ActionState,
    pipeline::RiskPipeline,
};
use kestrel_strategy::signal::{Signal, SignalIntent};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::collections::BTreeSet;

fn at(secs: i64) -> chrono::DateTime<chrono::Utc> {
    DateTime::from_timestamp(secs, 0).unwrap()
}

fn limits() -> RiskLimits {
    RiskLimits {
        allowed_symbols: BTreeSet::from([Symbol::new("BTC/USDT")]),
        allowed_venues: BTreeSet::from([Venue::Mock]),
        ..RiskLimits::default()
    }
}

fn account(equity: Decimal) -> AccountSnapshot {
    AccountSnapshot::new(
        AccountId::new("main"),
        Venue::Mock,
        equity,
        equity,
        Decimal::ZERO,
        Vec::new(),
        at(0),
    )
}

fn deep_book() -> OrderBook {
    OrderBook::new(
        Symbol::new("BTC/USDT"),
        at(0),
        1,
        (0..20).map(|i| Level::new(dec!(49990) - Decimal::from(i * 10), dec!(10))),
        (0..20).map(|i| Level::new(dec!(50010) + Decimal::from(i * 10), dec!(10))),
    )
    .unwrap()
}

fn open_signal(symbol: &str) -> Signal {
    Signal::market(
        StrategyId::new("test"),
        Symbol::new(symbol),
        Side::Buy,
        SignalIntent::Open,
        at(0),
        0,
    )
    .with_stop_loss(dec!(49500))
}

fn close_signal(symbol: &str) -> Signal {
    Signal::market(
        StrategyId::new("test"),
        Symbol::new(symbol),
        Side::Sell,
        SignalIntent::Close,
        at(0),
        1,
    )
}

fn pipeline() -> RiskPipeline {
    RiskPipeline::new(limits(), SlippageThresholds::default()).unwrap()
}

#[test]
fn clean_signal_passes_and_is_sized() {
    let mut pipeline = pipeline();
    let approved = pipeline
        .check(
            open_signal("BTC/USDT"),
            &account(dec!(10000)),
            Some(&deep_book()),
            dec!(50000),
            BreakerLevel::Normal,
            &ActionState::new(),
            at(10),
        )
        .unwrap();
    let sized = approved.into_item();
    // risk rule gives 0.2 but the 20% position clamp binds: 0.04.
    assert_eq!(sized.quantity, dec!(0.04));
    assert!(sized.warnings.is_empty());
}

#[test]
fn allow_list_denies_unsubscribed_symbol() {
    let mut pipeline = pipeline();
    let refused = pipeline
        .check(
            open_signal("DOGE/USDT"),
            &account(dec!(10000)),
            None,
            dec!(0.1),
            BreakerLevel::Normal,
            &ActionState::new(),
            at(10),
        )
        .unwrap_err();
    assert!(refused.reason.contains("allow_list"), "{}", refused.reason);
}

#[test]
fn breaker_l2_denies_opens_but_not_closes() {
    let mut pipeline = pipeline();
    let refused = pipeline
        .check(
            open_signal("BTC/USDT"),
            &account(dec!(10000)),
            Some(&deep_book()),
            dec!(50000),
            BreakerLevel::L2,
            &ActionState::new(),
            at(10),
        )
        .unwrap_err();
    assert!(refused.reason.contains("circuit_breaker"));

    assert!(
        pipeline
            .check(
                close_signal("BTC/USDT"),
                &account(dec!(10000)),
                Some(&deep_book()),
                dec!(50000),
                BreakerLevel::L2,
                &ActionState::new(),
                at(10),
            )
            .is_ok()
    );
}

#[test]
fn emergency_denies_everything() {
    let mut pipeline = pipeline();
    assert!(
        pipeline
            .check(
                close_signal("BTC/USDT"),
                &account(dec!(10000)),
                Some(&deep_book()),
                dec!(50000),
                BreakerLevel::Emergency,
                &ActionState::new(),
                at(10),
            )
            .is_err()
    );
}

#[test]
fn position_cap_counts_existing_exposure() {
    let limits = RiskLimits {
        default_position_cap: dec!(0.05),
        ..limits()
    };
    let mut pipeline =
        RiskPipeline::new(limits, SlippageThresholds::default()).unwrap();

    let mut snapshot = account(dec!(10000));
    let mut position = Position::flat(Symbol::new("BTC/USDT"), Venue::Mock, at(0));
    position.quantity = dec!(0.03);
    position.average_entry_price = dec!(50000);
    snapshot.positions.push(position);

    let refused = pipeline
        .check(
            open_signal("BTC/USDT"),
            &snapshot,
            Some(&deep_book()),
            dec!(50000),
            BreakerLevel::Normal,
            &ActionState::new(),
            at(10),
        )
        .unwrap_err();
    assert!(refused.reason.contains("position_limits"), "{}", refused.reason);
}

/// Hot realized volatility shrinks the position cap until the same signal
/// no longer fits; the cap relaxes again once the symbol calms down.
#[test]
fn volatility_shrinks_the_position_cap() {
    let limits = RiskLimits {
        default_position_cap: dec!(0.05),
        baseline_volatility: Some(dec!(0.02)),
        ..limits()
    };
    let mut pipeline =
        RiskPipeline::new(limits, SlippageThresholds::default()).unwrap();

    // Four times the baseline quarters the cap: 0.0125 < the 0.04 sizing.
    pipeline.set_volatility(Symbol::new("BTC/USDT"), dec!(0.08));
    let refused = pipeline
        .check(
            open_signal("BTC/USDT"),
            &account(dec!(10000)),
            Some(&deep_book()),
            dec!(50000),
            BreakerLevel::Normal,
            &ActionState::new(),
            at(10),
        )
        .unwrap_err();
    assert!(refused.reason.contains("position_limits"), "{}", refused.reason);

    pipeline.set_volatility(Symbol::new("BTC/USDT"), dec!(0.02));
    assert!(
        pipeline
            .check(
                open_signal("BTC/USDT"),
                &account(dec!(10000)),
                Some(&deep_book()),
                dec!(50000),
                BreakerLevel::Normal,
                &ActionState::new(),
                at(20),
            )
            .is_ok()
    );
}

#[test]
fn daily_loss_blocks_opens_allows_closes() {
    let mut pipeline = pipeline();
    pipeline.record_realised_pnl(dec!(-2000), at(10));

    let refused = pipeline
        .check(
            open_signal("BTC/USDT"),
            &account(dec!(10000)),
            Some(&deep_book()),
            dec!(50000),
            BreakerLevel::Normal,
            &ActionState::new(),
            at(20),
        )
        .unwrap_err();
    assert!(refused.reason.contains("daily_loss"), "{}", refused.reason);

    assert!(
        pipeline
            .check(
                close_signal("BTC/USDT"),
                &account(dec!(10000)),
                Some(&deep_book()),
                dec!(50000),
                BreakerLevel::Normal,
                &ActionState::new(),
                at(20),
            )
            .is_ok()
    );
}

#[test]
fn daily_loss_resets_at_utc_midnight() {
    let mut pipeline = pipeline();
    pipeline.record_realised_pnl(dec!(-2000), at(10));
    assert_eq!(pipeline.day_pnl(), dec!(-2000));

    // Next UTC day: the guard is clear again.
    let next_day = at(10 + 86_400);
    assert!(
        pipeline
            .check(
                open_signal("BTC/USDT"),
                &account(dec!(10000)),
                Some(&deep_book()),
                dec!(50000),
                BreakerLevel::Normal,
                &ActionState::new(),
                next_day,
            )
            .is_ok()
    );
}

#[test]
fn oversized_order_denied_by_liquidity_gate() {
    // A book with almost no depth: even the clamped size exhausts it.
    let thin_book = OrderBook::new(
        Symbol::new("BTC/USDT"),
        at(0),
        1,
        vec![Level::new(dec!(49990), dec!(0.001))],
        vec![Level::new(dec!(50010), dec!(0.001))],
    )
    .unwrap();
    let mut pipeline = pipeline();
    let refused = pipeline
        .check(
            open_signal("BTC/USDT"),
            &account(dec!(10000)),
            Some(&thin_book),
            dec!(50000),
            BreakerLevel::Normal,
            &ActionState::new(),
            at(10),
        )
        .unwrap_err();
    assert!(refused.reason.contains("liquidity"), "{}", refused.reason);
}

#[test]
fn cooldown_blocks_retry_after_failure() {
    let mut pipeline = pipeline();
    pipeline.record_failure(Symbol::new("BTC/USDT"), Side::Buy, at(10));

    let refused = pipeline
        .check(
            open_signal("BTC/USDT"),
            &account(dec!(10000)),
            Some(&deep_book()),
            dec!(50000),
            BreakerLevel::Normal,
            &ActionState::new(),
            at(30),
        )
        .unwrap_err();
    assert!(refused.reason.contains("cooldown"), "{}", refused.reason);

    // After the cooldown window the same intent is allowed again.
    assert!(
        pipeline
            .check(
                open_signal("BTC/USDT"),
                &account(dec!(10000)),
                Some(&deep_book()),
                dec!(50000),
                BreakerLevel::Normal,
                &ActionState::new(),
                at(100),
            )
            .is_ok()
    );
}

#[test]
fn paused_state_carries_reason_into_denial() {
    let mut pipeline = pipeline();
    let mut actions = ActionState::new();
    actions.pause_trading("margin");

    let refused = pipeline
        .check(
            open_signal("BTC/USDT"),
            &account(dec!(10000)),
            Some(&deep_book()),
            dec!(50000),
            BreakerLevel::Normal,
            &actions,
            at(10),
        )
        .unwrap_err();
    assert!(refused.reason.contains("margin"), "{}", refused.reason);
}
