use chrono::DateTime;
use kestrel_data::{
    Symbol,
    bar::{Bar, Timeframe},
    engine::MarketEngine,
    event::{MarketEvent, StreamKind},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn m5_bar(symbol: &str, index: i64) -> Bar {
    Bar::new(
        Symbol::new(symbol),
        Timeframe::M5,
        DateTime::from_timestamp(index * 300, 0).unwrap(),
        dec!(50000),
        dec!(50100),
        dec!(49900),
        dec!(50000) + Decimal::from(index),
        dec!(2),
    )
    .unwrap()
}

/// A strategy following multiple timeframes of the same feed sees each
/// stream in strictly increasing time, and higher timeframes only on their
/// boundary closes.
#[test]
fn multi_timeframe_fanout_preserves_order() {
    let mut engine = MarketEngine::new(Timeframe::M5, 512);
    let symbol = Symbol::new("BTC/USDT");

    let (_, mut m5_rx) = engine
        .subscribe(symbol.clone(), StreamKind::Bars(Timeframe::M5))
        .unwrap();
    let (_, mut m15_rx) = engine
        .subscribe(symbol.clone(), StreamKind::Bars(Timeframe::M15))
        .unwrap();
    let (_, mut h1_rx) = engine
        .subscribe(symbol.clone(), StreamKind::Bars(Timeframe::H1))
        .unwrap();

    // Two full hours of five-minute bars.
    for i in 0..24 {
        engine.feed_bar(m5_bar("BTC/USDT", i)).unwrap();
    }

    let mut m5_times = Vec::new();
    while let Ok(MarketEvent::Bar(bar)) = m5_rx.try_recv() {
        m5_times.push(bar.time);
    }
    assert_eq!(m5_times.len(), 24);
    assert!(m5_times.windows(2).all(|pair| pair[0] < pair[1]));

    let mut m15_count = 0;
    while let Ok(MarketEvent::Bar(bar)) = m15_rx.try_recv() {
        assert_eq!(bar.timeframe, Timeframe::M15);
        m15_count += 1;
    }
    assert_eq!(m15_count, 8);

    let mut h1_bars = Vec::new();
    while let Ok(MarketEvent::Bar(bar)) = h1_rx.try_recv() {
        h1_bars.push(bar);
    }
    assert_eq!(h1_bars.len(), 2);
    // Each hourly bar folds twelve five-minute volumes.
    assert_eq!(h1_bars[0].volume, dec!(24));
    assert_eq!(h1_bars[0].close, dec!(50011));
    assert_eq!(h1_bars[1].close, dec!(50023));
}

/// Streams are independent per symbol; a disconnect notice reaches only the
/// affected symbol's subscribers.
#[test]
fn feed_interrupted_scoped_to_symbol() {
    let mut engine = MarketEngine::new(Timeframe::M5, 16);
    let btc = Symbol::new("BTC/USDT");
    let eth = Symbol::new("ETH/USDT");

    let (_, mut btc_rx) = engine
        .subscribe(btc.clone(), StreamKind::Bars(Timeframe::M5))
        .unwrap();
    let (_, mut eth_rx) = engine
        .subscribe(eth.clone(), StreamKind::Bars(Timeframe::M5))
        .unwrap();

    engine.feed_bar(m5_bar("BTC/USDT", 0)).unwrap();
    engine.feed_bar(m5_bar("ETH/USDT", 0)).unwrap();
    engine.feed_interrupted(&btc);

    assert!(matches!(btc_rx.try_recv().unwrap(), MarketEvent::Bar(_)));
    assert!(matches!(
        btc_rx.try_recv().unwrap(),
        MarketEvent::FeedInterrupted { .. }
    ));
    assert!(matches!(eth_rx.try_recv().unwrap(), MarketEvent::Bar(_)));
    assert!(eth_rx.try_recv().is_err());

    // Cached state still served after the interruption.
    assert_eq!(
        engine.latest_bar(&btc, Timeframe::M5).unwrap().close,
        dec!(50000)
    );
}
