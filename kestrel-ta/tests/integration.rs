use kestrel_ta::{
    indicators::{
        AverageTrueRange, BollingerBands, Macd, RelativeStrengthIndex, SimpleMovingAverage,
    },
    patterns::{Cross, CrossDetector},
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Rolling SMA of period N must equal the naive mean of the last N closes.
#[test]
fn sma_equals_naive_mean_for_any_series() {
    let closes: Vec<Decimal> = (0..100)
        .map(|i| {
            // Deterministic wobbly series.
            Decimal::from(1000 + (i * 37) % 91) + Decimal::new(i % 17, 2)
        })
        .collect();

    for period in [2usize, 5, 14, 30] {
        let mut sma = SimpleMovingAverage::new(period);
        for (i, close) in closes.iter().enumerate() {
            let rolled = sma.update(*close);
            if i + 1 < period {
                assert_eq!(rolled, None);
                continue;
            }
            let window = &closes[i + 1 - period..=i];
            let naive = window.iter().copied().sum::<Decimal>()
                / Decimal::from(period as u64);
            assert_eq!(rolled, Some(naive), "period {period} bar {i}");
        }
    }
}

/// Indicators fed fewer bars than their warmup emit nothing and never panic.
#[test]
fn empty_and_short_inputs_are_silent() {
    let mut sma = SimpleMovingAverage::new(10);
    let mut rsi = RelativeStrengthIndex::new(14);
    let mut atr = AverageTrueRange::new(14);
    let mut bands = BollingerBands::new(20, dec!(2));
    let mut macd = Macd::new(12, 26, 9);

    for i in 0..5 {
        let px = Decimal::from(100 + i);
        assert_eq!(sma.update(px), None);
        assert_eq!(rsi.update(px), None);
        assert_eq!(atr.update(px + dec!(1), px - dec!(1), px), None);
        assert_eq!(bands.update(px), None);
        assert_eq!(macd.update(px), None);
    }
}

#[test]
fn cross_detector_round_trip() {
    let mut detector = CrossDetector::new();
    detector.update(dec!(9), dec!(10));
    assert_eq!(detector.update(dec!(11), dec!(10)), Some(Cross::Above));
    assert_eq!(detector.update(dec!(12), dec!(10)), None);
    assert_eq!(detector.update(dec!(9), dec!(10)), Some(Cross::Below));
}

/// Bollinger bandwidth expands with dispersion.
#[test]
fn bollinger_bandwidth_tracks_dispersion() {
    let mut calm = BollingerBands::new(5, dec!(2));
    let mut wild = BollingerBands::new(5, dec!(2));
    let mut calm_out = None;
    let mut wild_out = None;
    for i in 0..5i64 {
        calm_out = calm.update(dec!(100) + Decimal::new(i % 2, 1));
        wild_out = wild.update(dec!(100) + Decimal::from(i * 10));
    }
    assert!(wild_out.unwrap().bandwidth > calm_out.unwrap().bandwidth);
}
