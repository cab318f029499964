use chrono::DateTime;
use kestrel_data::{Side, Symbol, books::{Level, OrderBook}};
use kestrel_execution::{
    plan::ExecutionAlgorithm,
    planner::{ExecutionPlanner, ExecutionRequest, PlannerConfig},
    slippage::{SlippageThresholds, estimate_slippage},
};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn thin_book() -> OrderBook {
    // 0.8 BTC at the best ask, a few deeper levels.
    OrderBook::new(
        Symbol::new("BTC/USDT"),
        DateTime::from_timestamp(0, 0).unwrap(),
        1,
        vec![
            Level::new(dec!(49990), dec!(0.9)),
            Level::new(dec!(49980), dec!(1.2)),
        ],
        vec![
            Level::new(dec!(50010), dec!(0.8)),
            Level::new(dec!(50050), dec!(1.0)),
            Level::new(dec!(50100), dec!(1.5)),
        ],
    )
    .unwrap()
}

fn deep_book() -> OrderBook {
    let bids = (0..50).map(|i| Level::new(dec!(49990) - Decimal::from(i * 10), dec!(50)));
    let asks = (0..50).map(|i| Level::new(dec!(50010) + Decimal::from(i * 10), dec!(50)));
    OrderBook::new(
        Symbol::new("BTC/USDT"),
        DateTime::from_timestamp(0, 0).unwrap(),
        1,
        bids,
        asks,
    )
    .unwrap()
}

/// Large order against a thin book: adaptive is chosen, at least ten
/// slices, per-slice display at most the touch, hidden ratio above 70%.
#[test]
fn iceberg_plan_hides_most_of_a_thin_book_order() {
    let mut planner = ExecutionPlanner::new(PlannerConfig::default());
    let mut rng = StdRng::seed_from_u64(42);
    let request = ExecutionRequest {
        symbol: Symbol::new("BTC/USDT"),
        side: Side::Buy,
        quantity: dec!(10),
        urgency: dec!(0.5),
    };

    let plan = planner
        .plan(
            &request,
            &thin_book(),
            Some(dec!(5000)),
            DateTime::from_timestamp(0, 0).unwrap(),
            &mut rng,
        )
        .unwrap();

    assert_eq!(plan.algorithm, ExecutionAlgorithm::Adaptive);
    assert!(plan.slices.len() >= 10, "got {} slices", plan.slices.len());
    assert_eq!(
        plan.slices.iter().map(|s| s.quantity).sum::<Decimal>(),
        dec!(10)
    );
    for slice in &plan.slices {
        let display = slice.display_quantity.expect("adaptive slices are hidden");
        assert!(display <= dec!(1));
        assert!(display <= slice.quantity);
    }
    let display_ratio = plan.displayed_quantity() / plan.total_quantity;
    assert!(
        display_ratio < dec!(0.3),
        "hidden ratio too low: displayed {display_ratio}"
    );
}

/// Small order against a deep book goes straight to the market.
#[test]
fn small_cheap_order_is_immediate() {
    let mut planner = ExecutionPlanner::new(PlannerConfig::default());
    let mut rng = StdRng::seed_from_u64(42);
    let request = ExecutionRequest {
        symbol: Symbol::new("BTC/USDT"),
        side: Side::Buy,
        quantity: dec!(0.5),
        urgency: dec!(0.9),
    };

    let plan = planner
        .plan(
            &request,
            &deep_book(),
            Some(dec!(5000)),
            DateTime::from_timestamp(0, 0).unwrap(),
            &mut rng,
        )
        .unwrap();
    assert_eq!(plan.algorithm, ExecutionAlgorithm::Immediate);
    assert_eq!(plan.slices.len(), 1);
}

/// Whatever the algorithm, slice quantities always sum to the request and
/// every slice is positive.
#[test]
fn plans_conserve_quantity_across_algorithms() {
    let mut planner = ExecutionPlanner::new(PlannerConfig::default());
    let mut rng = StdRng::seed_from_u64(7);
    let start = DateTime::from_timestamp(0, 0).unwrap();

    for (quantity, urgency, adv) in [
        (dec!(0.1), dec!(0.9), Some(dec!(5000))),
        (dec!(5), dec!(0.2), Some(dec!(5000))),
        (dec!(5), dec!(0.8), Some(dec!(5000))),
        (dec!(40), dec!(0.5), None),
        (dec!(500), dec!(0.5), Some(dec!(5000))),
    ] {
        let request = ExecutionRequest {
            symbol: Symbol::new("BTC/USDT"),
            side: Side::Sell,
            quantity,
            urgency,
        };
        let plan = planner
            .plan(&request, &deep_book(), adv, start, &mut rng)
            .unwrap();
        assert_eq!(
            plan.slices.iter().map(|s| s.quantity).sum::<Decimal>(),
            quantity,
            "algorithm {:?}",
            plan.algorithm
        );
        assert!(plan.slices.iter().all(|s| s.quantity > Decimal::ZERO));
    }
}

/// Book-walk slippage is monotone non-decreasing in order size for any
/// uncrossed book.
#[test]
fn slippage_monotone_in_size_over_random_books() {
    let thresholds = SlippageThresholds::default();
    for seed in 0..10u64 {
        // Deterministic pseudo-random book shapes.
        let levels = 3 + (seed % 5) as i64;
        let book = OrderBook::new(
            Symbol::new("BTC/USDT"),
            DateTime::from_timestamp(0, 0).unwrap(),
            1,
            (0..levels).map(|i| {
                Level::new(
                    dec!(1000) - Decimal::from(i * 2 + (seed % 3) as i64),
                    Decimal::from((seed % 7 + 1) as i64) + Decimal::from(i),
                )
            }),
            (0..levels).map(|i| {
                Level::new(
                    dec!(1002) + Decimal::from(i * 2 + (seed % 3) as i64),
                    Decimal::from((seed % 7 + 1) as i64) + Decimal::from(i),
                )
            }),
        )
        .unwrap();

        let mut previous = Decimal::ZERO;
        for step in 1..=20 {
            let size = Decimal::from(step);
            let estimate = estimate_slippage(&book, Side::Buy, size, &thresholds).unwrap();
            assert!(
                estimate.slippage >= previous,
                "seed {seed} size {size}: {} < {previous}",
                estimate.slippage
            );
            previous = estimate.slippage;
        }
    }
}
