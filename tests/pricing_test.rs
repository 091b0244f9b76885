//! Live pricing of a session's selection.

mod common;

use common::{seat, Harness};
use proptest::prelude::*;
use seat_booking::models::{PriceBreakdown, SessionToken};
use seat_booking::services::pricing::PricingCalculator;
use seat_booking::services::selection::SeatSelectionStore;

#[tokio::test]
async fn two_regular_seats_price_with_ten_percent_fee() {
    let harness = Harness::new();
    let inventory = harness.showtime("st-pricing-1");
    let mut selection = SeatSelectionStore::new(SessionToken::generate(), inventory);

    selection.toggle(&seat("A1")).unwrap();
    selection.toggle(&seat("A2")).unwrap();

    let price = harness.state.pricing.quote(&selection);
    assert_eq!(price, PriceBreakdown { base: 300, fee: 30, total: 330 });
}

#[tokio::test]
async fn three_premium_seats() {
    let harness = Harness::new();
    let inventory = harness.showtime("st-pricing-2");
    let mut selection = SeatSelectionStore::new(SessionToken::generate(), inventory);

    for id in ["G1", "G2", "G3"] {
        selection.toggle(&seat(id)).unwrap();
    }

    let price = harness.state.pricing.quote(&selection);
    assert_eq!(price, PriceBreakdown { base: 750, fee: 75, total: 825 });
}

#[tokio::test]
async fn price_follows_every_toggle() {
    let harness = Harness::new();
    let inventory = harness.showtime("st-pricing-3");
    let mut selection = SeatSelectionStore::new(SessionToken::generate(), inventory);
    let pricing = harness.state.pricing;

    selection.toggle(&seat("I5")).unwrap();
    assert_eq!(pricing.quote(&selection).total, 440);

    selection.toggle(&seat("A5")).unwrap();
    assert_eq!(pricing.quote(&selection).base, 550);

    selection.toggle(&seat("I5")).unwrap();
    assert_eq!(pricing.quote(&selection), PriceBreakdown { base: 150, fee: 15, total: 165 });

    selection.toggle(&seat("A5")).unwrap();
    assert_eq!(pricing.quote(&selection), PriceBreakdown::default());
}

proptest! {
    #[test]
    fn total_is_base_plus_rounded_fee(base in 0u64..1_000_000_000, bp in 0u32..5_000) {
        let pricing = PricingCalculator::new(bp);
        let price = pricing.from_base(base);

        prop_assert_eq!(price.base, base);
        prop_assert_eq!(price.total, price.base + price.fee);

        let exact = base as u128 * bp as u128;
        let scaled = price.fee as u128 * 10_000;
        prop_assert!(scaled.abs_diff(exact) <= 5_000);
    }

    #[test]
    fn fee_never_decreases_with_base(a in 0u64..10_000_000, b in 0u64..10_000_000) {
        let pricing = PricingCalculator::default();
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(pricing.fee(low) <= pricing.fee(high));
    }
}
