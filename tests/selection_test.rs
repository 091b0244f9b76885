//! Seat selection against the shared showtime inventory.

mod common;

use chrono::Duration;
use common::{seat, Harness};
use seat_booking::errors::BookingError;
use seat_booking::models::{SeatStatus, SessionToken};
use seat_booking::services::cleanup::CleanupService;
use seat_booking::services::selection::SeatSelectionStore;
use std::sync::atomic::{AtomicUsize, Ordering};
use uuid::Uuid;

#[tokio::test]
async fn select_then_deselect_restores_the_seat() {
    let harness = Harness::new();
    let inventory = harness.showtime("st-sel-1");
    let before = inventory.counts();
    let mut selection = SeatSelectionStore::new(SessionToken::generate(), inventory.clone());

    assert_eq!(selection.toggle(&seat("A1")).unwrap(), SeatStatus::Selected);
    assert_eq!(inventory.seat(&seat("A1")).unwrap().status, SeatStatus::Selected);

    assert_eq!(selection.toggle(&seat("A1")).unwrap(), SeatStatus::Available);
    assert!(selection.is_empty());
    assert_eq!(selection.subtotal(), 0);
    assert_eq!(inventory.seat(&seat("A1")).unwrap().status, SeatStatus::Available);
    assert_eq!(inventory.counts(), before);
}

#[tokio::test]
async fn booked_seat_cannot_be_selected() {
    let harness = Harness::new();
    let inventory = harness.showtime("st-sel-2");

    let buyer = SessionToken::generate();
    inventory.hold(&seat("B3"), &buyer).unwrap();
    inventory.commit(&[seat("B3")], &buyer, Uuid::new_v4()).unwrap();

    let mut selection = SeatSelectionStore::new(SessionToken::generate(), inventory.clone());
    let err = selection.toggle(&seat("B3")).unwrap_err();

    assert_eq!(err, BookingError::SeatConflict { seat: seat("B3") });
    assert!(selection.is_empty());
    assert_eq!(inventory.seat(&seat("B3")).unwrap().status, SeatStatus::Booked);
}

#[tokio::test]
async fn seat_held_by_another_session_conflicts() {
    let harness = Harness::new();
    let inventory = harness.showtime("st-sel-3");

    let mut first = SeatSelectionStore::new(SessionToken::generate(), inventory.clone());
    let mut second = SeatSelectionStore::new(SessionToken::generate(), inventory.clone());

    first.toggle(&seat("C4")).unwrap();
    assert!(matches!(second.toggle(&seat("C4")), Err(BookingError::SeatConflict { .. })));
    assert!(first.contains(&seat("C4")));
    assert!(!second.contains(&seat("C4")));
}

#[tokio::test]
async fn unknown_seat_is_not_found() {
    let harness = Harness::new();
    let inventory = harness.showtime("st-sel-4");
    let mut selection = SeatSelectionStore::new(SessionToken::generate(), inventory);

    assert!(matches!(selection.toggle(&seat("Z99")), Err(BookingError::NotFound(_))));
}

#[tokio::test]
async fn concurrent_toggles_have_a_single_winner() {
    let harness = Harness::new();
    let inventory = harness.showtime("st-sel-5");
    let winners = AtomicUsize::new(0);
    let conflicts = AtomicUsize::new(0);

    std::thread::scope(|scope| {
        for _ in 0..16 {
            let inventory = inventory.clone();
            let winners = &winners;
            let conflicts = &conflicts;
            scope.spawn(move || {
                let mut selection = SeatSelectionStore::new(SessionToken::generate(), inventory);
                match selection.toggle(&seat("D7")) {
                    Ok(SeatStatus::Selected) => winners.fetch_add(1, Ordering::SeqCst),
                    Err(BookingError::SeatConflict { .. }) => conflicts.fetch_add(1, Ordering::SeqCst),
                    other => panic!("unexpected toggle result {other:?}"),
                };
            });
        }
    });

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(conflicts.load(Ordering::SeqCst), 15);
    assert_eq!(inventory.counts().selected, 1);
}

#[tokio::test]
async fn expired_hold_reads_available_and_can_be_taken() {
    let harness = Harness::new();
    let inventory = harness.showtime("st-sel-6");
    let ttl = inventory.hold_ttl();

    let mut slow = SeatSelectionStore::new(SessionToken::generate(), inventory.clone());
    slow.toggle(&seat("E2")).unwrap();

    harness.clock.advance(ttl + Duration::seconds(1));
    assert_eq!(inventory.seat(&seat("E2")).unwrap().status, SeatStatus::Available);

    let mut fast = SeatSelectionStore::new(SessionToken::generate(), inventory.clone());
    assert_eq!(fast.toggle(&seat("E2")).unwrap(), SeatStatus::Selected);

    // The slow session learns it lost the seat.
    assert_eq!(slow.refresh(), vec![seat("E2")]);
    assert!(slow.is_empty());
    assert_eq!(slow.subtotal(), 0);
    assert!(fast.contains(&seat("E2")));
}

#[tokio::test]
async fn sweeper_releases_lapsed_holds_and_prunes_selections() {
    let harness = Harness::new();
    let inventory = harness.showtime("st-sel-7");
    let token = SessionToken::generate();

    let mut selection = SeatSelectionStore::new(token.clone(), inventory.clone());
    selection.toggle(&seat("F1")).unwrap();
    selection.toggle(&seat("F2")).unwrap();
    harness
        .state
        .selections
        .lock()
        .insert((token.clone(), inventory.showtime().id.clone()), selection);

    let sweeper = CleanupService::new(harness.state.clone());
    assert_eq!(sweeper.run_hold_sweep(), 0);

    harness.clock.advance(inventory.hold_ttl());
    assert_eq!(sweeper.run_hold_sweep(), 2);
    assert_eq!(inventory.counts().selected, 0);

    let selections = harness.state.selections.lock();
    let selection = &selections[&(token, inventory.showtime().id.clone())];
    assert!(selection.is_empty());
}

#[tokio::test]
async fn renewing_restarts_the_hold_timer() {
    let harness = Harness::new();
    let inventory = harness.showtime("st-sel-8");
    let mut selection = SeatSelectionStore::new(SessionToken::generate(), inventory.clone());
    selection.toggle(&seat("H4")).unwrap();

    harness.clock.advance(inventory.hold_ttl() - Duration::seconds(10));
    selection.renew_holds().unwrap();
    harness.clock.advance(Duration::seconds(60));

    assert!(selection.refresh().is_empty());
    assert_eq!(inventory.seat(&seat("H4")).unwrap().status, SeatStatus::Selected);
}

proptest::proptest! {
    #[test]
    fn any_toggle_sequence_keeps_selection_and_inventory_in_step(
        picks in proptest::collection::vec(0usize..12, 0..40)
    ) {
        let harness = Harness::new();
        let inventory = harness.showtime("st-sel-prop");
        let ids: Vec<String> = ["A", "G", "I"]
            .iter()
            .flat_map(|row| (1..=4).map(move |n| format!("{row}{n}")))
            .collect();
        let mut selection = SeatSelectionStore::new(SessionToken::generate(), inventory.clone());

        let mut flips = vec![0usize; ids.len()];
        for &pick in &picks {
            selection.toggle(&seat(&ids[pick])).unwrap();
            flips[pick] += 1;
        }

        let expected: Vec<_> = flips.iter().enumerate().filter(|(_, n)| *n % 2 == 1).map(|(i, _)| i).collect();
        let expected_subtotal: u64 = expected.iter().map(|&i| inventory.price_of(&seat(&ids[i])).unwrap()).sum();

        proptest::prop_assert_eq!(selection.len(), expected.len());
        proptest::prop_assert_eq!(selection.subtotal(), expected_subtotal);
        proptest::prop_assert_eq!(inventory.counts().selected, expected.len());
        for (i, id) in ids.iter().enumerate() {
            let status = inventory.seat(&seat(id)).unwrap().status;
            let want = if expected.contains(&i) { SeatStatus::Selected } else { SeatStatus::Available };
            proptest::prop_assert_eq!(status, want);
        }
    }
}
