use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use crate::errors::BookingError;
use crate::models::{Seat, SeatId, SeatStatus, SessionToken, ShowtimeId};
use crate::services::inventory::ShowtimeInventory;

/// One session's selection on one showtime.
///
/// Keeps the selected ids and their price sum up to date on every toggle, so
/// `len` and `subtotal` never rescan the inventory.
pub struct SeatSelectionStore {
    session: SessionToken,
    inventory: Arc<ShowtimeInventory>,
    selected: HashSet<SeatId>,
    subtotal: u64,
}

impl SeatSelectionStore {
    pub fn new(session: SessionToken, inventory: Arc<ShowtimeInventory>) -> Self {
        Self { session, inventory, selected: HashSet::new(), subtotal: 0 }
    }

    /// Flips a seat between available and selected for this session and
    /// returns its new status. Booked seats and seats held by another session
    /// fail with `SeatConflict` and leave everything untouched.
    pub fn toggle(&mut self, seat: &SeatId) -> Result<SeatStatus, BookingError> {
        let price = self.inventory.price_of(seat)?;

        if self.selected.contains(seat) {
            self.inventory.release(seat, &self.session)?;
            self.selected.remove(seat);
            self.subtotal -= price;
            debug!(session = %self.session, seat = %seat, "seat deselected");
            return Ok(self.inventory.seat(seat)?.status);
        }

        self.inventory.hold(seat, &self.session)?;
        self.selected.insert(seat.clone());
        self.subtotal += price;
        debug!(session = %self.session, seat = %seat, subtotal = self.subtotal, "seat selected");
        Ok(SeatStatus::Selected)
    }

    pub fn contains(&self, seat: &SeatId) -> bool {
        self.selected.contains(seat)
    }

    pub fn len(&self) -> usize {
        self.selected.len()
    }

    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    pub fn subtotal(&self) -> u64 {
        self.subtotal
    }

    /// Selected ids in seat order.
    pub fn seat_ids(&self) -> Vec<SeatId> {
        let mut ids: Vec<_> = self.selected.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Current view of the selected seats, in seat order.
    pub fn seats(&self) -> Vec<Seat> {
        self.seat_ids().iter().filter_map(|id| self.inventory.seat(id).ok()).collect()
    }

    pub fn session(&self) -> &SessionToken {
        &self.session
    }

    pub fn showtime_id(&self) -> &ShowtimeId {
        &self.inventory.showtime().id
    }

    pub fn inventory(&self) -> &Arc<ShowtimeInventory> {
        &self.inventory
    }

    /// Forgets seats whose hold was lost (expired or swept) and returns them.
    pub fn refresh(&mut self) -> Vec<SeatId> {
        let lost: Vec<SeatId> = self
            .seat_ids()
            .into_iter()
            .filter(|seat| self.inventory.hold_deadline(std::slice::from_ref(seat), &self.session).is_err())
            .collect();

        for seat in &lost {
            self.selected.remove(seat);
            if let Ok(price) = self.inventory.price_of(seat) {
                self.subtotal -= price;
            }
            // An expired hold may still carry our token until the sweeper runs.
            let _ = self.inventory.release(seat, &self.session);
        }
        if !lost.is_empty() {
            debug!(session = %self.session, lost = lost.len(), "dropped lapsed holds from selection");
        }
        lost
    }

    /// Restarts the hold timer on every selected seat.
    pub fn renew_holds(&self) -> Result<(), BookingError> {
        if self.selected.is_empty() {
            return Err(BookingError::EmptySelection);
        }
        self.inventory.renew(&self.seat_ids(), &self.session).map(|_| ())
    }

    /// Releases every hold and empties the selection.
    pub fn release_all(&mut self) -> usize {
        let released = self.inventory.release_all(&self.seat_ids(), &self.session);
        self.selected.clear();
        self.subtotal = 0;
        released
    }
}

impl std::fmt::Debug for SeatSelectionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SeatSelectionStore")
            .field("session", &self.session)
            .field("showtime", self.showtime_id())
            .field("selected", &self.seat_ids())
            .field("subtotal", &self.subtotal)
            .finish()
    }
}
