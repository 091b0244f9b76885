//! Shared seat inventory.
//!
//! One [`ShowtimeInventory`] exists per showtime and is shared by every session
//! looking at it. All status changes go through a compare-and-swap on the
//! seat's current state, so a stale caller gets `SeatConflict` instead of
//! overwriting somebody else's hold or sale.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::clock::Clock;
use crate::errors::BookingError;
use crate::models::{Seat, SeatId, SeatStatus, SessionToken, Showtime, ShowtimeId, Tier};
use crate::services::seat_map::SeatMapGenerator;

/// Internal state of one seat. `Held` past its expiry counts as available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    Available,
    Held { holder: SessionToken, expires_at: DateTime<Utc> },
    /// `booking_id` is `None` for seats sold before the inventory was generated.
    Booked { booking_id: Option<Uuid> },
}

#[derive(Debug, Clone)]
struct SeatSlot {
    id: SeatId,
    tier: Tier,
    price: u64,
    state: SlotState,
}

impl SeatSlot {
    fn status_at(&self, now: DateTime<Utc>) -> SeatStatus {
        match &self.state {
            SlotState::Available => SeatStatus::Available,
            SlotState::Held { expires_at, .. } if *expires_at <= now => SeatStatus::Available,
            SlotState::Held { .. } => SeatStatus::Selected,
            SlotState::Booked { .. } => SeatStatus::Booked,
        }
    }

    fn live_holder(&self, now: DateTime<Utc>) -> Option<&SessionToken> {
        match &self.state {
            SlotState::Held { holder, expires_at } if *expires_at > now => Some(holder),
            _ => None,
        }
    }

    fn view(&self, now: DateTime<Utc>) -> Seat {
        Seat { id: self.id.clone(), tier: self.tier, price: self.price, status: self.status_at(now) }
    }

    /// Ok only when `session` holds this seat and the hold is still running.
    fn check_held_by(&self, session: &SessionToken, now: DateTime<Utc>) -> Result<(), BookingError> {
        match &self.state {
            SlotState::Held { holder, expires_at } if holder == session && *expires_at > now => Ok(()),
            SlotState::Booked { .. } => Err(BookingError::SeatConflict { seat: self.id.clone() }),
            SlotState::Held { holder, expires_at } if holder != session && *expires_at > now => {
                Err(BookingError::SeatConflict { seat: self.id.clone() })
            }
            _ => Err(BookingError::HoldExpired { seat: self.id.clone() }),
        }
    }
}

/// Seat as seen by one particular session.
#[derive(Debug, Clone, Serialize)]
pub struct SeatView {
    #[serde(flatten)]
    pub seat: Seat,
    pub held_by_you: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InventoryCounts {
    pub available: usize,
    pub selected: usize,
    pub booked: usize,
}

pub struct ShowtimeInventory {
    showtime: Showtime,
    index: HashMap<SeatId, usize>,
    slots: RwLock<Vec<SeatSlot>>,
    hold_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl ShowtimeInventory {
    pub fn generate(
        showtime: Showtime,
        generator: &SeatMapGenerator,
        hold_ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let slots: Vec<SeatSlot> = generator
            .generate(&showtime.id)
            .into_iter()
            .map(|seat| SeatSlot {
                id: seat.id,
                tier: seat.tier,
                price: seat.price,
                state: if seat.prebooked { SlotState::Booked { booking_id: None } } else { SlotState::Available },
            })
            .collect();
        let index = slots.iter().enumerate().map(|(i, s)| (s.id.clone(), i)).collect();

        Self { showtime, index, slots: RwLock::new(slots), hold_ttl, clock }
    }

    pub fn showtime(&self) -> &Showtime {
        &self.showtime
    }

    pub fn hold_ttl(&self) -> Duration {
        self.hold_ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    fn position(&self, seat: &SeatId) -> Result<usize, BookingError> {
        self.index
            .get(seat)
            .copied()
            .ok_or_else(|| BookingError::NotFound(format!("seat {seat}")))
    }

    pub fn seats(&self) -> Vec<Seat> {
        let now = self.clock.now();
        self.slots.read().iter().map(|s| s.view(now)).collect()
    }

    pub fn seats_for(&self, session: &SessionToken) -> Vec<SeatView> {
        let now = self.clock.now();
        self.slots
            .read()
            .iter()
            .map(|s| SeatView { seat: s.view(now), held_by_you: s.live_holder(now) == Some(session) })
            .collect()
    }

    pub fn seat(&self, seat: &SeatId) -> Result<Seat, BookingError> {
        let pos = self.position(seat)?;
        Ok(self.slots.read()[pos].view(self.clock.now()))
    }

    pub fn price_of(&self, seat: &SeatId) -> Result<u64, BookingError> {
        let pos = self.position(seat)?;
        Ok(self.slots.read()[pos].price)
    }

    pub fn counts(&self) -> InventoryCounts {
        let now = self.clock.now();
        let mut counts = InventoryCounts::default();
        for slot in self.slots.read().iter() {
            match slot.status_at(now) {
                SeatStatus::Available => counts.available += 1,
                SeatStatus::Selected => counts.selected += 1,
                SeatStatus::Booked => counts.booked += 1,
            }
        }
        counts
    }

    /// Swaps the seat to `next` if its current status is `expected` (and, for
    /// `Selected`, held by `holder`). Returns the previous state.
    pub fn compare_and_swap(
        &self,
        seat: &SeatId,
        expected: SeatStatus,
        holder: Option<&SessionToken>,
        next: SlotState,
    ) -> Result<SlotState, BookingError> {
        let pos = self.position(seat)?;
        let now = self.clock.now();
        let mut slots = self.slots.write();
        let slot = &mut slots[pos];

        let current = slot.status_at(now);
        let holder_matches = expected != SeatStatus::Selected || slot.live_holder(now) == holder;
        if current != expected || !holder_matches {
            debug!(seat = %seat, ?expected, ?current, "seat compare-and-swap rejected");
            return Err(BookingError::SeatConflict { seat: seat.clone() });
        }

        Ok(std::mem::replace(&mut slot.state, next))
    }

    /// Puts a soft hold on an available seat. Returns when the hold runs out.
    pub fn hold(&self, seat: &SeatId, session: &SessionToken) -> Result<DateTime<Utc>, BookingError> {
        let expires_at = self.clock.now() + self.hold_ttl;
        self.compare_and_swap(
            seat,
            SeatStatus::Available,
            None,
            SlotState::Held { holder: session.clone(), expires_at },
        )?;
        debug!(showtime = %self.showtime.id, seat = %seat, session = %session, "seat held");
        Ok(expires_at)
    }

    /// Drops `session`'s hold on the seat, live or expired. Returns false when
    /// the seat was not held by `session`.
    pub fn release(&self, seat: &SeatId, session: &SessionToken) -> Result<bool, BookingError> {
        let pos = self.position(seat)?;
        let mut slots = self.slots.write();
        let slot = &mut slots[pos];
        match &slot.state {
            SlotState::Held { holder, .. } if holder == session => {
                slot.state = SlotState::Available;
                debug!(showtime = %self.showtime.id, seat = %seat, session = %session, "seat released");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn release_all(&self, seats: &[SeatId], session: &SessionToken) -> usize {
        seats
            .iter()
            .filter(|seat| matches!(self.release(seat, session), Ok(true)))
            .count()
    }

    /// Earliest expiry among `session`'s holds on `seats`; fails if any hold is gone.
    pub fn hold_deadline(&self, seats: &[SeatId], session: &SessionToken) -> Result<DateTime<Utc>, BookingError> {
        let now = self.clock.now();
        let slots = self.slots.read();
        let mut deadline: Option<DateTime<Utc>> = None;
        for seat in seats {
            let slot = &slots[self.position(seat)?];
            slot.check_held_by(session, now)?;
            if let SlotState::Held { expires_at, .. } = slot.state {
                deadline = Some(deadline.map_or(expires_at, |d| d.min(expires_at)));
            }
        }
        deadline.ok_or(BookingError::EmptySelection)
    }

    /// Restarts the TTL on every hold in `seats`. All-or-nothing.
    pub fn renew(&self, seats: &[SeatId], session: &SessionToken) -> Result<DateTime<Utc>, BookingError> {
        let now = self.clock.now();
        let expires_at = now + self.hold_ttl;
        let mut slots = self.slots.write();

        let positions = seats.iter().map(|s| self.position(s)).collect::<Result<Vec<_>, _>>()?;
        for &pos in &positions {
            slots[pos].check_held_by(session, now)?;
        }
        for &pos in &positions {
            slots[pos].state = SlotState::Held { holder: session.clone(), expires_at };
        }
        Ok(expires_at)
    }

    /// Turns every hold in `seats` into a sale. Nothing changes unless all of
    /// them are still held by `session`.
    pub fn commit(&self, seats: &[SeatId], session: &SessionToken, booking_id: Uuid) -> Result<(), BookingError> {
        if seats.is_empty() {
            return Err(BookingError::EmptySelection);
        }
        let now = self.clock.now();
        let mut slots = self.slots.write();

        let positions = seats.iter().map(|s| self.position(s)).collect::<Result<Vec<_>, _>>()?;
        for &pos in &positions {
            slots[pos].check_held_by(session, now)?;
        }
        for &pos in &positions {
            slots[pos].state = SlotState::Booked { booking_id: Some(booking_id) };
        }
        info!(showtime = %self.showtime.id, booking_id = %booking_id, seats = seats.len(), "seats booked");
        Ok(())
    }

    /// Returns every expired hold to available.
    pub fn sweep_expired(&self) -> Vec<SeatId> {
        let now = self.clock.now();
        let mut released = Vec::new();
        for slot in self.slots.write().iter_mut() {
            if let SlotState::Held { expires_at, .. } = &slot.state {
                if *expires_at <= now {
                    slot.state = SlotState::Available;
                    released.push(slot.id.clone());
                }
            }
        }
        released
    }
}

/// All inventories known to this process, one per showtime, generated on
/// first use and kept afterwards.
pub struct InventoryRegistry {
    generator: SeatMapGenerator,
    hold_ttl: Duration,
    clock: Arc<dyn Clock>,
    inventories: RwLock<HashMap<ShowtimeId, Arc<ShowtimeInventory>>>,
}

impl InventoryRegistry {
    pub fn new(generator: SeatMapGenerator, hold_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { generator, hold_ttl, clock, inventories: RwLock::new(HashMap::new()) }
    }

    /// Returns the inventory for `showtime`, generating it the first time.
    pub fn open(&self, showtime: Showtime) -> Arc<ShowtimeInventory> {
        if let Some(existing) = self.inventories.read().get(&showtime.id) {
            return existing.clone();
        }

        let mut inventories = self.inventories.write();
        inventories
            .entry(showtime.id.clone())
            .or_insert_with(|| {
                info!(showtime = %showtime.id, "generating seat inventory");
                Arc::new(ShowtimeInventory::generate(showtime, &self.generator, self.hold_ttl, self.clock.clone()))
            })
            .clone()
    }

    pub fn get(&self, showtime: &ShowtimeId) -> Result<Arc<ShowtimeInventory>, BookingError> {
        self.inventories
            .read()
            .get(showtime)
            .cloned()
            .ok_or_else(|| BookingError::NotFound(format!("showtime {showtime}")))
    }

    pub fn showtimes(&self) -> Vec<ShowtimeId> {
        self.inventories.read().keys().cloned().collect()
    }

    /// Sweeps every inventory; returns the number of holds released.
    pub fn sweep_expired(&self) -> usize {
        let inventories: Vec<_> = self.inventories.read().values().cloned().collect();
        inventories
            .iter()
            .map(|inventory| {
                let released = inventory.sweep_expired();
                if !released.is_empty() {
                    debug!(showtime = %inventory.showtime().id, count = released.len(), "expired holds released");
                }
                released.len()
            })
            .sum()
    }
}
