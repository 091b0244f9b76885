use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::booking::PriceBreakdown;
use super::seat::SeatId;
use super::showtime::ShowtimeId;

/// Artifact issued for a confirmed booking. No mutators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ticket {
    ticket_id: Uuid,
    booking_id: Uuid,
    showtime_id: ShowtimeId,
    starts_at: DateTime<Utc>,
    seats: Vec<SeatId>,
    price: PriceBreakdown,
    confirmation_code: String,
    confirmation_token: String,
    issued_at: DateTime<Utc>,
}

impl Ticket {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        ticket_id: Uuid,
        booking_id: Uuid,
        showtime_id: ShowtimeId,
        starts_at: DateTime<Utc>,
        seats: Vec<SeatId>,
        price: PriceBreakdown,
        confirmation_code: String,
        confirmation_token: String,
        issued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            ticket_id,
            booking_id,
            showtime_id,
            starts_at,
            seats,
            price,
            confirmation_code,
            confirmation_token,
            issued_at,
        }
    }

    pub fn ticket_id(&self) -> Uuid {
        self.ticket_id
    }

    pub fn booking_id(&self) -> Uuid {
        self.booking_id
    }

    pub fn showtime_id(&self) -> &ShowtimeId {
        &self.showtime_id
    }

    pub fn starts_at(&self) -> DateTime<Utc> {
        self.starts_at
    }

    pub fn seats(&self) -> &[SeatId] {
        &self.seats
    }

    pub fn price(&self) -> PriceBreakdown {
        self.price
    }

    pub fn confirmation_code(&self) -> &str {
        &self.confirmation_code
    }

    pub fn confirmation_token(&self) -> &str {
        &self.confirmation_token
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn payload(&self) -> ConfirmationPayload {
        ConfirmationPayload {
            ticket_id: self.ticket_id,
            booking_id: self.booking_id,
            showtime_id: self.showtime_id.clone(),
            starts_at: self.starts_at,
            seats: self.seats.clone(),
            total: self.price.total,
            price: self.price,
            confirmation_code: self.confirmation_code.clone(),
            confirmation_token: self.confirmation_token.clone(),
        }
    }
}

/// What the presentation layer renders or exports after a successful checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmationPayload {
    pub ticket_id: Uuid,
    pub booking_id: Uuid,
    pub showtime_id: ShowtimeId,
    pub starts_at: DateTime<Utc>,
    pub seats: Vec<SeatId>,
    pub total: u64,
    pub price: PriceBreakdown,
    pub confirmation_code: String,
    pub confirmation_token: String,
}
