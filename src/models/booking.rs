use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;
use validator::Validate;

use super::seat::SeatId;
use super::session::SessionToken;
use super::showtime::ShowtimeId;
use crate::errors::BookingError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Draft,
    AwaitingPayment,
    Confirmed,
    Failed,
}

impl BookingStatus {
    pub fn is_final(self) -> bool {
        matches!(self, BookingStatus::Confirmed | BookingStatus::Failed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BookingStatus::Draft => "draft",
            BookingStatus::AwaitingPayment => "awaiting_payment",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Price of a selection. `total` is always `base + fee`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub base: u64,
    pub fee: u64,
    pub total: u64,
}

/// Contact form fields that can fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactField {
    Email,
    Phone,
    Terms,
}

impl fmt::Display for ContactField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContactField::Email => f.write_str("email"),
            ContactField::Phone => f.write_str("phone"),
            ContactField::Terms => f.write_str("terms"),
        }
    }
}

/// Raw contact data as submitted by the user.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct ContactForm {
    #[validate(length(min = 1), email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub phone: String,
    #[serde(default)]
    pub accept_terms: bool,
}

impl ContactForm {
    /// Trims the form and checks every field, reporting all offending fields at once.
    pub fn into_contact(self) -> Result<ContactInfo, BookingError> {
        let form = ContactForm {
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            accept_terms: self.accept_terms,
        };

        let mut fields = Vec::new();
        if let Err(errors) = form.validate() {
            for key in errors.field_errors().keys() {
                match &**key {
                    "email" => fields.push(ContactField::Email),
                    "phone" => fields.push(ContactField::Phone),
                    _ => {}
                }
            }
        }
        if !form.accept_terms {
            fields.push(ContactField::Terms);
        }

        if !fields.is_empty() {
            fields.sort();
            fields.dedup();
            return Err(BookingError::Validation { fields });
        }

        Ok(ContactInfo { email: form.email, phone: form.phone, terms_accepted: true })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactInfo {
    pub email: String,
    pub phone: String,
    pub terms_accepted: bool,
}

/// Record of one checkout attempt. Frozen once confirmed or failed.
#[derive(Debug, Clone, Serialize)]
pub struct Booking {
    id: Uuid,
    showtime_id: ShowtimeId,
    session: SessionToken,
    seats: Vec<SeatId>,
    contact: Option<ContactInfo>,
    status: BookingStatus,
    failure: Option<String>,
    price: Option<PriceBreakdown>,
    ticket_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Booking {
    pub(crate) fn draft(
        showtime_id: ShowtimeId,
        session: SessionToken,
        mut seats: Vec<SeatId>,
        now: DateTime<Utc>,
    ) -> Self {
        seats.sort();
        Self {
            id: Uuid::new_v4(),
            showtime_id,
            session,
            seats,
            contact: None,
            status: BookingStatus::Draft,
            failure: None,
            price: None,
            ticket_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// New attempt for the same seats and contact data, straight to `awaiting_payment`.
    pub(crate) fn next_attempt(&self, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            showtime_id: self.showtime_id.clone(),
            session: self.session.clone(),
            seats: self.seats.clone(),
            contact: self.contact.clone(),
            status: BookingStatus::AwaitingPayment,
            failure: None,
            price: None,
            ticket_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn attach_contact(&mut self, contact: ContactInfo, now: DateTime<Utc>) -> Result<(), BookingError> {
        self.expect_status(BookingStatus::Draft)?;
        self.contact = Some(contact);
        self.status = BookingStatus::AwaitingPayment;
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn confirm(&mut self, price: PriceBreakdown, ticket_id: Uuid, now: DateTime<Utc>) -> Result<(), BookingError> {
        self.expect_status(BookingStatus::AwaitingPayment)?;
        self.price = Some(price);
        self.ticket_id = Some(ticket_id);
        self.status = BookingStatus::Confirmed;
        self.updated_at = now;
        Ok(())
    }

    pub(crate) fn fail(&mut self, reason: impl Into<String>, now: DateTime<Utc>) -> Result<(), BookingError> {
        if self.status.is_final() {
            return Err(BookingError::InvalidState {
                expected: "draft or awaiting_payment".to_string(),
                actual: self.status.to_string(),
            });
        }
        self.failure = Some(reason.into());
        self.status = BookingStatus::Failed;
        self.updated_at = now;
        Ok(())
    }

    fn expect_status(&self, expected: BookingStatus) -> Result<(), BookingError> {
        if self.status != expected {
            return Err(BookingError::InvalidState {
                expected: expected.to_string(),
                actual: self.status.to_string(),
            });
        }
        Ok(())
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn showtime_id(&self) -> &ShowtimeId {
        &self.showtime_id
    }

    pub fn session(&self) -> &SessionToken {
        &self.session
    }

    pub fn seats(&self) -> &[SeatId] {
        &self.seats
    }

    pub fn contact(&self) -> Option<&ContactInfo> {
        self.contact.as_ref()
    }

    pub fn status(&self) -> BookingStatus {
        self.status
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    /// Price snapshot, present only once confirmed.
    pub fn price(&self) -> Option<PriceBreakdown> {
        self.price
    }

    pub fn ticket_id(&self) -> Option<Uuid> {
        self.ticket_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
