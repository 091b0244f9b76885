//! Checkout state machine.
//!
//! ```text
//! collecting_contact ──submit_contact──▶ processing_payment ──▶ confirmed
//!                                              │      ▲
//!                                              ▼      │ retry (payment failures only)
//!                                            failed ──┘
//! ```
//!
//! One workflow drives one booking attempt at a time and owns the selection
//! for as long as it lives. The payment call is the only await point; it
//! races against cancellation and against the earliest hold expiry.

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::errors::BookingError;
use crate::models::{AuthUser, Booking, BookingStatus, ConfirmationPayload, ContactForm, PriceBreakdown, SessionContext, Ticket};
use crate::services::auth::AuthGate;
use crate::services::payment::{PaymentAuthorization, PaymentGateway, PaymentGatewayError, PaymentRequest};
use crate::services::pricing::PricingCalculator;
use crate::services::selection::SeatSelectionStore;
use crate::services::ticketing::TicketIssuer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutState {
    CollectingContact,
    ProcessingPayment,
    Confirmed,
    Failed,
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CheckoutState::CollectingContact => "collecting_contact",
            CheckoutState::ProcessingPayment => "processing_payment",
            CheckoutState::Confirmed => "confirmed",
            CheckoutState::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Why the current attempt failed. Only payment failures can be retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Payment,
    SeatConflict,
    HoldExpired,
    Cancelled,
}

impl FailureKind {
    fn of(error: &BookingError) -> Self {
        match error {
            BookingError::SeatConflict { .. } | BookingError::SeatLost { .. } => FailureKind::SeatConflict,
            BookingError::HoldExpired { .. } => FailureKind::HoldExpired,
            BookingError::PaymentFailure { .. } => FailureKind::Payment,
            _ => FailureKind::Cancelled,
        }
    }
}

/// Sending half of a checkout's cancellation signal.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    async fn cancelled(&mut self) {
        while !*self.rx.borrow_and_update() {
            if self.rx.changed().await.is_err() {
                // Handle dropped without cancelling: never fires.
                std::future::pending::<()>().await;
            }
        }
    }
}

pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// `begin` refused to start. The selection is handed back untouched.
#[derive(Debug)]
pub struct CheckoutRejected {
    pub error: BookingError,
    pub selection: SeatSelectionStore,
}

enum PaymentStep {
    Authorized(PaymentAuthorization),
    Declined(PaymentGatewayError),
    Cancelled,
    Expired,
}

#[derive(Debug)]
pub struct CheckoutWorkflow {
    state: CheckoutState,
    user: AuthUser,
    selection: SeatSelectionStore,
    booking: Booking,
    attempts: Vec<Booking>,
    ticket: Option<Ticket>,
    failure: Option<FailureKind>,
    pricing: PricingCalculator,
    currency: String,
}

impl CheckoutWorkflow {
    /// Moves from selection into checkout. Needs a non-empty selection and a
    /// session the auth gate lets through; holds are renewed on entry.
    pub fn begin(
        session: &SessionContext,
        gate: &AuthGate,
        selection: SeatSelectionStore,
        pricing: PricingCalculator,
    ) -> Result<Self, CheckoutRejected> {
        if selection.session() != &session.token {
            let error = BookingError::InvalidState {
                expected: format!("selection of session {}", session.token),
                actual: format!("selection of session {}", selection.session()),
            };
            return Err(CheckoutRejected { error, selection });
        }
        if selection.is_empty() {
            return Err(CheckoutRejected { error: BookingError::EmptySelection, selection });
        }
        let authorized = match gate.require_auth(session, &selection) {
            Ok(authorized) => authorized,
            Err(error) => return Err(CheckoutRejected { error, selection }),
        };
        if let Err(error) = selection.renew_holds() {
            return Err(CheckoutRejected { error, selection });
        }

        let now = selection.inventory().now();
        let booking = Booking::draft(selection.showtime_id().clone(), session.token.clone(), selection.seat_ids(), now);
        info!(
            booking_id = %booking.id(),
            session = %session.token,
            seats = selection.len(),
            "checkout started"
        );

        Ok(Self {
            state: CheckoutState::CollectingContact,
            user: authorized.user().clone(),
            selection,
            booking,
            attempts: Vec::new(),
            ticket: None,
            failure: None,
            pricing,
            currency: "USD".to_string(),
        })
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }

    fn expect_state(&self, expected: CheckoutState) -> Result<(), BookingError> {
        if self.state != expected {
            return Err(BookingError::InvalidState { expected: expected.to_string(), actual: self.state.to_string() });
        }
        Ok(())
    }

    /// Validates the contact form. On failure nothing changes and every
    /// offending field is reported.
    pub fn submit_contact(&mut self, form: ContactForm) -> Result<(), BookingError> {
        self.expect_state(CheckoutState::CollectingContact)?;
        let contact = form.into_contact()?;
        let now = self.selection.inventory().now();
        self.booking.attach_contact(contact, now)?;
        self.state = CheckoutState::ProcessingPayment;
        info!(booking_id = %self.booking.id(), "contact details accepted");
        Ok(())
    }

    /// Runs the payment step and, on success, issues the ticket.
    pub async fn process_payment(
        &mut self,
        gateway: &dyn PaymentGateway,
        issuer: &TicketIssuer,
        cancel: &mut CancelSignal,
    ) -> Result<ConfirmationPayload, BookingError> {
        self.expect_state(CheckoutState::ProcessingPayment)?;
        if cancel.is_cancelled() {
            return Err(self.abort(BookingError::Cancelled));
        }

        let inventory = self.selection.inventory().clone();
        let seats = self.booking.seats().to_vec();
        let deadline = match inventory.hold_deadline(&seats, self.booking.session()) {
            Ok(deadline) => deadline,
            Err(e) => return Err(self.abort(e)),
        };
        let remaining = (deadline - inventory.now()).to_std().unwrap_or(Duration::ZERO);

        let request = PaymentRequest {
            booking_id: self.booking.id(),
            amount: self.price().total,
            currency: self.currency.clone(),
            description: format!("{} seat(s) for showtime {}", seats.len(), self.booking.showtime_id()),
            email: self.booking.contact().map(|c| c.email.clone()).unwrap_or_default(),
        };
        info!(booking_id = %request.booking_id, amount = request.amount, "processing payment");

        let step = tokio::select! {
            biased;
            _ = cancel.cancelled() => PaymentStep::Cancelled,
            _ = tokio::time::sleep(remaining) => PaymentStep::Expired,
            result = gateway.authorize(&request) => match result {
                Ok(authorization) => PaymentStep::Authorized(authorization),
                Err(e) => PaymentStep::Declined(e),
            },
        };

        match step {
            PaymentStep::Cancelled => Err(self.abort(BookingError::Cancelled)),
            PaymentStep::Expired => {
                let seat = inventory
                    .hold_deadline(&seats, self.booking.session())
                    .err()
                    .and_then(|e| match e {
                        BookingError::HoldExpired { seat } | BookingError::SeatConflict { seat } => Some(seat),
                        _ => None,
                    })
                    .unwrap_or_else(|| seats[0].clone());
                Err(self.abort(BookingError::HoldExpired { seat }))
            }
            PaymentStep::Declined(e) => {
                let reason = e.to_string();
                let now = inventory.now();
                self.booking.fail(reason.clone(), now)?;
                self.state = CheckoutState::Failed;
                self.failure = Some(FailureKind::Payment);
                warn!(booking_id = %self.booking.id(), reason = %reason, "payment failed, selection kept for retry");
                Err(BookingError::PaymentFailure { reason })
            }
            PaymentStep::Authorized(authorization) => {
                match issuer.issue(&mut self.booking, &self.selection, &self.pricing) {
                    Ok(ticket) => {
                        if let Err(e) = gateway.capture(&authorization).await {
                            error!(booking_id = %self.booking.id(), "capture failed after seats were booked: {}", e);
                        }
                        let payload = ticket.payload();
                        self.ticket = Some(ticket);
                        self.state = CheckoutState::Confirmed;
                        self.failure = None;
                        Ok(payload)
                    }
                    Err(e) => {
                        if let Err(void_err) = gateway.void(&authorization).await {
                            error!(booking_id = %self.booking.id(), "failed to void authorization: {}", void_err);
                        }
                        Err(self.abort(e))
                    }
                }
            }
        }
    }

    /// Starts a fresh attempt after a payment failure, reusing the contact
    /// details and the held seats.
    pub fn retry(&mut self) -> Result<(), BookingError> {
        self.expect_state(CheckoutState::Failed)?;
        if self.failure != Some(FailureKind::Payment) {
            return Err(BookingError::InvalidState {
                expected: "failed payment".to_string(),
                actual: format!("{:?}", self.failure),
            });
        }
        if let Err(e) = self.selection.renew_holds() {
            return Err(self.abort(e));
        }

        let now = self.selection.inventory().now();
        let next = self.booking.next_attempt(now);
        let previous = std::mem::replace(&mut self.booking, next);
        info!(previous = %previous.id(), booking_id = %self.booking.id(), "retrying payment");
        self.attempts.push(previous);
        self.state = CheckoutState::ProcessingPayment;
        self.failure = None;
        Ok(())
    }

    /// Abandons the checkout and releases the holds. Confirmed bookings stay.
    pub fn cancel(&mut self) -> Result<(), BookingError> {
        if self.state == CheckoutState::Confirmed {
            return Err(BookingError::InvalidState {
                expected: "unconfirmed checkout".to_string(),
                actual: self.state.to_string(),
            });
        }
        self.abort(BookingError::Cancelled);
        Ok(())
    }

    /// Ends the attempt for good: releases holds and fails the booking.
    /// A seat conflict reported from here is final, not retryable.
    fn abort(&mut self, error: BookingError) -> BookingError {
        let error = match error {
            BookingError::SeatConflict { seat } => BookingError::SeatLost { seat },
            other => other,
        };
        let released = self.selection.release_all();
        let now = self.selection.inventory().now();
        if !self.booking.status().is_final() {
            // Cannot fail: the booking is not final.
            let _ = self.booking.fail(error.to_string(), now);
        }
        self.state = CheckoutState::Failed;
        self.failure = Some(FailureKind::of(&error));
        warn!(booking_id = %self.booking.id(), released, "checkout aborted: {}", error);
        error
    }

    pub fn state(&self) -> CheckoutState {
        self.state
    }

    pub fn booking(&self) -> &Booking {
        &self.booking
    }

    /// Earlier attempts of this checkout, oldest first.
    pub fn attempts(&self) -> &[Booking] {
        &self.attempts
    }

    pub fn ticket(&self) -> Option<&Ticket> {
        self.ticket.as_ref()
    }

    pub fn failure(&self) -> Option<FailureKind> {
        self.failure
    }

    pub fn user(&self) -> &AuthUser {
        &self.user
    }

    pub fn selection(&self) -> &SeatSelectionStore {
        &self.selection
    }

    /// Confirmed bookings report their snapshot; otherwise the live price.
    pub fn price(&self) -> PriceBreakdown {
        match (self.booking.status(), self.booking.price()) {
            (BookingStatus::Confirmed, Some(snapshot)) => snapshot,
            _ => self.pricing.quote(&self.selection),
        }
    }
}
