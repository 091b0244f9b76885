use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::showtimes::{summarize, SelectionSummary};
use crate::errors::BookingError;
use crate::models::{Booking, ConfirmationPayload, ContactForm, PriceBreakdown, SessionContext, ShowtimeId};
use crate::services::checkout::{CheckoutState, CheckoutWorkflow, FailureKind};
use crate::services::ticketing::TicketClaims;
use crate::{AppState, CheckoutHandle};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/showtimes/{showtime_id}/checkout", post(begin_checkout))
        .route("/checkout/{checkout_id}", get(get_checkout))
        .route("/checkout/{checkout_id}/contact", post(submit_contact))
        .route("/checkout/{checkout_id}/pay", post(pay))
        .route("/checkout/{checkout_id}/retry", post(retry))
        .route("/checkout/{checkout_id}/cancel", post(cancel))
        .route("/tickets/verify", post(verify_ticket))
}

/* ---------- helpers ---------- */

#[derive(Debug, Serialize)]
struct CheckoutView {
    checkout_id: Uuid,
    state: CheckoutState,
    failure: Option<FailureKind>,
    booking: Booking,
    attempts: usize,
    price: PriceBreakdown,
    selection: SelectionSummary,
    confirmation: Option<ConfirmationPayload>,
}

fn view(checkout_id: Uuid, workflow: &CheckoutWorkflow, state: &AppState) -> CheckoutView {
    CheckoutView {
        checkout_id,
        state: workflow.state(),
        failure: workflow.failure(),
        booking: workflow.booking().clone(),
        attempts: workflow.attempts().len() + 1,
        price: workflow.price(),
        selection: summarize(workflow.selection(), &state.pricing),
        confirmation: workflow.ticket().map(|t| t.payload()),
    }
}

// Checkouts of other sessions are reported as missing.
fn find_checkout(state: &AppState, checkout_id: Uuid, session: &SessionContext) -> Result<Arc<CheckoutHandle>, BookingError> {
    state
        .checkouts
        .lock()
        .get(&checkout_id)
        .filter(|handle| handle.owner == session.token)
        .cloned()
        .ok_or_else(|| BookingError::NotFound(format!("checkout {checkout_id}")))
}

/* ---------- CHECKOUT ---------- */

// POST /api/showtimes/{id}/checkout
async fn begin_checkout(
    State(state): State<Arc<AppState>>,
    Path(showtime_id): Path<String>,
    session: SessionContext,
) -> Result<impl IntoResponse, BookingError> {
    let showtime_id = ShowtimeId::new(showtime_id);
    state.inventories.get(&showtime_id)?;
    let key = (session.token.clone(), showtime_id);

    let workflow = {
        let mut selections = state.selections.lock();
        let mut selection = selections.remove(&key).ok_or(BookingError::EmptySelection)?;
        selection.refresh();

        match CheckoutWorkflow::begin(&session, &state.auth, selection, state.pricing) {
            Ok(workflow) => workflow.with_currency(state.config.pricing.currency.clone()),
            Err(rejected) => {
                // The selection stays with the session, e.g. to resume after login.
                selections.insert(key, rejected.selection);
                return Err(rejected.error);
            }
        }
    };

    let checkout_id = workflow.booking().id();
    let body = view(checkout_id, &workflow, &state);
    let handle = Arc::new(CheckoutHandle::new(session.token.clone(), workflow));
    state.checkouts.lock().insert(checkout_id, handle);

    Ok((StatusCode::CREATED, Json(body)))
}

// GET /api/checkout/{id}
async fn get_checkout(
    State(state): State<Arc<AppState>>,
    Path(checkout_id): Path<Uuid>,
    session: SessionContext,
) -> Result<impl IntoResponse, BookingError> {
    let handle = find_checkout(&state, checkout_id, &session)?;
    let workflow = handle.workflow.lock().await;
    Ok(Json(view(checkout_id, &workflow, &state)))
}

// POST /api/checkout/{id}/contact
async fn submit_contact(
    State(state): State<Arc<AppState>>,
    Path(checkout_id): Path<Uuid>,
    session: SessionContext,
    Json(form): Json<ContactForm>,
) -> Result<impl IntoResponse, BookingError> {
    let handle = find_checkout(&state, checkout_id, &session)?;
    let mut workflow = handle.workflow.lock().await;
    workflow.submit_contact(form)?;
    Ok(Json(view(checkout_id, &workflow, &state)))
}

// POST /api/checkout/{id}/pay
async fn pay(
    State(state): State<Arc<AppState>>,
    Path(checkout_id): Path<Uuid>,
    session: SessionContext,
) -> Result<impl IntoResponse, BookingError> {
    let handle = find_checkout(&state, checkout_id, &session)?;
    let mut signal = handle.signal();
    let mut workflow = handle.workflow.lock().await;
    let confirmation = workflow
        .process_payment(state.payments.as_ref(), &state.issuer, &mut signal)
        .await?;
    Ok(Json(confirmation))
}

// POST /api/checkout/{id}/retry
async fn retry(
    State(state): State<Arc<AppState>>,
    Path(checkout_id): Path<Uuid>,
    session: SessionContext,
) -> Result<impl IntoResponse, BookingError> {
    let handle = find_checkout(&state, checkout_id, &session)?;
    let mut workflow = handle.workflow.lock().await;
    workflow.retry()?;
    Ok(Json(view(checkout_id, &workflow, &state)))
}

// POST /api/checkout/{id}/cancel
async fn cancel(
    State(state): State<Arc<AppState>>,
    Path(checkout_id): Path<Uuid>,
    session: SessionContext,
) -> Result<impl IntoResponse, BookingError> {
    let handle = find_checkout(&state, checkout_id, &session)?;

    // A payment in flight holds the workflow lock; the signal stops it there.
    let Ok(mut workflow) = handle.workflow.try_lock() else {
        handle.cancel();
        return Ok((StatusCode::ACCEPTED, Json(serde_json::json!({ "checkout_id": checkout_id, "cancelling": true }))));
    };
    workflow.cancel()?;
    handle.cancel();
    Ok((StatusCode::OK, Json(serde_json::json!(view(checkout_id, &workflow, &state)))))
}

/* ---------- TICKETS ---------- */

#[derive(Debug, Deserialize)]
struct VerifyTicketRequest {
    token: String,
}

// POST /api/tickets/verify
async fn verify_ticket(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyTicketRequest>,
) -> Result<Json<TicketClaims>, BookingError> {
    state.issuer.verify(&req.token).map(Json)
}
