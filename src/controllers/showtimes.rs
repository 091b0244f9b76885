use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::BookingError;
use crate::models::{PriceBreakdown, SeatId, SeatStatus, SessionContext, Showtime, ShowtimeId};
use crate::services::inventory::{InventoryCounts, SeatView};
use crate::services::pricing::PricingCalculator;
use crate::services::selection::SeatSelectionStore;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/showtimes/{showtime_id}", put(register_showtime))
        .route("/showtimes/{showtime_id}/seats", get(get_seats))
        .route("/showtimes/{showtime_id}/seats/{seat_id}/toggle", post(toggle_seat))
        .route("/showtimes/{showtime_id}/selection", get(get_selection))
}

/* ---------- helpers ---------- */

#[derive(Debug, Clone, Serialize)]
pub struct SelectionSummary {
    pub showtime_id: ShowtimeId,
    pub seats: Vec<SeatId>,
    pub price: PriceBreakdown,
}

pub fn summarize(selection: &SeatSelectionStore, pricing: &PricingCalculator) -> SelectionSummary {
    SelectionSummary {
        showtime_id: selection.showtime_id().clone(),
        seats: selection.seat_ids(),
        price: pricing.quote(selection),
    }
}

fn empty_summary(showtime_id: ShowtimeId) -> SelectionSummary {
    SelectionSummary { showtime_id, seats: Vec::new(), price: PriceBreakdown::default() }
}

/* ---------- SHOWTIMES ---------- */

// PUT /api/showtimes/{id} - catalog hands over the showtime; seats are generated once
#[derive(Debug, Deserialize)]
struct RegisterShowtimeRequest {
    movie_id: String,
    theater_id: String,
    starts_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct ShowtimeResponse {
    showtime: Showtime,
    counts: InventoryCounts,
}

async fn register_showtime(
    State(state): State<Arc<AppState>>,
    Path(showtime_id): Path<String>,
    Json(req): Json<RegisterShowtimeRequest>,
) -> Result<impl IntoResponse, BookingError> {
    let showtime = Showtime {
        id: ShowtimeId::new(showtime_id),
        movie_id: req.movie_id,
        theater_id: req.theater_id,
        starts_at: req.starts_at,
    };
    let inventory = state.inventories.open(showtime);
    Ok((
        StatusCode::OK,
        Json(ShowtimeResponse { showtime: inventory.showtime().clone(), counts: inventory.counts() }),
    ))
}

/* ---------- SEATS ---------- */

#[derive(Debug, Serialize)]
struct SeatsResponse {
    showtime: Showtime,
    counts: InventoryCounts,
    seats: Vec<SeatView>,
}

// GET /api/showtimes/{id}/seats
async fn get_seats(
    State(state): State<Arc<AppState>>,
    Path(showtime_id): Path<String>,
    session: SessionContext,
) -> Result<impl IntoResponse, BookingError> {
    let inventory = state.inventories.get(&ShowtimeId::new(showtime_id))?;
    Ok(Json(SeatsResponse {
        showtime: inventory.showtime().clone(),
        counts: inventory.counts(),
        seats: inventory.seats_for(&session.token),
    }))
}

#[derive(Debug, Serialize)]
struct ToggleResponse {
    seat_id: SeatId,
    status: SeatStatus,
    selection: SelectionSummary,
    /// Seats dropped from the selection because their hold lapsed.
    lapsed: Vec<SeatId>,
}

// POST /api/showtimes/{id}/seats/{seat}/toggle
async fn toggle_seat(
    State(state): State<Arc<AppState>>,
    Path((showtime_id, seat_id)): Path<(String, String)>,
    session: SessionContext,
) -> Result<impl IntoResponse, BookingError> {
    let showtime_id = ShowtimeId::new(showtime_id);
    let inventory = state.inventories.get(&showtime_id)?;
    let seat_id: SeatId = seat_id.parse()?;

    let mut selections = state.selections.lock();
    let selection = selections
        .entry((session.token.clone(), showtime_id))
        .or_insert_with(|| SeatSelectionStore::new(session.token.clone(), inventory));

    let lapsed = selection.refresh();
    let status = selection.toggle(&seat_id)?;

    Ok(Json(ToggleResponse { seat_id, status, selection: summarize(selection, &state.pricing), lapsed }))
}

// GET /api/showtimes/{id}/selection
async fn get_selection(
    State(state): State<Arc<AppState>>,
    Path(showtime_id): Path<String>,
    session: SessionContext,
) -> Result<impl IntoResponse, BookingError> {
    let showtime_id = ShowtimeId::new(showtime_id);
    state.inventories.get(&showtime_id)?;

    let mut selections = state.selections.lock();
    let summary = match selections.get_mut(&(session.token.clone(), showtime_id.clone())) {
        Some(selection) => {
            selection.refresh();
            summarize(selection, &state.pricing)
        }
        None => empty_summary(showtime_id),
    };
    Ok(Json(summary))
}
