pub mod checkout;
pub mod sessions;
pub mod showtimes;

use axum::{extract::State, routing::get, Json, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(sessions::routes())
        .merge(showtimes::routes())
        .merge(checkout::routes())
}

/// Full application router with state attached.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Seat booking API v1.0" }))
        .route("/health", get(health))
        .nest("/api", routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "showtimes": state.inventories.showtimes().len(),
        "checkouts": state.checkouts.lock().len(),
    }))
}
