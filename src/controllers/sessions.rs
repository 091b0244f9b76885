use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::post, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use super::showtimes::{summarize, SelectionSummary};
use crate::errors::BookingError;
use crate::middleware::BasicCredentials;
use crate::models::{AuthUser, SessionContext};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/sessions", post(create_session))
        .route("/sessions/login", post(login))
        .route("/sessions/logout", post(logout))
}

#[derive(Debug, Serialize)]
struct SessionResponse {
    session_token: String,
    user: Option<AuthUser>,
}

// POST /api/sessions
async fn create_session(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, BookingError> {
    let session = state.sessions().create().await?;
    tracing::debug!(session = %session.token, "session created");
    Ok((
        StatusCode::CREATED,
        Json(SessionResponse { session_token: session.token.to_string(), user: None }),
    ))
}

#[derive(Debug, Serialize)]
struct LoginResponse {
    session_token: String,
    user: Option<AuthUser>,
    /// Selection of the checkout that was waiting on this login.
    resumed: Option<SelectionSummary>,
}

// POST /api/sessions/login
async fn login(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
    credentials: BasicCredentials,
) -> Result<impl IntoResponse, BookingError> {
    let (session, suspended) = state
        .auth
        .authenticate(&session.token, &credentials.email, &credentials.password)
        .await?;

    let resumed = suspended.and_then(|suspended| {
        let selections = state.selections.lock();
        selections
            .get(&(session.token.clone(), suspended.showtime_id))
            .map(|selection| summarize(selection, &state.pricing))
    });

    Ok(Json(LoginResponse { session_token: session.token.to_string(), user: session.user, resumed }))
}

// POST /api/sessions/logout
async fn logout(
    State(state): State<Arc<AppState>>,
    session: SessionContext,
) -> Result<impl IntoResponse, BookingError> {
    let session = state.auth.logout(&session.token).await?;
    Ok(Json(SessionResponse { session_token: session.token.to_string(), user: None }))
}
