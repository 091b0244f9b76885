use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::json;

use crate::models::{ContactField, SeatId, SessionToken, ShowtimeId};

/// Returned by the auth gate instead of broadcasting a login request.
/// Carries enough to resume the suspended checkout once the session logs in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthChallenge {
    pub session: SessionToken,
    pub showtime_id: ShowtimeId,
    pub seats: Vec<SeatId>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BookingError {
    #[error("contact details incomplete: {}", join_fields(.fields))]
    Validation { fields: Vec<ContactField> },

    #[error("seat {seat} is no longer available")]
    SeatConflict { seat: SeatId },

    /// A conflict that ended the checkout, so the selection is gone too.
    #[error("seat {seat} was taken before the booking could be confirmed")]
    SeatLost { seat: SeatId },

    #[error("authentication required before checkout")]
    AuthRequired(AuthChallenge),

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("payment failed: {reason}")]
    PaymentFailure { reason: String },

    #[error("hold on seat {seat} expired before confirmation")]
    HoldExpired { seat: SeatId },

    #[error("checkout cancelled")]
    Cancelled,

    #[error("no seats selected")]
    EmptySelection,

    #[error("{0} not found")]
    NotFound(String),

    #[error("invalid state: expected {expected}, found {actual}")]
    InvalidState { expected: String, actual: String },

    #[error("internal error: {0}")]
    Internal(String),
}

fn join_fields(fields: &[ContactField]) -> String {
    fields.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}

impl BookingError {
    /// Whether the current attempt can be retried in place without losing data.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            BookingError::HoldExpired { .. }
                | BookingError::SeatLost { .. }
                | BookingError::Cancelled
                | BookingError::Internal(_)
        )
    }

    pub fn code(&self) -> &'static str {
        match self {
            BookingError::Validation { .. } => "VALIDATION_ERROR",
            BookingError::SeatConflict { .. } => "SEAT_CONFLICT",
            BookingError::SeatLost { .. } => "SEAT_LOST",
            BookingError::AuthRequired(_) => "AUTH_REQUIRED",
            BookingError::InvalidCredentials => "INVALID_CREDENTIALS",
            BookingError::PaymentFailure { .. } => "PAYMENT_FAILURE",
            BookingError::HoldExpired { .. } => "HOLD_EXPIRED",
            BookingError::Cancelled => "CANCELLED",
            BookingError::EmptySelection => "EMPTY_SELECTION",
            BookingError::NotFound(_) => "NOT_FOUND",
            BookingError::InvalidState { .. } => "INVALID_STATE",
            BookingError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BookingError::SeatConflict { .. } | BookingError::SeatLost { .. } => status_419(),
            BookingError::AuthRequired(_) | BookingError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            BookingError::PaymentFailure { .. } => StatusCode::PAYMENT_REQUIRED,
            BookingError::HoldExpired { .. } => StatusCode::GONE,
            BookingError::Cancelled | BookingError::InvalidState { .. } => StatusCode::CONFLICT,
            BookingError::EmptySelection => StatusCode::BAD_REQUEST,
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn status_419() -> StatusCode {
    StatusCode::from_u16(419).unwrap_or(StatusCode::CONFLICT)
}

impl IntoResponse for BookingError {
    fn into_response(self) -> Response {
        if let BookingError::Internal(ref msg) = self {
            tracing::error!("request failed: {}", msg);
        }

        let mut body = json!({
            "success": false,
            "code": self.code(),
            "error": self.to_string(),
            "recoverable": self.is_recoverable(),
        });
        match &self {
            BookingError::Validation { fields } => body["fields"] = json!(fields),
            BookingError::AuthRequired(challenge) => body["challenge"] = json!(challenge),
            BookingError::SeatConflict { seat }
            | BookingError::SeatLost { seat }
            | BookingError::HoldExpired { seat } => {
                body["seat"] = json!(seat)
            }
            _ => {}
        }

        (self.status_code(), Json(body)).into_response()
    }
}
