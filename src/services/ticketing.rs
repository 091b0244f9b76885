use chrono::Duration;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::clock::Clock;
use crate::config::JwtConfig;
use crate::errors::BookingError;
use crate::models::{Booking, BookingStatus, Ticket};
use crate::services::pricing::PricingCalculator;
use crate::services::selection::SeatSelectionStore;

const CODE_LEN: usize = 10;

/// Claims embedded in the scannable confirmation token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketClaims {
    /// Ticket id.
    pub sub: String,
    pub booking: Uuid,
    pub showtime: String,
    pub seats: Vec<String>,
    pub total: u64,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

pub struct TicketIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    issuer: String,
    clock: Arc<dyn Clock>,
}

impl TicketIssuer {
    pub fn new(secret: &str, issuer: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            issuer: issuer.into(),
            clock,
        }
    }

    pub fn from_config(config: &JwtConfig, clock: Arc<dyn Clock>) -> Self {
        Self::new(&config.secret, config.issuer.clone(), clock)
    }

    /// Books every seat of the booking and freezes its price.
    ///
    /// The seats are committed all-or-nothing. If any of them is no longer
    /// held by the booking's session the error comes back before anything is
    /// written, so the caller can void the payment.
    pub fn issue(
        &self,
        booking: &mut Booking,
        selection: &SeatSelectionStore,
        pricing: &PricingCalculator,
    ) -> Result<Ticket, BookingError> {
        if booking.status() != BookingStatus::AwaitingPayment {
            return Err(BookingError::InvalidState {
                expected: BookingStatus::AwaitingPayment.to_string(),
                actual: booking.status().to_string(),
            });
        }

        let inventory = selection.inventory();
        let showtime = inventory.showtime();
        let seats = booking.seats().to_vec();
        let priced = seats.iter().map(|s| inventory.seat(s)).collect::<Result<Vec<_>, _>>()?;
        let price = pricing.price(&priced);

        let now = self.clock.now();
        let ticket_id = Uuid::new_v4();
        let code = confirmation_code(ticket_id, booking.id());
        let claims = TicketClaims {
            sub: ticket_id.to_string(),
            booking: booking.id(),
            showtime: showtime.id.to_string(),
            seats: seats.iter().map(ToString::to_string).collect(),
            total: price.total,
            iss: self.issuer.clone(),
            iat: now.timestamp(),
            exp: (showtime.starts_at.max(now) + Duration::hours(6)).timestamp(),
        };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| BookingError::Internal(format!("token signing failed: {e}")))?;

        inventory.commit(&seats, booking.session(), booking.id())?;
        booking.confirm(price, ticket_id, now)?;

        info!(
            booking_id = %booking.id(),
            ticket_id = %ticket_id,
            seats = seats.len(),
            total = price.total,
            "ticket issued"
        );

        Ok(Ticket::new(
            ticket_id,
            booking.id(),
            showtime.id.clone(),
            showtime.starts_at,
            seats,
            price,
            code,
            token,
            now,
        ))
    }

    /// Checks a scanned confirmation token and returns its claims.
    ///
    /// Expiry is judged against the issuer's clock, the same one that
    /// stamped `iat` and `exp`.
    pub fn verify(&self, token: &str) -> Result<TicketClaims, BookingError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.validate_exp = false;
        let claims = decode::<TicketClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| BookingError::NotFound(format!("valid ticket ({e})")))?;

        if claims.exp <= self.clock.now().timestamp() {
            return Err(BookingError::NotFound("valid ticket (expired)".to_string()));
        }
        Ok(claims)
    }
}

/// Short uppercase code printed next to the token for manual lookup.
pub fn confirmation_code(ticket_id: Uuid, booking_id: Uuid) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ticket_id.as_bytes());
    hasher.update(booking_id.as_bytes());
    let hex = format!("{:x}", hasher.finalize());
    hex[..CODE_LEN].to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{TimeZone, Utc};

    fn claims(issuer: &str, iat: i64, exp: i64) -> TicketClaims {
        TicketClaims {
            sub: Uuid::new_v4().to_string(),
            booking: Uuid::new_v4(),
            showtime: "s1".into(),
            seats: vec!["A1".into()],
            total: 100,
            iss: issuer.into(),
            iat,
            exp,
        }
    }

    #[test]
    fn verify_uses_the_issuer_clock_for_expiry() {
        let start = Utc.with_ymd_and_hms(2020, 5, 1, 18, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let issuer = TicketIssuer::new("secret", "box-office", clock.clone());

        let exp = (start + Duration::hours(6)).timestamp();
        let token = encode(&Header::new(Algorithm::HS256), &claims("box-office", start.timestamp(), exp), &issuer.encoding)
            .unwrap();

        // Long past in wall time, still valid by the issuer's clock.
        assert_eq!(issuer.verify(&token).unwrap().exp, exp);

        clock.advance(Duration::hours(6));
        assert!(matches!(issuer.verify(&token), Err(BookingError::NotFound(_))));
    }

    #[test]
    fn verify_rejects_foreign_issuer_and_signature() {
        let start = Utc.with_ymd_and_hms(2020, 5, 1, 18, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let issuer = TicketIssuer::new("secret", "box-office", clock.clone());
        let exp = (start + Duration::hours(1)).timestamp();

        let foreign = encode(&Header::new(Algorithm::HS256), &claims("elsewhere", start.timestamp(), exp), &issuer.encoding)
            .unwrap();
        assert!(issuer.verify(&foreign).is_err());

        let forged = TicketIssuer::new("other-secret", "box-office", clock);
        let token = encode(&Header::new(Algorithm::HS256), &claims("box-office", start.timestamp(), exp), &forged.encoding)
            .unwrap();
        assert!(issuer.verify(&token).is_err());
    }

    #[test]
    fn confirmation_code_is_stable_and_short() {
        let t = Uuid::new_v4();
        let b = Uuid::new_v4();
        let code = confirmation_code(t, b);
        assert_eq!(code.len(), CODE_LEN);
        assert_eq!(code, confirmation_code(t, b));
        assert!(code.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}
