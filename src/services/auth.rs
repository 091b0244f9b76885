//! Authentication gate in front of checkout.
//!
//! An anonymous session that tries to check out is not rejected outright: the
//! gate parks the transition (showtime plus the seats selected at that moment)
//! and hands back an [`AuthChallenge`]. After a successful login the parked
//! transition is returned so the caller resumes with the same selection.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{split_list, UsersConfig};
use crate::errors::{AuthChallenge, BookingError};
use crate::models::{AuthUser, SeatId, SessionContext, SessionToken, ShowtimeId, UserAccount};
use crate::services::selection::SeatSelectionStore;
use crate::services::sessions::SessionStore;

/// Proof that the gate let a session through. Only the gate creates these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authorized {
    user: AuthUser,
}

impl Authorized {
    pub fn user(&self) -> &AuthUser {
        &self.user
    }
}

/// Checkout transition parked while the session logs in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuspendedCheckout {
    pub showtime_id: ShowtimeId,
    pub seats: Vec<SeatId>,
    pub suspended_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct UserDirectory {
    users: HashMap<String, UserAccount>,
}

impl UserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads the `email:password` pairs from config, hashing each password.
    pub fn from_config(config: &UsersConfig) -> Result<Self, BookingError> {
        let mut directory = Self::new();
        for entry in split_list(&config.accounts) {
            let (email, password) = entry
                .split_once(':')
                .ok_or_else(|| BookingError::Internal(format!("malformed account entry '{entry}'")))?;
            directory.register(email, email, password, config.bcrypt_cost)?;
        }
        Ok(directory)
    }

    pub fn register(&mut self, email: &str, display_name: &str, password: &str, cost: u32) -> Result<AuthUser, BookingError> {
        let password_hash = bcrypt::hash(password, cost).map_err(|e| BookingError::Internal(e.to_string()))?;
        let account = UserAccount {
            user_id: Uuid::new_v4(),
            email: email.to_lowercase(),
            display_name: display_name.to_string(),
            password_hash,
        };
        let user = account.to_auth_user();
        self.users.insert(account.email.clone(), account);
        Ok(user)
    }

    pub fn verify(&self, email: &str, password: &str) -> Option<AuthUser> {
        self.users
            .get(&email.to_lowercase())
            .filter(|account| account.verify_password(password))
            .map(UserAccount::to_auth_user)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

pub struct AuthGate {
    sessions: Arc<dyn SessionStore>,
    users: UserDirectory,
    suspended: Mutex<HashMap<SessionToken, SuspendedCheckout>>,
}

impl AuthGate {
    pub fn new(sessions: Arc<dyn SessionStore>, users: UserDirectory) -> Self {
        Self { sessions, users, suspended: Mutex::new(HashMap::new()) }
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Lets authenticated sessions through. Otherwise parks the transition,
    /// leaves `selection` as it is and returns `AuthRequired`.
    pub fn require_auth(&self, session: &SessionContext, selection: &SeatSelectionStore) -> Result<Authorized, BookingError> {
        if let Some(user) = &session.user {
            self.suspended.lock().remove(&session.token);
            return Ok(Authorized { user: user.clone() });
        }

        let seats = selection.seat_ids();
        let showtime_id = selection.showtime_id().clone();
        info!(session = %session.token, showtime = %showtime_id, seats = seats.len(), "checkout suspended until login");
        self.suspended.lock().insert(
            session.token.clone(),
            SuspendedCheckout {
                showtime_id: showtime_id.clone(),
                seats: seats.clone(),
                suspended_at: selection.inventory().now(),
            },
        );

        Err(BookingError::AuthRequired(AuthChallenge { session: session.token.clone(), showtime_id, seats }))
    }

    /// Verifies credentials and binds the identity to the session. Returns the
    /// updated session and the checkout that was waiting on this login, if any.
    pub async fn authenticate(
        &self,
        token: &SessionToken,
        email: &str,
        password: &str,
    ) -> Result<(SessionContext, Option<SuspendedCheckout>), BookingError> {
        let Some(user) = self.users.verify(email, password) else {
            warn!(session = %token, "login rejected");
            return Err(BookingError::InvalidCredentials);
        };

        let session = self.sessions.set_user(token, Some(user.clone())).await?;
        let resumed = self.suspended.lock().remove(token);
        info!(session = %token, user = %user.email, resumed = resumed.is_some(), "session authenticated");
        Ok((session, resumed))
    }

    pub async fn logout(&self, token: &SessionToken) -> Result<SessionContext, BookingError> {
        self.suspended.lock().remove(token);
        self.sessions.set_user(token, None).await
    }

    pub fn suspended(&self, token: &SessionToken) -> Option<SuspendedCheckout> {
        self.suspended.lock().get(token).cloned()
    }

    /// Forgets checkouts parked before `cutoff` whose session never logged in.
    pub fn purge_suspended(&self, cutoff: DateTime<Utc>) -> usize {
        let mut suspended = self.suspended.lock();
        let before = suspended.len();
        suspended.retain(|_, parked| parked.suspended_at >= cutoff);
        before - suspended.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_verifies_bcrypt_passwords() {
        let mut users = UserDirectory::new();
        users.register("Ada@Example.com", "Ada", "s3cret", 4).unwrap();
        assert!(users.verify("ada@example.com", "s3cret").is_some());
        assert!(users.verify("ada@example.com", "wrong").is_none());
        assert!(users.verify("nobody@example.com", "s3cret").is_none());
    }

    #[test]
    fn directory_rejects_malformed_entries() {
        let config = UsersConfig { accounts: "no-colon-here".into(), bcrypt_cost: 4 };
        assert!(UserDirectory::from_config(&config).is_err());

        let config = UsersConfig { accounts: "a@x.io:pw, b@x.io:pw2".into(), bcrypt_cost: 4 };
        assert_eq!(UserDirectory::from_config(&config).unwrap().len(), 2);
    }
}
