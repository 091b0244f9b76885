#![allow(dead_code)]

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use seat_booking::clock::{Clock, ManualClock};
use seat_booking::config::Config;
use seat_booking::models::{SeatId, SessionContext, Showtime, ShowtimeId};
use seat_booking::services::inventory::ShowtimeInventory;
use seat_booking::services::payment::{PaymentGateway, SimulatedPaymentGateway};
use seat_booking::services::sessions::{InMemorySessionStore, SessionStore};
use seat_booking::AppState;

pub const EMAIL: &str = "ada@example.com";
pub const PASSWORD: &str = "lovelace";

/// Defaults with a cheap bcrypt cost, one known account and no pre-sold seats.
pub fn test_config() -> Config {
    let mut config = Config::default_values().unwrap();
    config.users.bcrypt_cost = 4;
    config.users.accounts = format!("{EMAIL}:{PASSWORD}");
    config.seat_map.prebooked_ratio = 0.0;
    config
}

pub struct Harness {
    pub state: Arc<AppState>,
    pub clock: Arc<ManualClock>,
    pub payments: Arc<SimulatedPaymentGateway>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: Config) -> Self {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 1, 18, 0, 0).unwrap()));
        let payments = Arc::new(SimulatedPaymentGateway::approving());
        let sessions: Arc<dyn SessionStore> = Arc::new(InMemorySessionStore::new(clock.clone(), config.session.ttl_secs));
        let gateway: Arc<dyn PaymentGateway> = payments.clone();
        let state = AppState::with_parts(config, clock.clone() as Arc<dyn Clock>, sessions, gateway).unwrap();
        Self { state, clock, payments }
    }

    pub fn showtime(&self, id: &str) -> Arc<ShowtimeInventory> {
        self.state.inventories.open(Showtime {
            id: ShowtimeId::new(id),
            movie_id: "m-dune".to_string(),
            theater_id: "t-1".to_string(),
            starts_at: Utc.with_ymd_and_hms(2026, 3, 1, 21, 0, 0).unwrap(),
        })
    }

    pub async fn anonymous(&self) -> SessionContext {
        self.state.sessions().create().await.unwrap()
    }

    pub async fn logged_in(&self) -> SessionContext {
        let session = self.anonymous().await;
        let (session, _) = self.state.auth.authenticate(&session.token, EMAIL, PASSWORD).await.unwrap();
        session
    }
}

pub fn seat(id: &str) -> SeatId {
    id.parse().unwrap()
}
