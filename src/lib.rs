pub mod clock;
pub mod config;
pub mod controllers;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod services;

use chrono::Duration;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use clock::{Clock, SystemClock};
use config::{Config, SessionBackend};
use models::{SessionToken, ShowtimeId, TierPriceTable};
use services::auth::{AuthGate, UserDirectory};
use services::checkout::{cancel_pair, CancelHandle, CancelSignal, CheckoutWorkflow};
use services::inventory::InventoryRegistry;
use services::payment::{CircuitBreaker, CircuitBreakingGateway, PaymentGateway, SimulatedPaymentGateway};
use services::pricing::PricingCalculator;
use services::seat_map::{RowLayout, SeatMapGenerator};
use services::selection::SeatSelectionStore;
use services::sessions::{InMemorySessionStore, SessionStore};
use services::ticketing::TicketIssuer;

/// A running checkout plus the means to cancel it while payment is in flight.
pub struct CheckoutHandle {
    pub owner: SessionToken,
    pub workflow: tokio::sync::Mutex<CheckoutWorkflow>,
    cancel: CancelHandle,
    signal: CancelSignal,
}

impl CheckoutHandle {
    pub fn new(owner: SessionToken, workflow: CheckoutWorkflow) -> Self {
        let (cancel, signal) = cancel_pair();
        Self { owner, workflow: tokio::sync::Mutex::new(workflow), cancel, signal }
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn signal(&self) -> CancelSignal {
        self.signal.clone()
    }
}

// Shared state for the whole application
pub struct AppState {
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub inventories: InventoryRegistry,
    pub auth: AuthGate,
    pub pricing: PricingCalculator,
    pub issuer: TicketIssuer,
    pub payments: Arc<dyn PaymentGateway>,
    pub selections: Mutex<HashMap<(SessionToken, ShowtimeId), SeatSelectionStore>>,
    pub checkouts: Mutex<HashMap<Uuid, Arc<CheckoutHandle>>>,
}

impl AppState {
    /// Wires the state from config: session backend, simulated payment step
    /// behind a circuit breaker, system clock.
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);

        let sessions: Arc<dyn SessionStore> = match config.session.backend {
            SessionBackend::Memory => Arc::new(InMemorySessionStore::new(clock.clone(), config.session.ttl_secs)),
            #[cfg(feature = "redis-sessions")]
            SessionBackend::Redis => Arc::new(
                services::sessions::RedisSessionStore::connect(
                    &config.session.redis_url,
                    config.session.ttl_secs,
                    clock.clone(),
                )
                .await?,
            ),
            #[cfg(not(feature = "redis-sessions"))]
            SessionBackend::Redis => anyhow::bail!("redis session backend requires the redis-sessions feature"),
        };

        let payments: Arc<dyn PaymentGateway> = Arc::new(CircuitBreakingGateway::new(
            SimulatedPaymentGateway::from_config(&config.payment),
            CircuitBreaker::from_config(&config.circuit_breaker),
        ));

        Self::with_parts(config, clock, sessions, payments)
    }

    pub fn with_parts(
        config: Config,
        clock: Arc<dyn Clock>,
        sessions: Arc<dyn SessionStore>,
        payments: Arc<dyn PaymentGateway>,
    ) -> anyhow::Result<Arc<Self>> {
        let prices = TierPriceTable {
            regular: config.pricing.regular,
            premium: config.pricing.premium,
            vip: config.pricing.vip,
        };
        let layout = RowLayout::from_config(&config.seat_map)?;
        let generator = SeatMapGenerator::new(layout, prices, config.seat_map.seed, config.seat_map.prebooked_ratio)?;
        let inventories = InventoryRegistry::new(generator, Duration::seconds(config.holds.ttl_secs), clock.clone());

        let users = UserDirectory::from_config(&config.users)?;
        info!("Loaded {} user accounts", users.len());

        Ok(Arc::new(Self {
            auth: AuthGate::new(sessions, users),
            pricing: PricingCalculator::new(config.pricing.fee_basis_points),
            issuer: TicketIssuer::from_config(&config.jwt, clock.clone()),
            payments,
            inventories,
            selections: Mutex::new(HashMap::new()),
            checkouts: Mutex::new(HashMap::new()),
            clock,
            config,
        }))
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        self.auth.sessions()
    }
}
