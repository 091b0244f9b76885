//! payment.rs
//!
//! The payment step is an external collaborator; this module defines its
//! contract and two implementations.
//!
//! 1.  **PaymentGateway**: authorize / capture / void. Checkout authorizes
//!     first, commits the seats, and only then captures; if the seats cannot
//!     be committed the authorization is voided so nothing is charged.
//! 2.  **SimulatedPaymentGateway**: in-process stand-in with configurable
//!     latency and outcome, plus a scripted queue of outcomes for tests.
//! 3.  **CircuitBreakingGateway**: wraps any gateway with the Closed / Open /
//!     HalfOpen circuit breaker so a failing collaborator is not hammered.
//!     Only availability errors trip it; a decline is a healthy answer.

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{CircuitBreakerConfig, PaymentConfig};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentGatewayError {
    #[error("payment declined: {reason}")]
    Declined { reason: String },
    #[error("payment gateway unavailable: {0}")]
    Unavailable(String),
    #[error("circuit breaker is open - payment gateway temporarily unavailable")]
    CircuitOpen,
    #[error("unknown authorization {0}")]
    UnknownAuthorization(String),
}

impl PaymentGatewayError {
    /// Whether the error says the gateway itself is unhealthy.
    pub fn is_availability_failure(&self) -> bool {
        matches!(self, PaymentGatewayError::Unavailable(_) | PaymentGatewayError::CircuitOpen)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentRequest {
    pub booking_id: Uuid,
    pub amount: u64,
    pub currency: String,
    pub description: String,
    pub email: String,
}

/// Funds reserved by the gateway but not yet captured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentAuthorization {
    pub authorization_id: String,
    pub booking_id: Uuid,
    pub amount: u64,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn authorize(&self, request: &PaymentRequest) -> Result<PaymentAuthorization, PaymentGatewayError>;

    async fn capture(&self, authorization: &PaymentAuthorization) -> Result<(), PaymentGatewayError>;

    /// Releases an authorization without charging.
    async fn void(&self, authorization: &PaymentAuthorization) -> Result<(), PaymentGatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedOutcome {
    Approve,
    Decline(String),
    /// The gateway cannot be reached.
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthorizationState {
    Authorized,
    Captured,
    Voided,
}

/// Payment step simulated in-process.
#[derive(Debug)]
pub struct SimulatedPaymentGateway {
    latency: Duration,
    default_outcome: SimulatedOutcome,
    script: Mutex<VecDeque<SimulatedOutcome>>,
    ledger: Mutex<Vec<(PaymentAuthorization, AuthorizationState)>>,
}

impl SimulatedPaymentGateway {
    pub fn new(latency: Duration, default_outcome: SimulatedOutcome) -> Self {
        Self {
            latency,
            default_outcome,
            script: Mutex::new(VecDeque::new()),
            ledger: Mutex::new(Vec::new()),
        }
    }

    pub fn approving() -> Self {
        Self::new(Duration::ZERO, SimulatedOutcome::Approve)
    }

    pub fn from_config(config: &PaymentConfig) -> Self {
        let outcome = if config.approve {
            SimulatedOutcome::Approve
        } else {
            SimulatedOutcome::Decline("declined by simulator".to_string())
        };
        Self::new(Duration::from_millis(config.simulated_latency_ms), outcome)
    }

    /// Queues outcomes consumed by the next `authorize` calls, in order.
    pub fn push_outcomes(&self, outcomes: impl IntoIterator<Item = SimulatedOutcome>) {
        self.script.lock().extend(outcomes);
    }

    pub fn captured(&self) -> Vec<PaymentAuthorization> {
        self.with_state(AuthorizationState::Captured)
    }

    pub fn voided(&self) -> Vec<PaymentAuthorization> {
        self.with_state(AuthorizationState::Voided)
    }

    pub fn outstanding(&self) -> Vec<PaymentAuthorization> {
        self.with_state(AuthorizationState::Authorized)
    }

    fn with_state(&self, state: AuthorizationState) -> Vec<PaymentAuthorization> {
        self.ledger
            .lock()
            .iter()
            .filter(|(_, s)| *s == state)
            .map(|(a, _)| a.clone())
            .collect()
    }

    fn transition(&self, authorization: &PaymentAuthorization, next: AuthorizationState) -> Result<(), PaymentGatewayError> {
        let mut ledger = self.ledger.lock();
        let entry = ledger
            .iter_mut()
            .find(|(a, s)| a.authorization_id == authorization.authorization_id && *s == AuthorizationState::Authorized)
            .ok_or_else(|| PaymentGatewayError::UnknownAuthorization(authorization.authorization_id.clone()))?;
        entry.1 = next;
        Ok(())
    }
}

#[async_trait]
impl PaymentGateway for SimulatedPaymentGateway {
    async fn authorize(&self, request: &PaymentRequest) -> Result<PaymentAuthorization, PaymentGatewayError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let outcome = self.script.lock().pop_front().unwrap_or_else(|| self.default_outcome.clone());
        match outcome {
            SimulatedOutcome::Approve => {
                let authorization = PaymentAuthorization {
                    authorization_id: format!("sim_auth_{}", Uuid::new_v4().simple()),
                    booking_id: request.booking_id,
                    amount: request.amount,
                };
                info!(
                    booking_id = %request.booking_id,
                    amount = request.amount,
                    currency = %request.currency,
                    authorization_id = %authorization.authorization_id,
                    "simulated payment authorized"
                );
                self.ledger.lock().push((authorization.clone(), AuthorizationState::Authorized));
                Ok(authorization)
            }
            SimulatedOutcome::Decline(reason) => {
                warn!(booking_id = %request.booking_id, reason = %reason, "simulated payment declined");
                Err(PaymentGatewayError::Declined { reason })
            }
            SimulatedOutcome::Unavailable(reason) => {
                error!(booking_id = %request.booking_id, reason = %reason, "simulated gateway unavailable");
                Err(PaymentGatewayError::Unavailable(reason))
            }
        }
    }

    async fn capture(&self, authorization: &PaymentAuthorization) -> Result<(), PaymentGatewayError> {
        self.transition(authorization, AuthorizationState::Captured)
    }

    async fn void(&self, authorization: &PaymentAuthorization) -> Result<(), PaymentGatewayError> {
        self.transition(authorization, AuthorizationState::Voided)?;
        info!(authorization_id = %authorization.authorization_id, "authorization voided");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,
    /// Requests are rejected until the timeout elapses.
    Open,
    /// A single trial request is let through; the rest are rejected until
    /// it reports back.
    HalfOpen,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    state: RwLock<CircuitState>,
    failure_count: AtomicU32,
    trial_in_flight: AtomicBool,
    last_failure: Mutex<Option<Instant>>,
    failure_threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout: Duration) -> Self {
        Self {
            state: RwLock::new(CircuitState::Closed),
            failure_count: AtomicU32::new(0),
            trial_in_flight: AtomicBool::new(false),
            last_failure: Mutex::new(None),
            failure_threshold: failure_threshold.max(1),
            timeout,
        }
    }

    pub fn from_config(config: &CircuitBreakerConfig) -> Self {
        Self::new(config.failure_threshold, Duration::from_secs(config.timeout_seconds))
    }

    pub fn can_execute(&self) -> bool {
        let state = *self.state.read();
        match state {
            CircuitState::Closed => true,
            CircuitState::HalfOpen => self.claim_trial(),
            CircuitState::Open => {
                let last_failure = *self.last_failure.lock();
                let elapsed = last_failure.map(|t| t.elapsed()).unwrap_or(self.timeout);
                if elapsed < self.timeout {
                    return false;
                }
                {
                    let mut state = self.state.write();
                    if *state == CircuitState::Open {
                        *state = CircuitState::HalfOpen;
                        info!("Circuit breaker transitioning to HalfOpen state");
                    }
                }
                self.claim_trial()
            }
        }
    }

    fn claim_trial(&self) -> bool {
        self.trial_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn record_success(&self) {
        self.trial_in_flight.store(false, Ordering::Release);
        let mut state = self.state.write();
        if *state == CircuitState::HalfOpen {
            info!("Circuit breaker recovered - transitioning to Closed state");
        }
        *state = CircuitState::Closed;
        self.failure_count.store(0, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.trial_in_flight.store(false, Ordering::Release);
        let failures = self.failure_count.fetch_add(1, Ordering::Relaxed) + 1;
        *self.last_failure.lock() = Some(Instant::now());

        let mut state = self.state.write();
        match *state {
            CircuitState::Closed if failures >= self.failure_threshold => {
                *state = CircuitState::Open;
                error!("Circuit breaker OPENED - {} failures reached threshold {}", failures, self.failure_threshold);
            }
            CircuitState::HalfOpen => {
                *state = CircuitState::Open;
                warn!("Circuit breaker test failed - returning to Open state");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        *self.state.read()
    }

    pub fn failure_count(&self) -> u32 {
        self.failure_count.load(Ordering::Relaxed)
    }
}

/// Any gateway behind a circuit breaker. Only availability errors count as
/// failures; declines pass straight through.
pub struct CircuitBreakingGateway<G> {
    inner: G,
    breaker: CircuitBreaker,
}

impl<G: PaymentGateway> CircuitBreakingGateway<G> {
    pub fn new(inner: G, breaker: CircuitBreaker) -> Self {
        Self { inner, breaker }
    }

    pub fn inner(&self) -> &G {
        &self.inner
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

#[async_trait]
impl<G: PaymentGateway> PaymentGateway for CircuitBreakingGateway<G> {
    async fn authorize(&self, request: &PaymentRequest) -> Result<PaymentAuthorization, PaymentGatewayError> {
        if !self.breaker.can_execute() {
            warn!("Circuit breaker is OPEN - blocking payment request");
            return Err(PaymentGatewayError::CircuitOpen);
        }
        match self.inner.authorize(request).await {
            Ok(authorization) => {
                self.breaker.record_success();
                Ok(authorization)
            }
            Err(e) if e.is_availability_failure() => {
                self.breaker.record_failure();
                Err(e)
            }
            Err(e) => {
                // The gateway answered, so it is healthy.
                self.breaker.record_success();
                Err(e)
            }
        }
    }

    // Capture and void settle an authorization that already exists, so they
    // bypass the breaker.
    async fn capture(&self, authorization: &PaymentAuthorization) -> Result<(), PaymentGatewayError> {
        self.inner.capture(authorization).await
    }

    async fn void(&self, authorization: &PaymentAuthorization) -> Result<(), PaymentGatewayError> {
        self.inner.void(authorization).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(amount: u64) -> PaymentRequest {
        PaymentRequest {
            booking_id: Uuid::new_v4(),
            amount,
            currency: "USD".into(),
            description: "2 seats".into(),
            email: "ada@example.com".into(),
        }
    }

    #[tokio::test]
    async fn scripted_outcomes_run_before_default() {
        let gateway = SimulatedPaymentGateway::approving();
        gateway.push_outcomes([SimulatedOutcome::Decline("card expired".into())]);

        let first = gateway.authorize(&request(330)).await;
        assert_eq!(first, Err(PaymentGatewayError::Declined { reason: "card expired".into() }));
        let second = gateway.authorize(&request(330)).await.unwrap();
        assert_eq!(second.amount, 330);
        assert_eq!(gateway.outstanding().len(), 1);
    }

    #[tokio::test]
    async fn voided_authorization_cannot_be_captured() {
        let gateway = SimulatedPaymentGateway::approving();
        let auth = gateway.authorize(&request(100)).await.unwrap();
        gateway.void(&auth).await.unwrap();
        assert!(gateway.capture(&auth).await.is_err());
        assert_eq!(gateway.voided(), vec![auth]);
        assert!(gateway.captured().is_empty());
    }

    #[tokio::test]
    async fn breaker_opens_after_threshold_and_blocks() {
        let inner = SimulatedPaymentGateway::new(Duration::ZERO, SimulatedOutcome::Unavailable("down".into()));
        let gateway = CircuitBreakingGateway::new(inner, CircuitBreaker::new(2, Duration::from_secs(60)));

        assert_eq!(gateway.authorize(&request(1)).await, Err(PaymentGatewayError::Unavailable("down".into())));
        assert_eq!(gateway.breaker().state(), CircuitState::Closed);
        assert!(gateway.authorize(&request(1)).await.is_err());
        assert_eq!(gateway.breaker().state(), CircuitState::Open);

        gateway.inner().push_outcomes([SimulatedOutcome::Approve]);
        assert_eq!(gateway.authorize(&request(1)).await, Err(PaymentGatewayError::CircuitOpen));
    }

    #[tokio::test]
    async fn declines_do_not_trip_the_breaker() {
        let inner = SimulatedPaymentGateway::new(Duration::ZERO, SimulatedOutcome::Decline("insufficient funds".into()));
        let gateway = CircuitBreakingGateway::new(inner, CircuitBreaker::new(2, Duration::from_secs(60)));

        for _ in 0..5 {
            let result = gateway.authorize(&request(1)).await;
            assert_eq!(result, Err(PaymentGatewayError::Declined { reason: "insufficient funds".into() }));
        }
        assert_eq!(gateway.breaker().state(), CircuitState::Closed);
        assert_eq!(gateway.breaker().failure_count(), 0);

        gateway.inner().push_outcomes([SimulatedOutcome::Approve]);
        assert!(gateway.authorize(&request(1)).await.is_ok());
    }

    #[tokio::test]
    async fn decline_between_outages_resets_the_count() {
        let inner = SimulatedPaymentGateway::approving();
        let gateway = CircuitBreakingGateway::new(inner, CircuitBreaker::new(2, Duration::from_secs(60)));
        gateway.inner().push_outcomes([
            SimulatedOutcome::Unavailable("timeout".into()),
            SimulatedOutcome::Decline("card expired".into()),
            SimulatedOutcome::Unavailable("timeout".into()),
        ]);

        for _ in 0..3 {
            assert!(gateway.authorize(&request(1)).await.is_err());
        }
        assert_eq!(gateway.breaker().state(), CircuitState::Closed);
        assert_eq!(gateway.breaker().failure_count(), 1);
    }

    #[test]
    fn half_open_admits_a_single_trial() {
        let breaker = CircuitBreaker::new(1, Duration::ZERO);
        breaker.record_failure();

        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert!(!breaker.can_execute());
        assert!(!breaker.can_execute());

        // A failed trial reopens; after the timeout the next trial is admitted.
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.can_execute());
        assert!(!breaker.can_execute());

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert!(breaker.can_execute());
        assert!(breaker.can_execute());
    }

    #[test]
    fn half_open_success_closes_circuit() {
        let breaker = CircuitBreaker::new(1, Duration::ZERO);
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.failure_count(), 0);
    }
}
