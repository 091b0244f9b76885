use config::{builder::DefaultState, ConfigBuilder, ConfigError, Environment};
use serde::Deserialize;

// Main configuration container; every section can be overridden from the
// environment as BOOKING__<SECTION>__<KEY>, e.g. BOOKING__HOLDS__TTL_SECS=120.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub seat_map: SeatMapConfig,
    pub pricing: PricingConfig,
    pub holds: HoldConfig,
    pub session: SessionConfig,
    pub jwt: JwtConfig,
    pub payment: PaymentConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub users: UsersConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_json: bool,
}

// Theater layout used for every generated showtime
#[derive(Debug, Clone, Deserialize)]
pub struct SeatMapConfig {
    pub seed: u64,
    /// Share of seats already sold when an inventory is first generated.
    pub prebooked_ratio: f64,
    /// Comma separated row labels, front to back.
    pub rows: String,
    pub seats_per_row: u32,
    /// Comma separated seat positions left empty for aisles.
    pub aisles: String,
    /// Inclusive row ranges such as "G-H". Rows outside every range are regular.
    pub premium_rows: String,
    pub vip_rows: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PricingConfig {
    pub regular: u64,
    pub premium: u64,
    pub vip: u64,
    pub fee_basis_points: u32,
    pub currency: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HoldConfig {
    pub ttl_secs: i64,
    pub sweep_interval_secs: u64,
    /// How long an idle checkout or a parked login stays in memory.
    pub retention_secs: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    pub redis_url: String,
    pub ttl_secs: u64,
}

// Signing key for confirmation tokens
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
}

// Simulated payment collaborator
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub simulated_latency_ms: u64,
    pub approve: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UsersConfig {
    /// Comma separated `email:password` pairs loaded into the user directory.
    pub accounts: String,
    pub bcrypt_cost: u32,
}

impl Config {
    /// Defaults overlaid with `BOOKING__*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::defaults()?
            .add_source(
                Environment::with_prefix("BOOKING")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Built-in defaults only, ignoring the environment.
    pub fn default_values() -> Result<Self, ConfigError> {
        Self::defaults()?.build()?.try_deserialize()
    }

    fn defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        config::Config::builder()
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 8000)?
            .set_default("app.environment", "development")?
            .set_default("app.rust_log", "seat_booking=debug,tower_http=debug")?
            .set_default("app.log_json", false)?
            .set_default("seat_map.seed", 42)?
            .set_default("seat_map.prebooked_ratio", 0.2)?
            .set_default("seat_map.rows", "A,B,C,D,E,F,G,H,I,J")?
            .set_default("seat_map.seats_per_row", 12)?
            .set_default("seat_map.aisles", "")?
            .set_default("seat_map.premium_rows", "G-H")?
            .set_default("seat_map.vip_rows", "I-J")?
            .set_default("pricing.regular", 150)?
            .set_default("pricing.premium", 250)?
            .set_default("pricing.vip", 400)?
            .set_default("pricing.fee_basis_points", 1000)?
            .set_default("pricing.currency", "USD")?
            .set_default("holds.ttl_secs", 300)?
            .set_default("holds.sweep_interval_secs", 30)?
            .set_default("holds.retention_secs", 3600)?
            .set_default("session.backend", "memory")?
            .set_default("session.redis_url", "redis://127.0.0.1:6379")?
            .set_default("session.ttl_secs", 86400)?
            .set_default("jwt.secret", "change-me-in-production")?
            .set_default("jwt.issuer", "seat-booking")?
            .set_default("payment.simulated_latency_ms", 250)?
            .set_default("payment.approve", true)?
            .set_default("circuit_breaker.failure_threshold", 5)?
            .set_default("circuit_breaker.timeout_seconds", 60)?
            .set_default("users.accounts", "demo@example.com:demo123")?
            .set_default("users.bcrypt_cost", 10)
    }
}

/// Splits a comma separated list, dropping blanks.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_deserialize() {
        let config = Config::default_values().unwrap();
        assert_eq!(config.app.port, 8000);
        assert_eq!(config.pricing.fee_basis_points, 1000);
        assert_eq!(config.holds.ttl_secs, 300);
        assert_eq!(config.holds.retention_secs, 3600);
        assert_eq!(config.session.backend, SessionBackend::Memory);
        assert_eq!(split_list(&config.seat_map.rows).len(), 10);
    }

    #[test]
    fn split_list_ignores_blanks() {
        assert_eq!(split_list(" A, ,B,"), vec!["A".to_string(), "B".to_string()]);
        assert!(split_list("").is_empty());
    }
}
