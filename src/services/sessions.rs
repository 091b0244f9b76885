//! Server-side session records keyed by session token.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::clock::Clock;
use crate::errors::BookingError;
use crate::models::{AuthUser, SessionContext, SessionToken};

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Starts a new anonymous session.
    async fn create(&self) -> Result<SessionContext, BookingError>;

    async fn load(&self, token: &SessionToken) -> Result<Option<SessionContext>, BookingError>;

    async fn save(&self, session: &SessionContext) -> Result<(), BookingError>;

    async fn remove(&self, token: &SessionToken) -> Result<(), BookingError>;

    /// Attaches (or with `None`, clears) the identity of a session.
    async fn set_user(&self, token: &SessionToken, user: Option<AuthUser>) -> Result<SessionContext, BookingError> {
        let mut session = self
            .load(token)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("session {token}")))?;
        session.user = user;
        self.save(&session).await?;
        Ok(session)
    }

    /// Drops expired sessions and returns how many went. Stores whose backend
    /// expires keys on its own keep the default.
    async fn purge_expired(&self) -> Result<usize, BookingError> {
        Ok(0)
    }
}

struct StoredSession {
    session: SessionContext,
    expires_at: DateTime<Utc>,
}

/// Process-local sessions. Like the Redis store, every save restarts the TTL.
pub struct InMemorySessionStore {
    clock: Arc<dyn Clock>,
    ttl: Duration,
    sessions: RwLock<HashMap<SessionToken, StoredSession>>,
}

impl InMemorySessionStore {
    pub fn new(clock: Arc<dyn Clock>, ttl_secs: u64) -> Self {
        let ttl = Duration::seconds(i64::try_from(ttl_secs).unwrap_or(i64::MAX / 1000));
        Self { clock, ttl, sessions: RwLock::new(HashMap::new()) }
    }

    fn store(&self, session: &SessionContext) {
        let expires_at = self.clock.now().checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.sessions
            .write()
            .insert(session.token.clone(), StoredSession { session: session.clone(), expires_at });
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create(&self) -> Result<SessionContext, BookingError> {
        let session = SessionContext::anonymous(self.clock.now());
        self.store(&session);
        Ok(session)
    }

    async fn load(&self, token: &SessionToken) -> Result<Option<SessionContext>, BookingError> {
        let now = self.clock.now();
        Ok(self
            .sessions
            .read()
            .get(token)
            .filter(|stored| stored.expires_at > now)
            .map(|stored| stored.session.clone()))
    }

    async fn save(&self, session: &SessionContext) -> Result<(), BookingError> {
        self.store(session);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<usize, BookingError> {
        let now = self.clock.now();
        let mut sessions = self.sessions.write();
        let before = sessions.len();
        sessions.retain(|_, stored| stored.expires_at > now);
        Ok(before - sessions.len())
    }

    async fn remove(&self, token: &SessionToken) -> Result<(), BookingError> {
        self.sessions.write().remove(token);
        Ok(())
    }
}

#[cfg(feature = "redis-sessions")]
pub use redis_store::RedisSessionStore;

#[cfg(feature = "redis-sessions")]
mod redis_store {
    use super::*;
    use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
    use tracing::info;

    /// Sessions serialized as JSON under `session:{token}` with a sliding TTL.
    #[derive(Clone)]
    pub struct RedisSessionStore {
        conn: MultiplexedConnection,
        clock: Arc<dyn Clock>,
        ttl_secs: u64,
    }

    fn redis_err(e: redis::RedisError) -> BookingError {
        BookingError::Internal(format!("session store: {e}"))
    }

    impl RedisSessionStore {
        pub async fn connect(redis_url: &str, ttl_secs: u64, clock: Arc<dyn Clock>) -> Result<Self, BookingError> {
            let client = Client::open(redis_url).map_err(redis_err)?;
            let conn = client.get_multiplexed_async_connection().await.map_err(redis_err)?;
            info!("Redis session store connected");
            Ok(Self { conn, clock, ttl_secs })
        }

        fn key(token: &SessionToken) -> String {
            format!("session:{}", token)
        }
    }

    #[async_trait]
    impl SessionStore for RedisSessionStore {
        async fn create(&self) -> Result<SessionContext, BookingError> {
            let session = SessionContext::anonymous(self.clock.now());
            self.save(&session).await?;
            Ok(session)
        }

        async fn load(&self, token: &SessionToken) -> Result<Option<SessionContext>, BookingError> {
            let mut conn = self.conn.clone();
            let data: Option<String> = conn.get(Self::key(token)).await.map_err(redis_err)?;
            data.map(|raw| {
                serde_json::from_str(&raw).map_err(|e| BookingError::Internal(format!("corrupt session: {e}")))
            })
            .transpose()
        }

        async fn save(&self, session: &SessionContext) -> Result<(), BookingError> {
            let data = serde_json::to_string(session).map_err(|e| BookingError::Internal(e.to_string()))?;
            let mut conn = self.conn.clone();
            conn.set_ex(Self::key(&session.token), data, self.ttl_secs)
                .await
                .map_err(redis_err)
        }

        async fn remove(&self, token: &SessionToken) -> Result<(), BookingError> {
            let mut conn = self.conn.clone();
            let _: () = conn.del(Self::key(token)).await.map_err(redis_err)?;
            Ok(())
        }
    }
}
