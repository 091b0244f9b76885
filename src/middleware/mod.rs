use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, StatusCode},
};
use base64::{engine::general_purpose, Engine as _};
use std::sync::Arc;

use crate::models::{SessionContext, SessionToken};
use crate::AppState;

pub const SESSION_HEADER: &str = "x-session-token";

// Session extractor: resolves X-Session-Token against the session store
impl FromRequestParts<Arc<AppState>> for SessionContext {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or((StatusCode::UNAUTHORIZED, "missing X-Session-Token header".to_string()))?;

        let session = state
            .sessions()
            .load(&SessionToken::new(token))
            .await
            .map_err(|e| {
                tracing::error!("session lookup failed: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "session store unavailable".to_string())
            })?;

        session.ok_or((StatusCode::UNAUTHORIZED, "unknown or expired session".to_string()))
    }
}

/// `email:password` taken from a Basic Authorization header.
#[derive(Debug, Clone)]
pub struct BasicCredentials {
    pub email: String,
    pub password: String,
}

impl BasicCredentials {
    pub fn parse(header_value: &str) -> Option<Self> {
        let encoded = header_value.strip_prefix("Basic ")?;
        let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
        let credentials = String::from_utf8(decoded).ok()?;

        let (email, password) = credentials.split_once(':')?;
        if email.is_empty() {
            return None;
        }
        Some(Self { email: email.to_string(), password: password.to_string() })
    }
}

impl<S: Send + Sync> FromRequestParts<S> for BasicCredentials {
    type Rejection = (StatusCode, String);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(BasicCredentials::parse)
            .ok_or((StatusCode::UNAUTHORIZED, "expected Basic credentials".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_header() {
        let encoded = general_purpose::STANDARD.encode("ada@example.com:pa:ss");
        let creds = BasicCredentials::parse(&format!("Basic {encoded}")).unwrap();
        assert_eq!(creds.email, "ada@example.com");
        assert_eq!(creds.password, "pa:ss");
    }

    #[test]
    fn rejects_other_schemes_and_garbage() {
        assert!(BasicCredentials::parse("Bearer abc").is_none());
        assert!(BasicCredentials::parse("Basic !!!").is_none());
        let no_colon = general_purpose::STANDARD.encode("just-a-user");
        assert!(BasicCredentials::parse(&format!("Basic {no_colon}")).is_none());
    }
}
