//! Development sessions.
//!
//! `POST /auth/login` issues an opaque bearer token for an email address.
//! There is no password: this stands in for a real identity provider and
//! only exists so that reports carry a stable author id. Tokens expire
//! after a fixed lifetime.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::RwLock;
use tracing::info;

use tatsahay_core::{AuthProvider, Session};
use tatsahay_shared::constants::SESSION_TOKEN_BYTES;
use tatsahay_shared::{User, UserId};

use crate::error::ServerError;

/// Profile fields supplied at login.
#[derive(Debug, Clone, Default)]
pub struct LoginDetails {
    pub email: String,
    pub full_name: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

/// Stable user id for an email address: `usr_` plus a hash prefix.
pub fn user_id_for(email: &str) -> UserId {
    let hash = blake3::hash(email.trim().to_lowercase().as_bytes());
    UserId::new(format!("usr_{}", &hash.to_hex()[..12]))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

struct IssuedSession {
    user: User,
    issued: Instant,
}

/// Token to user map.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, IssuedSession>>,
    ttl: Duration,
}

impl SessionRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn login(&self, details: LoginDetails) -> Result<(String, User), ServerError> {
        let email = details.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(ServerError::BadRequest("A valid email is required".into()));
        }

        let full_name = non_empty(details.full_name).unwrap_or_else(|| {
            email
                .split('@')
                .next()
                .unwrap_or_default()
                .to_string()
        });
        let user = User {
            id: user_id_for(&email),
            full_name,
            email,
            city: non_empty(details.city),
            state: non_empty(details.state),
        };

        let mut raw = [0u8; SESSION_TOKEN_BYTES];
        OsRng.fill_bytes(&mut raw);
        let token = hex::encode(raw);

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, session| session.issued.elapsed() < self.ttl);
        sessions.insert(
            token.clone(),
            IssuedSession {
                user: user.clone(),
                issued: Instant::now(),
            },
        );
        info!(user = %user.id, active = sessions.len(), "Session issued");

        Ok((token, user))
    }

    /// The user behind `token`, unless the token is unknown or expired.
    pub async fn user_for(&self, token: &str) -> Option<User> {
        self.sessions
            .read()
            .await
            .get(token)
            .filter(|session| session.issued.elapsed() < self.ttl)
            .map(|session| session.user.clone())
    }

    /// Resolve the `Authorization: Bearer` header into an auth provider.
    pub async fn provider(&self, headers: &HeaderMap) -> BearerAuth {
        let token = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);

        let user = match token {
            Some(token) if !token.is_empty() => self.user_for(token).await,
            _ => None,
        };
        BearerAuth { user }
    }

    /// Shorthand for handlers that need a signed-in user.
    pub async fn session(&self, headers: &HeaderMap) -> Result<Session, ServerError> {
        let provider = self.provider(headers).await;
        Ok(Session::current(&provider)?)
    }
}

/// The user behind one request's bearer token, if any.
#[derive(Debug, Clone)]
pub struct BearerAuth {
    user: Option<User>,
}

impl AuthProvider for BearerAuth {
    fn current_user(&self) -> Option<User> {
        self.user.clone()
    }
}
