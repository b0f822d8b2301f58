//! Session context.
//!
//! The core never looks up "the current user" on its own. Callers resolve a
//! [`Session`] from their [`AuthProvider`] once and pass it explicitly.

use tatsahay_shared::{User, UserId};

use crate::error::AuthError;

/// Source of the signed-in user.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<User>;

    fn is_session_loading(&self) -> bool {
        false
    }
}

/// The authenticated user on whose behalf an operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: User,
}

impl Session {
    pub fn new(user: User) -> Self {
        Self { user }
    }

    pub fn current(provider: &dyn AuthProvider) -> Result<Self, AuthError> {
        if provider.is_session_loading() {
            return Err(AuthError::SessionLoading);
        }
        provider
            .current_user()
            .map(Self::new)
            .ok_or(AuthError::Unauthenticated)
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn user_id(&self) -> &UserId {
        &self.user.id
    }
}

/// Provider with a fixed answer, for embedding and tests.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    user: Option<User>,
    loading: bool,
}

impl StaticAuth {
    pub fn signed_in(user: User) -> Self {
        Self {
            user: Some(user),
            loading: false,
        }
    }

    pub fn signed_out() -> Self {
        Self::default()
    }

    pub fn loading() -> Self {
        Self {
            user: None,
            loading: true,
        }
    }
}

impl AuthProvider for StaticAuth {
    fn current_user(&self) -> Option<User> {
        self.user.clone()
    }

    fn is_session_loading(&self) -> bool {
        self.loading
    }
}
