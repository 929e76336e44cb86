//! Auth provider port - session lifecycle against the hosted auth service.
//!
//! Everything downstream (realtime bridge, notification center, views)
//! observes the session through [`AuthProvider::watch`] rather than polling.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;

use crate::domain::foundation::{DomainError, Timestamp, UserId};

/// A signed-in session.
#[derive(Clone)]
pub struct AuthSession {
    pub user_id: UserId,
    pub access_token: SecretString,
    pub refresh_token: Option<SecretString>,
    pub expires_at: Option<Timestamp>,
}

impl AuthSession {
    pub fn new(user_id: UserId, access_token: impl Into<String>) -> Self {
        Self {
            user_id,
            access_token: SecretString::new(access_token.into()),
            refresh_token: None,
            expires_at: None,
        }
    }

    pub fn access_token(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// How long until the token should be refreshed, `margin` ahead of
    /// expiry. Zero when that point has passed; `None` without an expiry
    /// or a refresh token.
    pub fn refresh_due_in(&self, now: Timestamp, margin: Duration) -> Option<Duration> {
        self.refresh_token.as_ref()?;
        let expires_at = self.expires_at?;
        let margin_ms = i64::try_from(margin.as_millis()).unwrap_or(i64::MAX);
        let due_ms = expires_at
            .as_unix_millis()
            .saturating_sub(margin_ms)
            .saturating_sub(now.as_unix_millis());
        Some(Duration::from_millis(due_ms.max(0) as u64))
    }

    /// True when an expiry is known and has passed.
    pub fn is_expired(&self, now: Timestamp) -> bool {
        self.expires_at.map(|at| !now.is_before(&at)).unwrap_or(false)
    }
}

impl PartialEq for AuthSession {
    fn eq(&self, other: &Self) -> bool {
        self.user_id == other.user_id
            && self.access_token.expose_secret() == other.access_token.expose_secret()
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthSession")
            .field("user_id", &self.user_id)
            .field("access_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Email/password credentials.
#[derive(Clone)]
pub struct Credentials {
    pub email: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: SecretString::new(password.into()),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Session management.
///
/// # Contract
///
/// - `sign_in`/`sign_up` publish the new session on the watch channel
/// - `sign_out` publishes `None`, even if the remote call fails
/// - `refresh_session` publishes the re-issued session for the same user
/// - wrong credentials and rejected refresh tokens map to
///   `ErrorCode::Unauthorized`
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, DomainError>;

    /// Registers a new account. Returns `None` when the backend requires
    /// email confirmation before issuing a session.
    async fn sign_up(&self, credentials: &Credentials) -> Result<Option<AuthSession>, DomainError>;

    async fn sign_out(&self) -> Result<(), DomainError>;

    /// Exchanges the current refresh token for a new access token.
    async fn refresh_session(&self) -> Result<AuthSession, DomainError>;

    fn current_session(&self) -> Option<AuthSession>;

    /// Receiver that observes every session change.
    fn watch(&self) -> watch::Receiver<Option<AuthSession>>;

    fn current_user(&self) -> Option<UserId> {
        self.current_session().map(|s| s.user_id)
    }
}
