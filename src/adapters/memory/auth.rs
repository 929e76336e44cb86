//! In-memory auth provider with registered accounts and a session watch.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{AuthProvider, AuthSession, Credentials};

struct Account {
    user_id: UserId,
    password: String,
}

pub struct InMemoryAuth {
    accounts: Mutex<HashMap<String, Account>>,
    session: watch::Sender<Option<AuthSession>>,
    /// When set, sign-up leaves the user signed out (email confirmation).
    confirm_email: bool,
    /// Lifetime of issued access tokens; `None` never expires.
    token_ttl: Option<Duration>,
    refreshes: AtomicUsize,
    refresh_revoked: AtomicBool,
}

impl Default for InMemoryAuth {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryAuth {
    pub fn new() -> Self {
        let (session, _) = watch::channel(None);
        Self {
            accounts: Mutex::new(HashMap::new()),
            session,
            confirm_email: false,
            token_ttl: None,
            refreshes: AtomicUsize::new(0),
            refresh_revoked: AtomicBool::new(false),
        }
    }

    /// Issued sessions expire after `ttl`.
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = Some(ttl);
        self
    }

    /// Makes every later refresh fail as unauthorized.
    pub fn revoke_refresh_tokens(&self) {
        self.refresh_revoked.store(true, Ordering::SeqCst);
    }

    /// How many sessions were re-issued by `refresh_session`.
    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn requiring_email_confirmation() -> Self {
        Self {
            confirm_email: true,
            ..Self::new()
        }
    }

    /// Registers an account without signing in.
    pub fn register(&self, email: &str, password: &str, user_id: UserId) {
        self.accounts.lock().unwrap_or_else(|e| e.into_inner()).insert(
            email.to_lowercase(),
            Account {
                user_id,
                password: password.to_string(),
            },
        );
    }

    /// Replaces the current session, e.g. to simulate a token refresh or
    /// an account switch.
    pub fn set_session(&self, session: Option<AuthSession>) {
        self.session.send_replace(session);
    }

    /// Signs in as `user` with a fresh token.
    pub fn sign_in_as(&self, user: &UserId) -> AuthSession {
        let session = self.issue(user);
        self.set_session(Some(session.clone()));
        session
    }

    fn issue(&self, user: &UserId) -> AuthSession {
        let mut session =
            AuthSession::new(user.clone(), format!("token-{}", Uuid::new_v4().simple()));
        session.refresh_token = Some(SecretString::new(format!(
            "refresh-{}",
            Uuid::new_v4().simple()
        )));
        session.expires_at = self
            .token_ttl
            .map(|ttl| Timestamp::now().plus_secs(ttl.as_secs() as i64));
        session
    }
}

#[async_trait]
impl AuthProvider for InMemoryAuth {
    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, DomainError> {
        let user = {
            let accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
            accounts
                .get(&credentials.email.to_lowercase())
                .filter(|a| a.password == credentials.password.expose_secret().as_str())
                .map(|a| a.user_id.clone())
        };
        let user = user.ok_or_else(|| {
            DomainError::new(ErrorCode::Unauthorized, "Invalid login credentials")
        })?;

        info!(user = %user, "signed in");
        Ok(self.sign_in_as(&user))
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Option<AuthSession>, DomainError> {
        let email = credentials.email.trim().to_lowercase();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("email", "a valid email is required"));
        }
        let user = {
            let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
            if accounts.contains_key(&email) {
                return Err(DomainError::new(ErrorCode::Conflict, "User already registered"));
            }
            let user = UserId::new(Uuid::new_v4().to_string())?;
            accounts.insert(
                email,
                Account {
                    user_id: user.clone(),
                    password: credentials.password.expose_secret().clone(),
                },
            );
            user
        };

        if self.confirm_email {
            return Ok(None);
        }
        Ok(Some(self.sign_in_as(&user)))
    }

    async fn sign_out(&self) -> Result<(), DomainError> {
        self.set_session(None);
        Ok(())
    }

    async fn refresh_session(&self) -> Result<AuthSession, DomainError> {
        let user = self
            .current_session()
            .filter(|s| s.refresh_token.is_some())
            .map(|s| s.user_id)
            .ok_or_else(|| DomainError::new(ErrorCode::Unauthorized, "no refresh token"))?;
        if self.refresh_revoked.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::Unauthorized,
                "Invalid Refresh Token",
            ));
        }
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        Ok(self.sign_in_as(&user))
    }

    fn current_session(&self) -> Option<AuthSession> {
        self.session.borrow().clone()
    }

    fn watch(&self) -> watch::Receiver<Option<AuthSession>> {
        self.session.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sign_in_checks_password_and_publishes_session() {
        let auth = InMemoryAuth::new();
        let alice = UserId::new("alice").unwrap();
        auth.register("Alice@example.com", "secret", alice.clone());
        let mut watch = auth.watch();

        assert!(auth
            .sign_in(&Credentials::new("alice@example.com", "wrong"))
            .await
            .is_err());
        auth.sign_in(&Credentials::new("alice@example.com", "secret"))
            .await
            .unwrap();

        assert!(watch.has_changed().unwrap());
        assert_eq!(
            watch.borrow_and_update().as_ref().map(|s| s.user_id.clone()),
            Some(alice.clone())
        );
        assert_eq!(auth.current_user(), Some(alice));

        auth.sign_out().await.unwrap();
        assert!(auth.current_session().is_none());
    }

    #[tokio::test]
    async fn refresh_reissues_the_session_for_the_same_user() {
        let auth = InMemoryAuth::new().with_token_ttl(Duration::from_secs(3600));
        assert!(auth.refresh_session().await.is_err());

        let alice = UserId::new("alice").unwrap();
        let first = auth.sign_in_as(&alice);
        assert!(first.expires_at.is_some());
        let mut watch = auth.watch();

        let second = auth.refresh_session().await.unwrap();
        assert_eq!(second.user_id, alice);
        assert_ne!(second.access_token(), first.access_token());
        assert!(watch.has_changed().unwrap());
        assert_eq!(auth.refresh_count(), 1);

        auth.revoke_refresh_tokens();
        let err = auth.refresh_session().await.unwrap_err();
        assert_eq!(err.code, ErrorCode::Unauthorized);
        assert_eq!(auth.current_session(), Some(second));
    }

    #[tokio::test]
    async fn sign_up_may_require_confirmation() {
        let auth = InMemoryAuth::requiring_email_confirmation();
        let session = auth
            .sign_up(&Credentials::new("new@example.com", "pw"))
            .await
            .unwrap();

        assert!(session.is_none());
        assert!(auth
            .sign_up(&Credentials::new("new@example.com", "pw"))
            .await
            .is_err());
    }
}
