//! Email/password auth against the hosted auth service.
//!
//! The session lives in a watch channel; every change is mirrored into the
//! shared client so table requests run as the signed-in user.

use async_trait::async_trait;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::{AuthProvider, AuthSession, Credentials};

use super::client::SupabaseClient;

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

/// Token grant body. Sign-up returns only the user (and no token) when
/// email confirmation is required.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    user: Option<AuthUser>,
}

impl TokenResponse {
    fn into_session(self, now: Timestamp) -> Result<Option<AuthSession>, DomainError> {
        let (Some(token), Some(user)) = (self.access_token, self.user) else {
            return Ok(None);
        };
        let mut session = AuthSession::new(UserId::new(user.id)?, token);
        session.refresh_token = self.refresh_token.map(SecretString::new);
        session.expires_at = self.expires_in.map(|secs| now.plus_secs(secs));
        Ok(Some(session))
    }
}

pub struct SupabaseAuth {
    client: SupabaseClient,
    session: watch::Sender<Option<AuthSession>>,
}

impl SupabaseAuth {
    pub fn new(client: SupabaseClient) -> Self {
        let (session, _) = watch::channel(None);
        Self { client, session }
    }

    fn publish(&self, session: Option<AuthSession>) {
        self.client
            .set_access_token(session.as_ref().map(|s| s.access_token()));
        self.session.send_replace(session);
    }

    async fn grant(
        &self,
        path: &str,
        credentials: &Credentials,
    ) -> Result<TokenResponse, DomainError> {
        let request = self.client.request(Method::POST, path).json(&json!({
            "email": credentials.email.trim(),
            "password": credentials.password.expose_secret(),
        }));
        self.client.send_json(request).await
    }
}

/// The token endpoint answers bad credentials and stale refresh tokens
/// with a 400.
fn rejected_grant(e: DomainError) -> DomainError {
    match e.code {
        ErrorCode::BackendError | ErrorCode::ValidationFailed => {
            DomainError::new(ErrorCode::Unauthorized, e.message)
        }
        _ => e,
    }
}

#[async_trait]
impl AuthProvider for SupabaseAuth {
    async fn sign_in(&self, credentials: &Credentials) -> Result<AuthSession, DomainError> {
        let response = self
            .grant("auth/v1/token?grant_type=password", credentials)
            .await
            .map_err(rejected_grant)?;
        let session = response
            .into_session(Timestamp::now())?
            .ok_or_else(|| DomainError::new(ErrorCode::Unauthorized, "no session issued"))?;

        info!(user = %session.user_id, "signed in");
        self.publish(Some(session.clone()));
        Ok(session)
    }

    async fn sign_up(&self, credentials: &Credentials) -> Result<Option<AuthSession>, DomainError> {
        let email = credentials.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(DomainError::validation("email", "a valid email is required"));
        }
        let response = self.grant("auth/v1/signup", credentials).await?;
        let session = response.into_session(Timestamp::now())?;
        match &session {
            Some(s) => {
                info!(user = %s.user_id, "signed up");
                self.publish(session.clone());
            }
            None => info!("signed up, awaiting email confirmation"),
        }
        Ok(session)
    }

    async fn sign_out(&self) -> Result<(), DomainError> {
        let result = if self.session.borrow().is_some() {
            let request = self.client.request(Method::POST, "auth/v1/logout");
            self.client.send_empty(request).await
        } else {
            Ok(())
        };
        if let Err(e) = &result {
            warn!(error = %e, "remote sign-out failed, clearing local session anyway");
        }
        self.publish(None);
        info!("signed out");
        result
    }

    async fn refresh_session(&self) -> Result<AuthSession, DomainError> {
        let refresh_token = self
            .session
            .borrow()
            .as_ref()
            .and_then(|s| s.refresh_token.clone())
            .ok_or_else(|| DomainError::new(ErrorCode::Unauthorized, "no refresh token"))?;

        let request = self
            .client
            .anon_request(Method::POST, "auth/v1/token?grant_type=refresh_token")
            .json(&json!({ "refresh_token": refresh_token.expose_secret() }));
        let response: TokenResponse = self
            .client
            .send_json(request)
            .await
            .map_err(rejected_grant)?;
        let session = response
            .into_session(Timestamp::now())?
            .ok_or_else(|| DomainError::new(ErrorCode::Unauthorized, "no session issued"))?;

        debug!(user = %session.user_id, "session refreshed");
        self.publish(Some(session.clone()));
        Ok(session)
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

    #[test]
    fn token_response_builds_session() {
        let response: TokenResponse = serde_json::from_value(json!({
            "access_token": "at",
            "refresh_token": "rt",
            "expires_in": 3600,
            "user": { "id": "u-1" }
        }))
        .unwrap();
        let now = Timestamp::from_unix_millis(1_000);
        let session = response.into_session(now).unwrap().unwrap();

        assert_eq!(session.user_id.as_str(), "u-1");
        assert_eq!(session.access_token(), "at");
        assert_eq!(session.expires_at, Some(now.plus_secs(3600)));
    }

    #[test]
    fn rejected_refresh_is_unauthorized() {
        let err = rejected_grant(DomainError::new(ErrorCode::BackendError, "invalid_grant"));
        assert_eq!(err.code, ErrorCode::Unauthorized);

        let err = rejected_grant(DomainError::new(ErrorCode::RealtimeError, "x"));
        assert_eq!(err.code, ErrorCode::RealtimeError);
    }

    #[test]
    fn confirmation_pending_signup_has_no_session() {
        let response: TokenResponse =
            serde_json::from_value(json!({ "id": "u-1", "email": "a@b.c" })).unwrap();
        assert!(response.into_session(Timestamp::now()).unwrap().is_none());
    }
}
