//! Access token refresh.
//!
//! Tokens are re-issued a margin ahead of their expiry. The provider
//! publishes the new session on its watch channel, so the realtime bridge
//! re-authenticates and table requests pick up the new bearer without any
//! extra wiring.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp};
use crate::ports::{AuthProvider, AuthSession};

/// Keeps the signed-in session's access token fresh.
pub struct SessionRefresher {
    auth: Arc<dyn AuthProvider>,
    /// How long before expiry the refresh runs.
    margin: Duration,
    /// Wait before retrying a refresh that failed for a transient reason.
    retry: Duration,
}

impl SessionRefresher {
    pub fn new(auth: Arc<dyn AuthProvider>, margin: Duration, retry: Duration) -> Self {
        Self {
            auth,
            margin,
            retry,
        }
    }

    /// Runs until `shutdown` flips to true or its sender goes away.
    ///
    /// A refresh token the backend rejects ends the session.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<(), DomainError> {
        let mut sessions = self.auth.watch();
        let mut due = self.due(sessions.borrow_and_update().as_ref());

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                changed = sessions.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    due = self.due(sessions.borrow_and_update().as_ref());
                }
                _ = sleep_until(due.unwrap_or_else(Instant::now)), if due.is_some() => {
                    due = None;
                    match self.auth.refresh_session().await {
                        // The re-issued session arrives through the watch
                        Ok(session) => info!(user = %session.user_id, "access token refreshed"),
                        Err(e) if e.code == ErrorCode::Unauthorized => {
                            warn!(error = %e, "refresh token rejected, signing out");
                            if let Err(e) = self.auth.sign_out().await {
                                debug!(error = %e, "sign-out after rejected refresh failed");
                            }
                        }
                        Err(e) => {
                            warn!(
                                error = %e,
                                retry_in_secs = self.retry.as_secs(),
                                "token refresh failed"
                            );
                            due = Some(Instant::now() + self.retry);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn due(&self, session: Option<&AuthSession>) -> Option<Instant> {
        let wait = session?.refresh_due_in(Timestamp::now(), self.margin)?;
        debug!(in_secs = wait.as_secs(), "token refresh scheduled");
        Some(Instant::now() + wait)
    }
}
