//! Optimistic mutation with rollback.

use std::fmt::Display;
use std::future::Future;
use tracing::warn;

/// Applies a local change, performs the remote write, and undoes the local
/// change if the write fails.
///
/// `apply` mutates local state and returns a snapshot of whatever it
/// replaced; `revert` receives that snapshot back on failure. The remote
/// error is returned unchanged.
pub async fn perform_optimistic_update<S, T, E, Fut>(
    apply: impl FnOnce() -> S,
    remote: impl FnOnce() -> Fut,
    revert: impl FnOnce(S),
) -> Result<T, E>
where
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let snapshot = apply();
    match remote().await {
        Ok(value) => Ok(value),
        Err(e) => {
            warn!(error = %e, "remote write failed, rolling back local change");
            revert(snapshot);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::sync::SyncError;
    use std::sync::{Arc, Mutex};

    #[tokio::test]
    async fn success_keeps_local_change() {
        let state = Arc::new(Mutex::new(1));
        let s = state.clone();

        let result: Result<&str, SyncError> = perform_optimistic_update(
            || std::mem::replace(&mut *state.lock().unwrap(), 2),
            || async { Ok("done") },
            move |prev| *s.lock().unwrap() = prev,
        )
        .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(*state.lock().unwrap(), 2);
    }

    #[tokio::test]
    async fn failure_restores_snapshot_and_returns_error() {
        let state = Arc::new(Mutex::new(vec!["a", "b"]));
        let s = state.clone();

        let result: Result<(), SyncError> = perform_optimistic_update(
            || {
                let mut items = state.lock().unwrap();
                let before = items.clone();
                items.retain(|i| *i != "a");
                before
            },
            || async { Err(SyncError::transient("offline")) },
            move |before| *s.lock().unwrap() = before,
        )
        .await;

        assert_eq!(result, Err(SyncError::transient("offline")));
        assert_eq!(*state.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn remote_sees_applied_state() {
        let state = Arc::new(Mutex::new(false));
        let observed = state.clone();

        let result: Result<bool, SyncError> = perform_optimistic_update(
            || std::mem::replace(&mut *state.lock().unwrap(), true),
            || async move {
                let seen = *observed.lock().unwrap();
                Ok(seen)
            },
            |_| {},
        )
        .await;

        assert_eq!(result, Ok(true));
    }
}
