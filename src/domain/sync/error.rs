//! User-facing error taxonomy for remote calls made by views.

use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode};

/// Outcome classes a view surfaces to the user.
///
/// Every remote failure is caught at the call site and mapped into one of
/// these; none propagate to a global handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No signed-in user; the shell should redirect to sign-in.
    #[error("Sign in to continue")]
    AuthRequired,

    /// A guarded write matched zero rows because someone else got there first.
    #[error("{}", conflict_message(.resource, .current_state.as_deref()))]
    Conflict {
        resource: String,
        /// Authoritative state observed after re-fetching, when known.
        current_state: Option<String>,
    },

    /// The entity was deleted or delisted since it was rendered.
    #[error("{0} is no longer available")]
    NotFound(String),

    /// The signed-in user may not perform this action.
    #[error("Not allowed: {0}")]
    Forbidden(String),

    /// The entity is not in a state that allows this action.
    #[error("Action not possible: {0}")]
    InvalidTransition(String),

    /// Network or backend failure; safe to retry.
    #[error("Something went wrong, please try again ({0})")]
    Transient(String),
}

/// Listing states are changed by the owner, possibly from another device;
/// every other state belongs to a two-party resource.
fn conflict_message(resource: &str, current_state: Option<&str>) -> String {
    match current_state {
        Some(state @ ("listed" | "delisted" | "removed")) => {
            format!("{} was already {} in another session", resource, state)
        }
        _ => format!("{} was already resolved by the other party", resource),
    }
}

impl SyncError {
    pub fn conflict(resource: impl Into<String>, current_state: Option<String>) -> Self {
        SyncError::Conflict {
            resource: resource.into(),
            current_state,
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        SyncError::NotFound(resource.into())
    }

    pub fn transient(message: impl Into<String>) -> Self {
        SyncError::Transient(message.into())
    }

    /// Whether retrying the same call could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Transient(_))
    }

    /// Short title for a toast or alert.
    pub fn title(&self) -> &'static str {
        match self {
            SyncError::AuthRequired => "Sign in required",
            SyncError::Conflict { .. } => "Already resolved",
            SyncError::NotFound(_) => "Item unavailable",
            SyncError::Forbidden(_) => "Not allowed",
            SyncError::InvalidTransition(_) => "Not possible",
            SyncError::Transient(_) => "Something went wrong",
        }
    }
}

impl From<DomainError> for SyncError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::Unauthorized => SyncError::AuthRequired,
            ErrorCode::Forbidden => SyncError::Forbidden(err.message),
            ErrorCode::Conflict => SyncError::conflict(err.message, None),
            ErrorCode::InvalidStateTransition | ErrorCode::ValidationFailed => {
                SyncError::InvalidTransition(err.message)
            }
            code if code.is_not_found() => SyncError::NotFound(err.message),
            _ => SyncError::Transient(err.to_string()),
        }
    }
}
