//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps, error types and the lifecycle traits
//! that the marketplace entities build on.

mod errors;
mod ids;
mod ownership;
mod state_machine;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{ItemId, NotificationId, SwapId, UserId, WishlistEntryId};
pub use ownership::OwnedByUser;
pub use state_machine::StateMachine;
pub use timestamp::Timestamp;
