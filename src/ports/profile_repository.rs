//! ProfileRepository port.

use async_trait::async_trait;

use crate::domain::{
    foundation::{DomainError, UserId},
    profile::{Profile, ProfileStats, ProfileUpdate},
};

#[async_trait]
pub trait ProfileRepository: Send + Sync {
    async fn find(&self, user: &UserId) -> Result<Option<Profile>, DomainError>;

    /// Applies a partial update to the user's own row, creating it if the
    /// sign-up trigger has not yet done so.
    async fn update(&self, user: &UserId, update: &ProfileUpdate) -> Result<Profile, DomainError>;

    async fn stats(&self, user: &UserId) -> Result<ProfileStats, DomainError>;
}
