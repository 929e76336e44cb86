//! NotificationRepository port.

use async_trait::async_trait;

use crate::domain::{
    foundation::{DomainError, NotificationId, UserId},
    notification::Notification,
};

#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Latest `limit` notifications for `user`, newest first.
    async fn recent(&self, user: &UserId, limit: usize) -> Result<Vec<Notification>, DomainError>;

    async fn mark_read(&self, id: NotificationId) -> Result<(), DomainError>;

    /// Marks every unread notification of `user` as read.
    async fn mark_all_read(&self, user: &UserId) -> Result<(), DomainError>;
}
