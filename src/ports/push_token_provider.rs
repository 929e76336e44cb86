//! Push token port - device registration for push notifications.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;

#[async_trait]
pub trait PushTokenProvider: Send + Sync {
    /// Prompts for notification permission if needed. Returns whether it
    /// is granted.
    async fn request_permission(&self) -> Result<bool, DomainError>;

    /// Token identifying this device to the push service.
    async fn device_token(&self) -> Result<String, DomainError>;
}
