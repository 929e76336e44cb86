//! Port bundle and tunables shared by every view.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::foundation::UserId;
use crate::domain::sync::{ChangeTopic, SyncError};
use crate::ports::{
    AuthProvider, ChangePublisher, ChangeSubscriber, ConfirmRequest, ConfirmationPrompt,
    ItemRepository, NotificationRepository, ObjectStorage, ProfileRepository, PushTokenProvider,
    RealtimeTransport, SwapRepository, WishlistRepository,
};

/// Timing and sizing knobs for the sync layer.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Quiet period before a view re-fetches after a change topic.
    pub debounce: Duration,
    /// Page size of the browse query.
    pub browse_limit: usize,
    /// Size of the notification feed.
    pub notification_limit: usize,
    /// Delay of the second refresh after `notifications:changed`.
    pub notification_recheck: Duration,
    pub poll_initial_delay: Duration,
    pub poll_interval: Duration,
    pub polling_enabled: bool,
    pub reconnect_delay: Duration,
    pub verbose_realtime: bool,
    pub avatar_bucket: String,
    /// How long before expiry the access token is refreshed.
    pub token_refresh_margin: Duration,
    pub token_refresh_retry: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(200),
            browse_limit: 100,
            notification_limit: 50,
            notification_recheck: Duration::from_millis(900),
            poll_initial_delay: Duration::from_secs(8),
            poll_interval: Duration::from_secs(20),
            polling_enabled: true,
            reconnect_delay: Duration::from_millis(800),
            verbose_realtime: false,
            avatar_bucket: "user-photos".to_string(),
            token_refresh_margin: Duration::from_secs(60),
            token_refresh_retry: Duration::from_secs(10),
        }
    }
}

/// Every port a view may need, shared by `Arc`.
#[derive(Clone)]
pub struct Services {
    pub auth: Arc<dyn AuthProvider>,
    pub items: Arc<dyn ItemRepository>,
    pub swaps: Arc<dyn SwapRepository>,
    pub wishlist: Arc<dyn WishlistRepository>,
    pub notifications: Arc<dyn NotificationRepository>,
    pub profiles: Arc<dyn ProfileRepository>,
    pub storage: Arc<dyn ObjectStorage>,
    pub realtime: Arc<dyn RealtimeTransport>,
    pub confirm: Arc<dyn ConfirmationPrompt>,
    pub push: Arc<dyn PushTokenProvider>,
    pub publisher: Arc<dyn ChangePublisher>,
    pub subscriber: Arc<dyn ChangeSubscriber>,
    pub settings: SyncSettings,
}

impl Services {
    /// The signed-in user, or `AuthRequired`.
    pub fn require_user(&self) -> Result<UserId, SyncError> {
        self.auth.current_user().ok_or(SyncError::AuthRequired)
    }

    pub fn emit(&self, topic: ChangeTopic) {
        self.publisher.emit(topic);
    }

    pub async fn confirm(&self, request: ConfirmRequest) -> bool {
        self.confirm.confirm(request).await
    }
}
