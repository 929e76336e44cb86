//! Hosted backend adapters.
//!
//! One [`SupabaseClient`] is shared by every table adapter so that the
//! bearer token set by [`SupabaseAuth`] applies to all of them.
//!
//! - `auth` - Email/password sessions
//! - `items`, `swaps`, `wishlist`, `notifications`, `profiles` - Table API
//! - `storage` - Avatar uploads
//! - `realtime` - Row change feed over websocket

mod auth;
mod client;
mod items;
mod notifications;
mod profiles;
mod query;
mod realtime;
mod storage;
mod swaps;
mod wishlist;

use std::sync::Arc;

pub use auth::SupabaseAuth;
pub use client::{SupabaseClient, SupabaseConfig};
pub use items::SupabaseItems;
pub use notifications::SupabaseNotifications;
pub use profiles::SupabaseProfiles;
pub use query::Query;
pub use realtime::{RealtimeSettings, SupabaseRealtime};
pub use storage::SupabaseStorage;
pub use swaps::SupabaseSwaps;
pub use wishlist::SupabaseWishlist;

use crate::adapters::InProcessEventBus;
use crate::application::{Services, SyncSettings};
use crate::domain::foundation::DomainError;
use crate::ports::{ConfirmationPrompt, PushTokenProvider};

/// Builds the full port bundle against the hosted backend.
///
/// Confirmation prompts and push tokens belong to the host shell and are
/// passed in.
pub fn connect(
    config: SupabaseConfig,
    realtime: RealtimeSettings,
    settings: SyncSettings,
    confirm: Arc<dyn ConfirmationPrompt>,
    push: Arc<dyn PushTokenProvider>,
) -> Result<Services, DomainError> {
    let transport = SupabaseRealtime::new(&config).with_settings(realtime);
    let client = SupabaseClient::new(config)?;
    let bus = Arc::new(InProcessEventBus::new());

    Ok(Services {
        auth: Arc::new(SupabaseAuth::new(client.clone())),
        items: Arc::new(SupabaseItems::new(client.clone())),
        swaps: Arc::new(SupabaseSwaps::new(client.clone())),
        wishlist: Arc::new(SupabaseWishlist::new(client.clone())),
        notifications: Arc::new(SupabaseNotifications::new(client.clone())),
        profiles: Arc::new(SupabaseProfiles::new(client.clone())),
        storage: Arc::new(SupabaseStorage::new(client)),
        realtime: Arc::new(transport),
        confirm,
        push,
        publisher: bus.clone(),
        subscriber: bus,
        settings,
    })
}
