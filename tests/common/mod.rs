//! Shared fixtures for the integration tests.
//!
//! Every harness wires the in-memory adapters into a [`Services`] bundle.
//! Two harnesses built with [`Harness::sharing`] see the same tables and
//! change feed but have their own session and bus, like two devices.

#![allow(dead_code)]

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use swapsync::adapters::headless::StaticPushTokens;
use swapsync::adapters::memory::{
    InMemoryAuth, InMemoryBackend, InMemoryRealtime, InMemoryStorage, ScriptedConfirm,
};
use swapsync::adapters::InProcessEventBus;
use swapsync::application::{AppContext, Services, SyncSettings};
use swapsync::domain::foundation::{ItemId, NotificationId, SwapId, Timestamp, UserId};
use swapsync::domain::item::Item;
use swapsync::domain::notification::{Notification, NotificationType};
use swapsync::domain::swap::{Swap, SwapStatus};

pub struct Harness {
    pub backend: Arc<InMemoryBackend>,
    pub realtime: Arc<InMemoryRealtime>,
    pub auth: Arc<InMemoryAuth>,
    pub storage: Arc<InMemoryStorage>,
    pub confirm: Arc<ScriptedConfirm>,
    pub bus: Arc<InProcessEventBus>,
    pub services: Services,
}

impl Harness {
    /// Fresh tables; every confirmation is accepted.
    pub fn new() -> Self {
        let realtime = Arc::new(InMemoryRealtime::new());
        let backend = Arc::new(InMemoryBackend::with_realtime(realtime.clone()));
        Self::build(
            backend,
            realtime,
            ScriptedConfirm::new(Vec::new(), true),
            SyncSettings::default(),
        )
    }

    /// Fresh tables; confirmations answer `answers` in order, then `true`.
    pub fn with_answers(answers: impl IntoIterator<Item = bool>) -> Self {
        let realtime = Arc::new(InMemoryRealtime::new());
        let backend = Arc::new(InMemoryBackend::with_realtime(realtime.clone()));
        Self::build(
            backend,
            realtime,
            ScriptedConfirm::new(answers, true),
            SyncSettings::default(),
        )
    }

    /// A second device on the same backend and change feed.
    pub fn sharing(other: &Harness) -> Self {
        Self::build(
            other.backend.clone(),
            other.realtime.clone(),
            ScriptedConfirm::new(Vec::new(), true),
            SyncSettings::default(),
        )
    }

    fn build(
        backend: Arc<InMemoryBackend>,
        realtime: Arc<InMemoryRealtime>,
        confirm: ScriptedConfirm,
        settings: SyncSettings,
    ) -> Self {
        let auth = Arc::new(InMemoryAuth::new());
        let storage = Arc::new(InMemoryStorage::new("https://storage.test"));
        let confirm = Arc::new(confirm);
        let bus = Arc::new(InProcessEventBus::new());

        let services = Services {
            auth: auth.clone(),
            items: backend.clone(),
            swaps: backend.clone(),
            wishlist: backend.clone(),
            notifications: backend.clone(),
            profiles: backend.clone(),
            storage: storage.clone(),
            realtime: realtime.clone(),
            confirm: confirm.clone(),
            push: Arc::new(StaticPushTokens::granted("push-token-1")),
            publisher: bus.clone(),
            subscriber: bus.clone(),
            settings,
        };

        Self {
            backend,
            realtime,
            auth,
            storage,
            confirm,
            bus,
            services,
        }
    }

    pub fn context(&self) -> AppContext {
        AppContext::new(self.services.clone())
    }

    pub fn sign_in(&self, user: &UserId) {
        self.auth.sign_in_as(user);
    }

    pub fn sign_out(&self) {
        self.auth.set_session(None);
    }
}

pub fn user(name: &str) -> UserId {
    UserId::new(name).unwrap()
}

/// A listed item seeded directly into the tables.
pub fn listed_item(owner: &UserId, title: &str) -> Item {
    Item {
        id: ItemId::new(),
        owner_id: owner.clone(),
        title: title.to_string(),
        description: None,
        image_url: None,
        trade_for: None,
        created_at: Timestamp::now(),
        archived_at: None,
    }
}

/// A pending swap on `requested`, sent by `sender` to the item's owner.
pub fn pending_swap(sender: &UserId, requested: &Item) -> Swap {
    Swap {
        id: SwapId::new(),
        sender_id: sender.clone(),
        receiver_id: requested.owner_id.clone(),
        requested_item_id: requested.id,
        offered_item_id: None,
        message: None,
        status: SwapStatus::Pending,
        created_at: Timestamp::now(),
    }
}

pub fn unread(user: &UserId, kind: NotificationType, swap: SwapId) -> Notification {
    Notification {
        id: NotificationId::new(),
        user_id: user.clone(),
        kind,
        payload: json!({ "swap_id": swap.to_string() }),
        is_read: false,
        created_at: Timestamp::now(),
    }
}

/// Lets spawned tasks run without reaching any debounce deadline.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}
