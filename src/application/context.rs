//! Application context - the long-lived pieces every screen shares.
//!
//! Owns the realtime bridge task, the token refresher and the
//! notification center, all of which live for the whole app session. Views are created on demand and
//! dropped with their screen.

use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::domain::foundation::SwapId;

use super::sync::{LifecycleSignal, RealtimeBridge, RealtimeBridgeConfig, SessionRefresher};
use super::views::{
    BrowseView, MyItemsView, NotificationCenter, ProfileView, SwapDetailView, SwapInboxView,
    WishlistView,
};
use super::Services;

pub struct AppContext {
    services: Services,
    lifecycle: LifecycleSignal,
    notifications: Arc<NotificationCenter>,
    shutdown: watch::Sender<bool>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AppContext {
    pub fn new(services: Services) -> Self {
        let notifications = NotificationCenter::new(services.clone());
        let (shutdown, _) = watch::channel(false);
        Self {
            services,
            lifecycle: LifecycleSignal::default(),
            notifications,
            shutdown,
            tasks: Mutex::new(Vec::new()),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Foreground/background signal; the host shell drives it.
    pub fn lifecycle(&self) -> &LifecycleSignal {
        &self.lifecycle
    }

    pub fn notifications(&self) -> Arc<NotificationCenter> {
        self.notifications.clone()
    }

    /// Spawns the realtime bridge, the token refresher and the
    /// notification center.
    ///
    /// Must be called from within a tokio runtime. Calling it twice is a
    /// no-op.
    pub fn start(&self) {
        let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
        if !tasks.is_empty() {
            return;
        }

        let settings = &self.services.settings;
        let bridge = RealtimeBridge::new(
            self.services.realtime.clone(),
            self.services.publisher.clone(),
            RealtimeBridgeConfig::default()
                .with_reconnect_delay(settings.reconnect_delay)
                .with_verbose(settings.verbose_realtime),
        );
        let auth = self.services.auth.watch();
        let lifecycle = self.lifecycle.subscribe();
        let shutdown = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = bridge.run(auth, lifecycle, shutdown).await {
                error!(error = %e, "realtime bridge failed");
            }
        }));

        let refresher = SessionRefresher::new(
            self.services.auth.clone(),
            settings.token_refresh_margin,
            settings.token_refresh_retry,
        );
        let shutdown = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = refresher.run(shutdown).await {
                error!(error = %e, "token refresher failed");
            }
        }));

        let center = self.notifications.clone();
        let auth = self.services.auth.watch();
        let lifecycle = self.lifecycle.subscribe();
        let shutdown = self.shutdown.subscribe();
        tasks.push(tokio::spawn(async move {
            if let Err(e) = center.run(auth, lifecycle, shutdown).await {
                error!(error = %e, "notification center failed");
            }
        }));

        info!("sync started");
    }

    /// Signals the background tasks to stop and waits for them.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(|e| e.into_inner());
            tasks.drain(..).collect()
        };
        for task in tasks {
            if let Err(e) = task.await {
                error!(error = %e, "sync task ended abnormally");
            }
        }
        info!("sync stopped");
    }

    pub fn browse(&self) -> Arc<BrowseView> {
        BrowseView::new(self.services.clone())
    }

    pub fn my_items(&self) -> Arc<MyItemsView> {
        MyItemsView::new(self.services.clone())
    }

    pub fn wishlist(&self) -> Arc<WishlistView> {
        WishlistView::new(self.services.clone())
    }

    pub fn swap_inbox(&self) -> Arc<SwapInboxView> {
        SwapInboxView::new(self.services.clone())
    }

    pub fn swap_detail(&self, id: SwapId) -> Arc<SwapDetailView> {
        SwapDetailView::new(self.services.clone(), id)
    }

    pub fn profile(&self) -> Arc<ProfileView> {
        ProfileView::new(self.services.clone())
    }
}
