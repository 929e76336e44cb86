//! Notification center: the app-lifetime notification feed.
//!
//! Rows reach the feed four ways, all through the same merge:
//! - an explicit or bus-triggered refresh (plus one delayed re-check)
//! - a dedicated realtime channel filtered to the user's rows
//! - a coarse reconciliation poll while the app is in the foreground
//! - optimistic read-state changes made locally

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::application::sync::{
    perform_optimistic_update, supervise, AppLifecycle, ChannelGuard, Debouncer, SupervisorConfig,
};
use crate::domain::foundation::{DomainError, NotificationId, SwapId, UserId};
use crate::domain::notification::{describe, Notification, NotificationFeed, NotificationText, SwapMeta};
use crate::domain::sync::{ChangeTopic, SyncError};
use crate::ports::{AuthSession, ChangeKind, ChangeSubscription, RowChange, Subscription, Table};

use super::Services;

/// A notification with its rendered text.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationEntry {
    pub notification: Notification,
    pub text: NotificationText,
}

struct CenterState {
    feed: NotificationFeed,
    meta: HashMap<SwapId, SwapMeta>,
    hide_read: bool,
}

pub struct NotificationCenter {
    services: Services,
    state: Mutex<CenterState>,
    recheck: Arc<Debouncer>,
    _bus: Subscription,
}

/// Name of the dedicated notification channel.
pub fn notification_channel_name(user: &UserId) -> String {
    format!("rt:notifications:{}", user)
}

impl NotificationCenter {
    pub fn new(services: Services) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<NotificationCenter>| {
            let for_recheck = weak.clone();
            let recheck = Arc::new(Debouncer::new(
                "notification_recheck",
                services.settings.notification_recheck,
                move || {
                    let center = for_recheck.upgrade();
                    async move {
                        if let Some(center) = center {
                            center.refresh_logged().await;
                        }
                    }
                },
            ));

            let for_bus = weak.clone();
            let bus_recheck = Arc::downgrade(&recheck);
            let subscription = services.subscriber.on(
                ChangeTopic::NotificationsChanged,
                Arc::new(move || {
                    let Ok(runtime) = Handle::try_current() else {
                        return;
                    };
                    if let Some(center) = for_bus.upgrade() {
                        runtime.spawn(async move { center.refresh_logged().await });
                    }
                    if let Some(recheck) = bus_recheck.upgrade() {
                        recheck.schedule();
                    }
                }),
            );

            let limit = services.settings.notification_limit;
            Self {
                services,
                state: Mutex::new(CenterState {
                    feed: NotificationFeed::new(limit),
                    meta: HashMap::new(),
                    hide_read: false,
                }),
                recheck,
                _bus: subscription,
            }
        })
    }

    fn state(&self) -> MutexGuard<'_, CenterState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fetches the latest notifications and merges them into the feed.
    ///
    /// Signed out, the feed is cleared instead.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let Some(user) = self.services.auth.current_user() else {
            self.clear();
            return Ok(());
        };
        debug!(user = %user, "refreshing notifications");

        let limit = self.state().feed.limit();
        let rows = self.services.notifications.recent(&user, limit).await?;

        // A sign-out or account switch while fetching makes these rows stale
        if self.services.auth.current_user().as_ref() != Some(&user) {
            return Ok(());
        }
        let rows: Vec<Notification> = rows.into_iter().filter(|n| n.user_id == user).collect();
        self.state().feed.merge(rows);
        self.load_swap_meta().await;
        Ok(())
    }

    async fn refresh_logged(&self) {
        if let Err(e) = self.refresh().await {
            debug!(error = %e, "notification refresh failed");
        }
    }

    /// Fetches item titles for swaps referenced by the feed.
    async fn load_swap_meta(&self) {
        let missing: Vec<SwapId> = {
            let state = self.state();
            let mut ids: Vec<SwapId> = state
                .feed
                .entries()
                .iter()
                .filter_map(Notification::swap_id)
                .filter(|id| !state.meta.contains_key(id))
                .collect();
            ids.sort();
            ids.dedup();
            ids
        };

        for id in missing {
            match self.services.swaps.find(id).await {
                Ok(Some(row)) => {
                    self.state().meta.insert(
                        id,
                        SwapMeta {
                            requested: row.requested,
                            offered: row.offered,
                        },
                    );
                }
                Ok(None) => {
                    self.state().meta.insert(id, SwapMeta::default());
                }
                Err(e) => debug!(swap_id = %id, error = %e, "could not load swap for notification"),
            }
        }
    }

    /// Visible entries, newest first.
    pub fn entries(&self) -> Vec<NotificationEntry> {
        let state = self.state();
        state
            .feed
            .entries()
            .iter()
            .filter(|n| !state.hide_read || !n.is_read)
            .map(|n| NotificationEntry {
                text: describe(n, n.swap_id().and_then(|id| state.meta.get(&id))),
                notification: n.clone(),
            })
            .collect()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.state().feed.entries().to_vec()
    }

    pub fn unread_count(&self) -> usize {
        self.state().feed.unread_count()
    }

    /// Hides read notifications locally. Nothing is deleted.
    pub fn clear_local(&self) {
        self.state().hide_read = true;
    }

    pub fn show_read(&self) {
        self.state().hide_read = false;
    }

    fn clear(&self) {
        let mut state = self.state();
        state.feed.clear();
        state.meta.clear();
        state.hide_read = false;
    }

    pub async fn mark_as_read(&self, id: NotificationId) -> Result<(), SyncError> {
        self.services.require_user()?;

        perform_optimistic_update(
            || self.state().feed.set_read(&id, true),
            || async {
                self.services
                    .notifications
                    .mark_read(id)
                    .await
                    .map_err(SyncError::from)
            },
            |previous| {
                if let Some(previous) = previous {
                    self.state().feed.set_read(&id, previous);
                }
            },
        )
        .await
    }

    /// Marks everything read; on failure the feed is re-fetched. The local
    /// flags are only put back when that re-fetch fails too.
    pub async fn mark_all_as_read(&self) -> Result<(), SyncError> {
        let user = self.services.require_user()?;

        let changed = self.state().feed.mark_all_read();
        let Err(err) = self.services.notifications.mark_all_read(&user).await else {
            return Ok(());
        };
        warn!(error = %err, "mark all as read failed, re-fetching");

        if let Err(e) = self.refresh().await {
            debug!(error = %e, "re-fetch after failed mark all failed, restoring unread flags");
            let mut state = self.state();
            for id in changed {
                state.feed.set_read(&id, false);
            }
        }
        Err(SyncError::from(err))
    }

    /// Applies one row change from the dedicated channel.
    fn apply_change(&self, user: &UserId, change: &RowChange) {
        if change.kind == ChangeKind::Delete {
            if let Some(id) = change.row_id().and_then(|id| id.parse().ok()) {
                self.state().feed.remove(&id);
            }
            return;
        }
        let Some(row) = change.row() else {
            return;
        };
        match Notification::from_row(row) {
            Ok(notification) if &notification.user_id == user => {
                self.state().feed.merge([notification]);
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "undecodable notification row"),
        }
    }

    async fn open_feed(self: &Arc<Self>, user: &UserId) -> Result<ChannelGuard, DomainError> {
        let name = notification_channel_name(user);
        let subscriptions = vec![ChangeSubscription::eq(
            Table::Notifications,
            "user_id",
            user.as_str(),
        )];
        let channel = self.services.realtime.open_channel(&name, subscriptions).await?;

        let center = Arc::downgrade(self);
        let owner = user.clone();
        let config = SupervisorConfig {
            reconnect_delay: self.services.settings.reconnect_delay,
            verbose: self.services.settings.verbose_realtime,
        };
        Ok(supervise(channel, config, move |_, change| {
            if let Some(center) = center.upgrade() {
                center.apply_change(&owner, &change);
            }
        }))
    }

    /// Opens the dedicated feed, or returns when to try again.
    async fn attach_feed(
        self: &Arc<Self>,
        user: &UserId,
    ) -> (Option<ChannelGuard>, Option<Instant>) {
        match self.open_feed(user).await {
            Ok(guard) => (Some(guard), None),
            Err(e) => {
                warn!(user = %user, error = %e, "notification feed unavailable, retrying");
                let delay = self.services.settings.reconnect_delay;
                (None, Some(Instant::now() + delay))
            }
        }
    }

    /// Follows the session: clears on sign-out, loads and subscribes on
    /// sign-in, and polls while in the foreground. A feed that fails to
    /// open is retried after the reconnect delay.
    pub async fn run(
        self: Arc<Self>,
        mut auth: watch::Receiver<Option<AuthSession>>,
        mut lifecycle: watch::Receiver<AppLifecycle>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), DomainError> {
        let settings = self.services.settings.clone();
        let mut foreground = lifecycle.borrow_and_update().is_foreground();
        let mut lifecycle_open = true;
        let mut feed: Option<ChannelGuard> = None;
        let mut feed_retry: Option<Instant> = None;
        let mut next_poll: Option<Instant> = None;
        let mut current: Option<UserId> = None;

        let mut session = auth.borrow_and_update().clone();
        loop {
            let user = session.map(|s| s.user_id);
            if user != current {
                if let Some(old) = feed.take() {
                    old.shutdown().await;
                }
                self.clear();
                next_poll = None;
                feed_retry = None;
                if let Some(user) = &user {
                    info!(user = %user, "notification center attached");
                    self.refresh_logged().await;
                    (feed, feed_retry) = self.attach_feed(user).await;
                    if settings.polling_enabled {
                        next_poll = Some(Instant::now() + settings.poll_initial_delay);
                    }
                }
                current = user;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    session = auth.borrow().clone();
                }
                changed = auth.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    session = auth.borrow_and_update().clone();
                }
                changed = lifecycle.changed(), if lifecycle_open => {
                    if changed.is_err() {
                        lifecycle_open = false;
                    } else {
                        foreground = lifecycle.borrow_and_update().is_foreground();
                        if let (true, Some(feed)) = (foreground, &feed) {
                            feed.rejoin_if_needed();
                        }
                    }
                    session = auth.borrow().clone();
                }
                _ = sleep_until(feed_retry.unwrap_or_else(Instant::now)), if feed_retry.is_some() => {
                    feed_retry = None;
                    if let Some(user) = &current {
                        (feed, feed_retry) = self.attach_feed(user).await;
                    }
                    session = auth.borrow().clone();
                }
                _ = sleep_until(next_poll.unwrap_or_else(Instant::now)), if next_poll.is_some() => {
                    if foreground {
                        debug!("notification poll");
                        self.refresh_logged().await;
                    }
                    next_poll = Some(Instant::now() + settings.poll_interval);
                    session = auth.borrow().clone();
                }
            }
        }

        self.recheck.cancel();
        if let Some(old) = feed.take() {
            old.shutdown().await;
        }
        Ok(())
    }
}
