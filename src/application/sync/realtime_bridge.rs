//! Realtime bridge - translates backend row changes into bus topics.
//!
//! One per-user channel carries every table the signed-in user cares about.
//! The bridge owns that channel exclusively and rebuilds it whenever the
//! session changes.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};

use crate::domain::foundation::{DomainError, UserId};
use crate::ports::{
    AuthSession, ChangeKind, ChangePublisher, ChangeSubscription, ColumnFilter, RealtimeTransport,
    RowChange, Table,
};

use super::channel::{supervise, ChannelGuard, SupervisorConfig};
use super::lifecycle::AppLifecycle;

/// Default size of the recently-emitted change window.
pub const DEFAULT_DEDUP_WINDOW: usize = 128;

/// Configuration for the realtime bridge.
#[derive(Debug, Clone)]
pub struct RealtimeBridgeConfig {
    /// Delay before resubscribing after an error status.
    pub reconnect_delay: Duration,
    /// How many recent change keys are remembered for duplicate suppression.
    pub dedup_window: usize,
    /// Log channel status at debug level.
    pub verbose: bool,
}

impl Default for RealtimeBridgeConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(800),
            dedup_window: DEFAULT_DEDUP_WINDOW,
            verbose: false,
        }
    }
}

impl RealtimeBridgeConfig {
    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_dedup_window(mut self, size: usize) -> Self {
        self.dedup_window = size;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    fn supervisor(&self) -> SupervisorConfig {
        SupervisorConfig {
            reconnect_delay: self.reconnect_delay,
            verbose: self.verbose,
        }
    }
}

/// A subscription on the user channel plus an optional filter applied
/// locally, for tables whose server-side filter is not used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeRoute {
    pub subscription: ChangeSubscription,
    pub local_filter: Option<ColumnFilter>,
}

impl BridgeRoute {
    fn accepts(&self, change: &RowChange) -> bool {
        match &self.local_filter {
            None => true,
            Some(filter) => change.row().map(|row| filter.matches(row)).unwrap_or(false),
        }
    }
}

/// Name of the per-user channel.
pub fn user_channel_name(user: &UserId) -> String {
    format!("user-events-{}", user)
}

/// The five listeners of the per-user channel.
pub fn user_routes(user: &UserId) -> Vec<BridgeRoute> {
    let uid = user.as_str();
    let server = |subscription| BridgeRoute {
        subscription,
        local_filter: None,
    };
    vec![
        server(ChangeSubscription::eq(Table::Swaps, "sender_id", uid)),
        server(ChangeSubscription::eq(Table::Swaps, "receiver_id", uid)),
        server(ChangeSubscription::eq(Table::Profiles, "id", uid)),
        BridgeRoute {
            subscription: ChangeSubscription::all(Table::Notifications),
            local_filter: Some(ColumnFilter::eq("user_id", uid)),
        },
        server(ChangeSubscription::eq(Table::Wishlist, "user_id", uid)),
    ]
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ChangeKey {
    table: Table,
    kind: ChangeKind,
    row_id: String,
    committed_at: i64,
}

impl ChangeKey {
    /// Changes without a row id or commit timestamp cannot be told apart
    /// from genuine repeats and are never suppressed.
    fn of(change: &RowChange) -> Option<Self> {
        Some(Self {
            table: change.table,
            kind: change.kind,
            row_id: change.row_id()?,
            committed_at: change.commit_timestamp?.as_unix_millis(),
        })
    }
}

/// Bounded memory of recently emitted changes.
#[derive(Debug)]
struct RecentChanges {
    capacity: usize,
    order: VecDeque<ChangeKey>,
    seen: HashSet<ChangeKey>,
}

impl RecentChanges {
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            order: VecDeque::new(),
            seen: HashSet::new(),
        }
    }

    /// Returns false if the key was already recorded.
    fn record(&mut self, key: ChangeKey) -> bool {
        if self.seen.contains(&key) {
            return false;
        }
        if self.order.len() == self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.order.push_back(key.clone());
        self.seen.insert(key);
        true
    }
}

/// An open per-user channel.
struct Connection {
    user: UserId,
    guard: ChannelGuard,
}

/// Bridges the realtime transport onto the change bus.
pub struct RealtimeBridge {
    transport: Arc<dyn RealtimeTransport>,
    publisher: Arc<dyn ChangePublisher>,
    config: RealtimeBridgeConfig,
}

impl RealtimeBridge {
    pub fn new(
        transport: Arc<dyn RealtimeTransport>,
        publisher: Arc<dyn ChangePublisher>,
        config: RealtimeBridgeConfig,
    ) -> Self {
        Self {
            transport,
            publisher,
            config,
        }
    }

    /// Runs until `shutdown` flips to true or its sender goes away.
    ///
    /// Every session change tears down the current channel; a new one is
    /// opened when a user id and access token are both present. A channel
    /// that fails to open is retried after the reconnect delay until it
    /// opens or the session changes. Returning to the foreground re-joins a
    /// channel that is not joined.
    pub async fn run(
        &self,
        mut auth: watch::Receiver<Option<AuthSession>>,
        mut lifecycle: watch::Receiver<AppLifecycle>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), DomainError> {
        let mut session = auth.borrow_and_update().clone();
        let (mut connection, mut retry_at) = self.attempt(session.as_ref()).await;
        let mut lifecycle_open = true;

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                changed = auth.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    session = auth.borrow_and_update().clone();
                    if let Some(previous) = connection.take() {
                        debug!(user = %previous.user, "session changed, closing channel");
                        previous.guard.shutdown().await;
                    }
                    (connection, retry_at) = self.attempt(session.as_ref()).await;
                }
                _ = sleep_until(retry_at.unwrap_or_else(Instant::now)), if retry_at.is_some() => {
                    (connection, retry_at) = self.attempt(session.as_ref()).await;
                }
                changed = lifecycle.changed(), if lifecycle_open => {
                    if changed.is_err() {
                        lifecycle_open = false;
                        continue;
                    }
                    let state = *lifecycle.borrow_and_update();
                    if state.is_foreground() {
                        if let Some(conn) = &connection {
                            conn.guard.rejoin_if_needed();
                        }
                    }
                }
            }
        }

        if let Some(conn) = connection.take() {
            conn.guard.shutdown().await;
        }
        info!("realtime bridge stopped");
        Ok(())
    }

    /// Connects for `session`, returning the deadline of the next attempt
    /// when the channel could not be opened.
    async fn attempt(
        &self,
        session: Option<&AuthSession>,
    ) -> (Option<Connection>, Option<Instant>) {
        match self.connect(session).await {
            Ok(connection) => (connection, None),
            Err(e) => {
                warn!(
                    error = %e,
                    retry_in_ms = self.config.reconnect_delay.as_millis() as u64,
                    "failed to open realtime channel"
                );
                (None, Some(Instant::now() + self.config.reconnect_delay))
            }
        }
    }

    /// `Ok(None)` when the session lacks credentials.
    async fn connect(
        &self,
        session: Option<&AuthSession>,
    ) -> Result<Option<Connection>, DomainError> {
        let Some(session) = session else {
            return Ok(None);
        };
        if session.access_token().is_empty() {
            return Ok(None);
        }
        let user = session.user_id.clone();

        self.transport.set_auth(session.access_token()).await;

        let routes = user_routes(&user);
        let subscriptions = routes.iter().map(|r| r.subscription.clone()).collect();
        let name = user_channel_name(&user);
        let channel = self.transport.open_channel(&name, subscriptions).await?;
        info!(channel = %name, "realtime channel opened");

        let publisher = self.publisher.clone();
        let mut recent = RecentChanges::new(self.config.dedup_window);
        let guard = supervise(channel, self.config.supervisor(), move |index, change| {
            let Some(route) = routes.get(index) else {
                return;
            };
            if !route.accepts(&change) {
                return;
            }
            if let Some(key) = ChangeKey::of(&change) {
                if !recent.record(key) {
                    debug!(table = %change.table, "duplicate change suppressed");
                    return;
                }
            }
            publisher.emit(change.table.topic());
        });

        Ok(Some(Connection { user, guard }))
    }
}
