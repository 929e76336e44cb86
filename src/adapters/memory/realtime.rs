//! In-memory realtime transport.
//!
//! Channels are fed through unbounded queues. Tests publish row changes,
//! inject status transitions and make resubscribes fail, then observe what
//! the supervised side did.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{
    ChangeSubscription, ChannelEvent, ChannelStatus, RealtimeChannel, RealtimeTransport, RowChange,
};

#[derive(Default)]
struct ChannelShared {
    joined: AtomicBool,
    closed: AtomicBool,
    resubscribes: AtomicUsize,
    failing_resubscribes: AtomicUsize,
}

struct ChannelSlot {
    subscriptions: Vec<ChangeSubscription>,
    events: mpsc::UnboundedSender<ChannelEvent>,
    shared: Arc<ChannelShared>,
}

impl ChannelSlot {
    fn is_live(&self) -> bool {
        !self.shared.closed.load(Ordering::SeqCst)
    }
}

/// Scriptable realtime transport.
#[derive(Default)]
pub struct InMemoryRealtime {
    channels: Mutex<HashMap<String, ChannelSlot>>,
    access_token: Mutex<Option<String>>,
    opened: AtomicUsize,
    fail_open: AtomicBool,
}

impl InMemoryRealtime {
    pub fn new() -> Self {
        Self::default()
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, ChannelSlot>> {
        self.channels.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Delivers `change` to every joined channel with a matching
    /// subscription. Returns how many deliveries were made.
    pub fn publish(&self, change: &RowChange) -> usize {
        let channels = self.channels();
        let mut delivered = 0;
        for slot in channels.values().filter(|s| s.is_live()) {
            if !slot.shared.joined.load(Ordering::SeqCst) {
                continue;
            }
            for (index, subscription) in slot.subscriptions.iter().enumerate() {
                if subscription.matches(change) {
                    let event = ChannelEvent::Change {
                        subscription: index,
                        change: change.clone(),
                    };
                    if slot.events.send(event).is_ok() {
                        delivered += 1;
                    }
                }
            }
        }
        delivered
    }

    /// Pushes `change` to one channel as-is, the way the server redelivers
    /// around a reconnect.
    pub fn deliver(&self, channel: &str, subscription: usize, change: RowChange) -> bool {
        match self.channels().get(channel).filter(|s| s.is_live()) {
            Some(slot) => slot
                .events
                .send(ChannelEvent::Change {
                    subscription,
                    change,
                })
                .is_ok(),
            None => false,
        }
    }

    /// Reports `status` on a channel. Error statuses also mark it unjoined.
    pub fn inject_status(&self, channel: &str, status: ChannelStatus) -> bool {
        let channels = self.channels();
        let Some(slot) = channels.get(channel).filter(|s| s.is_live()) else {
            return false;
        };
        slot.shared
            .joined
            .store(status == ChannelStatus::Subscribed, Ordering::SeqCst);
        slot.events.send(ChannelEvent::Status(status)).is_ok()
    }

    /// Makes the next `count` resubscribe attempts on `channel` fail.
    pub fn fail_resubscribes(&self, channel: &str, count: usize) {
        if let Some(slot) = self.channels().get(channel) {
            slot.shared
                .failing_resubscribes
                .store(count, Ordering::SeqCst);
        }
    }

    /// Makes every later `open_channel` call fail until switched off.
    pub fn fail_opens(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn resubscribe_count(&self, channel: &str) -> usize {
        self.channels()
            .get(channel)
            .map(|s| s.shared.resubscribes.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn is_joined(&self, channel: &str) -> bool {
        self.channels()
            .get(channel)
            .filter(|s| s.is_live())
            .map(|s| s.shared.joined.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Names of channels that are open and not closed.
    pub fn open_channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .channels()
            .iter()
            .filter(|(_, slot)| slot.is_live())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// How many channels were ever opened.
    pub fn opened_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn access_token(&self) -> Option<String> {
        self.access_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl RealtimeTransport for InMemoryRealtime {
    async fn set_auth(&self, access_token: &str) {
        *self.access_token.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(access_token.to_string());
    }

    async fn open_channel(
        &self,
        name: &str,
        subscriptions: Vec<ChangeSubscription>,
    ) -> Result<Box<dyn RealtimeChannel>, DomainError> {
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::RealtimeError,
                format!("cannot open channel {}", name),
            ));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(ChannelShared::default());
        shared.joined.store(true, Ordering::SeqCst);
        let _ = tx.send(ChannelEvent::Status(ChannelStatus::Subscribed));

        // Opening a channel under a live name replaces it, like a re-join
        if let Some(previous) = self.channels().insert(
            name.to_string(),
            ChannelSlot {
                subscriptions,
                events: tx.clone(),
                shared: shared.clone(),
            },
        ) {
            previous.shared.closed.store(true, Ordering::SeqCst);
        }
        self.opened.fetch_add(1, Ordering::SeqCst);

        Ok(Box::new(InMemoryChannel {
            name: name.to_string(),
            events: rx,
            notify: tx,
            shared,
        }))
    }
}

struct InMemoryChannel {
    name: String,
    events: mpsc::UnboundedReceiver<ChannelEvent>,
    notify: mpsc::UnboundedSender<ChannelEvent>,
    shared: Arc<ChannelShared>,
}

#[async_trait]
impl RealtimeChannel for InMemoryChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_joined(&self) -> bool {
        self.shared.joined.load(Ordering::SeqCst)
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return None;
        }
        self.events.recv().await
    }

    async fn resubscribe(&mut self) -> Result<(), DomainError> {
        self.shared.resubscribes.fetch_add(1, Ordering::SeqCst);
        let failing = self.shared.failing_resubscribes.load(Ordering::SeqCst);
        if failing > 0 {
            self.shared
                .failing_resubscribes
                .store(failing - 1, Ordering::SeqCst);
            return Err(DomainError::new(
                ErrorCode::RealtimeError,
                format!("resubscribe of {} refused", self.name),
            ));
        }
        self.shared.joined.store(true, Ordering::SeqCst);
        let _ = self
            .notify
            .send(ChannelEvent::Status(ChannelStatus::Subscribed));
        Ok(())
    }

    async fn close(&mut self) {
        self.shared.joined.store(false, Ordering::SeqCst);
        self.shared.closed.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{ChangeKind, Table};
    use serde_json::json;

    fn swap_change(sender: &str) -> RowChange {
        RowChange {
            table: Table::Swaps,
            kind: ChangeKind::Insert,
            new: Some(json!({ "id": "s-1", "sender_id": sender, "receiver_id": "u-2" })),
            old: None,
            commit_timestamp: None,
        }
    }

    #[tokio::test]
    async fn open_reports_subscribed_then_routes_matching_changes() {
        let transport = InMemoryRealtime::new();
        let mut channel = transport
            .open_channel(
                "c",
                vec![
                    ChangeSubscription::eq(Table::Swaps, "sender_id", "u-1"),
                    ChangeSubscription::eq(Table::Swaps, "receiver_id", "u-1"),
                ],
            )
            .await
            .unwrap();

        assert_eq!(
            channel.next_event().await,
            Some(ChannelEvent::Status(ChannelStatus::Subscribed))
        );
        assert_eq!(transport.publish(&swap_change("u-1")), 1);
        assert_eq!(transport.publish(&swap_change("u-9")), 0);

        match channel.next_event().await {
            Some(ChannelEvent::Change { subscription, .. }) => assert_eq!(subscription, 0),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn unjoined_channels_miss_changes() {
        let transport = InMemoryRealtime::new();
        let _channel = transport
            .open_channel("c", vec![ChangeSubscription::all(Table::Swaps)])
            .await
            .unwrap();

        transport.inject_status("c", ChannelStatus::ChannelError);
        assert!(!transport.is_joined("c"));
        assert_eq!(transport.publish(&swap_change("u-1")), 0);
    }

    #[tokio::test]
    async fn scripted_resubscribe_failures() {
        let transport = InMemoryRealtime::new();
        let mut channel = transport
            .open_channel("c", vec![ChangeSubscription::all(Table::Swaps)])
            .await
            .unwrap();
        transport.fail_resubscribes("c", 1);

        assert!(channel.resubscribe().await.is_err());
        assert!(channel.resubscribe().await.is_ok());
        assert_eq!(transport.resubscribe_count("c"), 2);
        assert!(transport.is_joined("c"));
    }

    #[tokio::test]
    async fn closed_channels_end_their_stream() {
        let transport = InMemoryRealtime::new();
        let mut channel = transport
            .open_channel("c", vec![ChangeSubscription::all(Table::Swaps)])
            .await
            .unwrap();
        channel.close().await;

        assert!(transport.open_channels().is_empty());
        assert_eq!(channel.next_event().await, None);
    }
}
