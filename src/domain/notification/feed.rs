//! Bounded, deduplicated, newest-first notification cache.

use std::collections::HashMap;

use crate::domain::foundation::NotificationId;

use super::Notification;

pub const DEFAULT_FEED_LIMIT: usize = 50;

/// Local projection of the user's notifications.
///
/// Every delivery path (explicit refresh, bus-triggered refresh, direct
/// change feed, reconciliation poll) funnels through [`NotificationFeed::merge`].
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationFeed {
    entries: Vec<Notification>,
    limit: usize,
}

impl NotificationFeed {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Incoming rows overwrite cached rows with the same id; the result is
    /// sorted newest first and truncated to the limit.
    pub fn merge<I>(&mut self, incoming: I)
    where
        I: IntoIterator<Item = Notification>,
    {
        let mut by_id: HashMap<NotificationId, Notification> = self
            .entries
            .drain(..)
            .map(|n| (n.id, n))
            .collect();
        for n in incoming {
            by_id.insert(n.id, n);
        }

        let mut merged: Vec<Notification> = by_id.into_values().collect();
        merged.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        merged.truncate(self.limit);
        self.entries = merged;
    }

    pub fn remove(&mut self, id: &NotificationId) -> Option<Notification> {
        let pos = self.entries.iter().position(|n| &n.id == id)?;
        Some(self.entries.remove(pos))
    }

    /// Sets the read flag on one entry, returning the previous value.
    pub fn set_read(&mut self, id: &NotificationId, is_read: bool) -> Option<bool> {
        let entry = self.entries.iter_mut().find(|n| &n.id == id)?;
        Some(std::mem::replace(&mut entry.is_read, is_read))
    }

    /// Marks everything read, returning the ids that changed.
    pub fn mark_all_read(&mut self) -> Vec<NotificationId> {
        self.entries
            .iter_mut()
            .filter(|n| !n.is_read)
            .map(|n| {
                n.is_read = true;
                n.id
            })
            .collect()
    }

    pub fn unread_count(&self) -> usize {
        self.entries.iter().filter(|n| !n.is_read).count()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[Notification] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for NotificationFeed {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{Timestamp, UserId};
    use crate::domain::notification::NotificationType;
    use proptest::prelude::*;
    use serde_json::Value as JsonValue;

    fn note(millis: i64, is_read: bool) -> Notification {
        Notification {
            id: NotificationId::new(),
            user_id: UserId::new("u-1").unwrap(),
            kind: NotificationType::TradeOffered,
            payload: JsonValue::Null,
            is_read,
            created_at: Timestamp::from_unix_millis(millis),
        }
    }

    #[test]
    fn merge_sorts_newest_first() {
        let mut feed = NotificationFeed::default();
        feed.merge(vec![note(1_000, false), note(3_000, false), note(2_000, false)]);

        let times: Vec<i64> = feed
            .entries()
            .iter()
            .map(|n| n.created_at.as_unix_millis())
            .collect();
        assert_eq!(times, vec![3_000, 2_000, 1_000]);
    }

    #[test]
    fn incoming_row_overwrites_cached_row() {
        let mut feed = NotificationFeed::default();
        let original = note(1_000, false);
        feed.merge(vec![original.clone()]);

        let mut updated = original.clone();
        updated.is_read = true;
        feed.merge(vec![updated]);

        assert_eq!(feed.len(), 1);
        assert!(feed.entries()[0].is_read);
    }

    #[test]
    fn merge_caps_to_limit_keeping_newest() {
        let mut feed = NotificationFeed::new(50);
        feed.merge((0..60).map(|i| note(i * 10, false)));

        assert_eq!(feed.len(), 50);
        assert_eq!(feed.entries()[0].created_at.as_unix_millis(), 590);
        assert_eq!(feed.entries()[49].created_at.as_unix_millis(), 100);
    }

    #[test]
    fn set_read_returns_previous_flag() {
        let mut feed = NotificationFeed::default();
        let n = note(1_000, false);
        feed.merge(vec![n.clone()]);

        assert_eq!(feed.set_read(&n.id, true), Some(false));
        assert_eq!(feed.unread_count(), 0);
        assert_eq!(feed.set_read(&NotificationId::new(), true), None);
    }

    #[test]
    fn mark_all_read_reports_changed_ids() {
        let mut feed = NotificationFeed::default();
        feed.merge(vec![note(1, false), note(2, true), note(3, false)]);

        assert_eq!(feed.mark_all_read().len(), 2);
        assert_eq!(feed.unread_count(), 0);
    }

    #[test]
    fn remove_drops_entry() {
        let mut feed = NotificationFeed::default();
        let n = note(1, false);
        feed.merge(vec![n.clone(), note(2, false)]);

        assert!(feed.remove(&n.id).is_some());
        assert_eq!(feed.len(), 1);
    }

    proptest! {
        #[test]
        fn merging_same_rows_twice_is_idempotent(
            rows in proptest::collection::vec((0i64..500, any::<bool>()), 0..120),
        ) {
            let batch: Vec<Notification> = rows
                .into_iter()
                .map(|(millis, read)| note(millis, read))
                .collect();

            let mut feed = NotificationFeed::default();
            feed.merge(batch.clone());
            let once = feed.clone();
            feed.merge(batch);

            prop_assert_eq!(&feed, &once);
            prop_assert!(feed.len() <= DEFAULT_FEED_LIMIT);
            let sorted = feed
                .entries()
                .windows(2)
                .all(|w| w[0].created_at >= w[1].created_at);
            prop_assert!(sorted);
        }
    }
}
