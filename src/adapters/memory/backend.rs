//! In-memory backend implementing every table repository.
//!
//! Guarded updates check the same conditions the hosted backend does, and
//! every write is fanned out to an attached [`InMemoryRealtime`] as a row
//! change, so views and the realtime bridge can be exercised end to end.
//! Swap inserts and answers also write notification rows, like the
//! backend's triggers.
//!
//! Operation names for [`InMemoryBackend::fail_next`] and
//! [`InMemoryBackend::calls`] are `"<table>.<method>"`, e.g.
//! `"items.archive"` or `"swaps.transition"`.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{json, Value as JsonValue};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::trace;

use crate::domain::foundation::{
    DomainError, ErrorCode, ItemId, NotificationId, SwapId, Timestamp, UserId, WishlistEntryId,
};
use crate::domain::item::{Item, NewItem};
use crate::domain::notification::{Notification, NotificationType};
use crate::domain::profile::{Profile, ProfileStats, ProfileUpdate};
use crate::domain::swap::{NewSwap, Swap, SwapAction, SwapRole, SwapStatus, SwapWithItems};
use crate::domain::wishlist::{WishlistEntry, WishlistEntryWithItem};
use crate::ports::{
    ChangeKind, ItemQuery, ItemRepository, ItemSort, NotificationRepository, ProfileRepository,
    RowChange, SwapRepository, Table, WishlistRepository,
};

use super::InMemoryRealtime;

#[derive(Default)]
struct Tables {
    items: Vec<Item>,
    swaps: Vec<Swap>,
    wishlist: Vec<WishlistEntry>,
    notifications: Vec<Notification>,
    profiles: HashMap<UserId, Profile>,
}

impl Tables {
    fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.iter().find(|i| i.id == id)
    }

    fn with_items(&self, swap: &Swap) -> SwapWithItems {
        SwapWithItems {
            swap: swap.clone(),
            requested: self.item(swap.requested_item_id).map(Item::summary),
            offered: swap
                .offered_item_id
                .and_then(|id| self.item(id))
                .map(Item::summary),
        }
    }
}

/// Row change waiting to be published once the table lock is released.
struct Pending {
    table: Table,
    kind: ChangeKind,
    new: Option<JsonValue>,
    old: Option<JsonValue>,
}

fn to_row<T: Serialize>(value: &T) -> Option<JsonValue> {
    serde_json::to_value(value).ok()
}

fn trigger_notification(user: &UserId, kind: NotificationType, swap: SwapId) -> Notification {
    Notification {
        id: NotificationId::new(),
        user_id: user.clone(),
        kind,
        payload: json!({ "swap_id": swap.to_string() }),
        is_read: false,
        created_at: Timestamp::now(),
    }
}

/// Shared in-memory tables.
#[derive(Default)]
pub struct InMemoryBackend {
    tables: Mutex<Tables>,
    realtime: Option<Arc<InMemoryRealtime>>,
    failures: Mutex<HashMap<&'static str, usize>>,
    calls: Mutex<HashMap<&'static str, usize>>,
    latency: Mutex<Option<Duration>>,
    last_commit: AtomicI64,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes every write to `realtime`.
    pub fn with_realtime(realtime: Arc<InMemoryRealtime>) -> Self {
        Self {
            realtime: Some(realtime),
            ..Self::default()
        }
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Makes the next call of `operation` fail with a backend error.
    pub fn fail_next(&self, operation: &'static str) {
        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        *failures.entry(operation).or_insert(0) += 1;
    }

    /// How many times `operation` was called.
    pub fn calls(&self, operation: &'static str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(operation)
            .copied()
            .unwrap_or(0)
    }

    /// Delays every call by `latency` before it touches the tables.
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap_or_else(|e| e.into_inner()) = Some(latency);
    }

    async fn begin(&self, operation: &'static str) -> Result<(), DomainError> {
        let latency = *self.latency.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        *self
            .calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(operation)
            .or_insert(0) += 1;
        trace!(operation, "in-memory backend call");

        let mut failures = self.failures.lock().unwrap_or_else(|e| e.into_inner());
        match failures.get_mut(operation) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(DomainError::backend(format!("{} failed (injected)", operation)))
            }
            _ => Ok(()),
        }
    }

    /// Strictly increasing commit timestamps, so every write has its own
    /// change key.
    fn next_commit(&self) -> Timestamp {
        let now = Timestamp::now().as_unix_millis();
        let mut last = self.last_commit.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self
                .last_commit
                .compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst)
            {
                Ok(_) => return Timestamp::from_unix_millis(next),
                Err(actual) => last = actual,
            }
        }
    }

    fn publish(&self, pending: Vec<Pending>) {
        let Some(realtime) = &self.realtime else {
            return;
        };
        for change in pending {
            realtime.publish(&RowChange {
                table: change.table,
                kind: change.kind,
                new: change.new,
                old: change.old,
                commit_timestamp: Some(self.next_commit()),
            });
        }
    }

    // Seeding and inspection, bypassing guards and failure injection.

    pub fn insert_item(&self, item: Item) {
        let row = to_row(&item);
        self.tables().items.push(item);
        self.publish(vec![Pending {
            table: Table::Items,
            kind: ChangeKind::Insert,
            new: row,
            old: None,
        }]);
    }

    pub fn insert_swap(&self, swap: Swap) {
        let row = to_row(&swap);
        self.tables().swaps.push(swap);
        self.publish(vec![Pending {
            table: Table::Swaps,
            kind: ChangeKind::Insert,
            new: row,
            old: None,
        }]);
    }

    pub fn insert_notification(&self, notification: Notification) {
        let row = to_row(&notification);
        self.tables().notifications.push(notification);
        self.publish(vec![Pending {
            table: Table::Notifications,
            kind: ChangeKind::Insert,
            new: row,
            old: None,
        }]);
    }

    pub fn insert_profile(&self, profile: Profile) {
        self.tables().profiles.insert(profile.id.clone(), profile);
    }

    pub fn item(&self, id: ItemId) -> Option<Item> {
        self.tables().item(id).cloned()
    }

    pub fn swap(&self, id: SwapId) -> Option<Swap> {
        self.tables().swaps.iter().find(|s| s.id == id).cloned()
    }

    pub fn notifications_for(&self, user: &UserId) -> Vec<Notification> {
        self.tables()
            .notifications
            .iter()
            .filter(|n| &n.user_id == user)
            .cloned()
            .collect()
    }

    pub fn wishlist_of(&self, user: &UserId) -> HashSet<ItemId> {
        self.tables()
            .wishlist
            .iter()
            .filter(|w| &w.user_id == user)
            .map(|w| w.item_id)
            .collect()
    }

    /// Applies `action` as `actor` without the client, the way the other
    /// party's device would.
    pub fn resolve_swap(&self, id: SwapId, actor: &UserId, action: SwapAction) -> Option<Swap> {
        let (swap, pending) = self.apply_transition(id, actor, action)?;
        self.publish(pending);
        Some(swap)
    }

    fn apply_transition(
        &self,
        id: SwapId,
        actor: &UserId,
        action: SwapAction,
    ) -> Option<(Swap, Vec<Pending>)> {
        let mut tables = self.tables();
        let swap = tables.swaps.iter_mut().find(|s| {
            s.id == id
                && s.status == SwapStatus::Pending
                && match action.required_role() {
                    SwapRole::Receiver => &s.receiver_id == actor,
                    SwapRole::Sender => &s.sender_id == actor,
                }
        })?;

        let old = to_row(swap);
        swap.status = action.target_status();
        let updated = swap.clone();
        let mut pending = vec![Pending {
            table: Table::Swaps,
            kind: ChangeKind::Update,
            new: to_row(&updated),
            old,
        }];

        let kind = match action {
            SwapAction::Accept => Some(NotificationType::TradeAccepted),
            SwapAction::Decline => Some(NotificationType::TradeDeclined),
            SwapAction::Cancel => None,
        };
        if let Some(kind) = kind {
            let notification = trigger_notification(&updated.sender_id, kind, updated.id);
            pending.push(Pending {
                table: Table::Notifications,
                kind: ChangeKind::Insert,
                new: to_row(&notification),
                old: None,
            });
            tables.notifications.push(notification);
        }
        Some((updated, pending))
    }

    /// Guarded write of `archived_at`: archiving needs a listed row,
    /// relisting an archived one, both owned by `owner`.
    fn set_archived(
        &self,
        id: ItemId,
        owner: &UserId,
        archived_at: Option<Timestamp>,
    ) -> Option<Item> {
        let expect_listed = archived_at.is_some();
        let (updated, pending) = {
            let mut tables = self.tables();
            let item = tables.items.iter_mut().find(|i| {
                i.id == id && &i.owner_id == owner && i.is_listed() == expect_listed
            })?;
            let old = to_row(item);
            item.archived_at = archived_at;
            let updated = item.clone();
            let pending = Pending {
                table: Table::Items,
                kind: ChangeKind::Update,
                new: to_row(&updated),
                old,
            };
            (updated, pending)
        };
        self.publish(vec![pending]);
        Some(updated)
    }
}

#[async_trait]
impl ItemRepository for InMemoryBackend {
    async fn list_listed(&self, query: &ItemQuery) -> Result<Vec<Item>, DomainError> {
        self.begin("items.list_listed").await?;
        let tables = self.tables();
        let mut items: Vec<Item> = tables
            .items
            .iter()
            .filter(|i| i.is_listed())
            .filter(|i| {
                query
                    .search
                    .as_deref()
                    .map(|s| i.matches_search(s))
                    .unwrap_or(true)
            })
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            let by_time = match query.sort {
                ItemSort::Newest => b.created_at.cmp(&a.created_at),
                ItemSort::Oldest => a.created_at.cmp(&b.created_at),
            };
            by_time.then_with(|| b.id.cmp(&a.id))
        });
        items.truncate(query.limit);
        Ok(items)
    }

    async fn list_owned(&self, owner: &UserId) -> Result<Vec<Item>, DomainError> {
        self.begin("items.list_owned").await?;
        let mut items: Vec<Item> = self
            .tables()
            .items
            .iter()
            .filter(|i| &i.owner_id == owner)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(items)
    }

    async fn find(&self, id: ItemId) -> Result<Option<Item>, DomainError> {
        self.begin("items.find").await?;
        Ok(self.item(id))
    }

    async fn create(&self, item: &NewItem) -> Result<Item, DomainError> {
        self.begin("items.create").await?;
        let created = Item {
            id: ItemId::new(),
            owner_id: item.owner_id.clone(),
            title: item.title.clone(),
            description: item.description.clone(),
            image_url: item.image_url.clone(),
            trade_for: item.trade_for.clone(),
            created_at: Timestamp::now(),
            archived_at: None,
        };
        self.insert_item(created.clone());
        Ok(created)
    }

    async fn archive(
        &self,
        id: ItemId,
        owner: &UserId,
        at: Timestamp,
    ) -> Result<Option<Item>, DomainError> {
        self.begin("items.archive").await?;
        Ok(self.set_archived(id, owner, Some(at)))
    }

    async fn relist(&self, id: ItemId, owner: &UserId) -> Result<Option<Item>, DomainError> {
        self.begin("items.relist").await?;
        Ok(self.set_archived(id, owner, None))
    }
}

#[async_trait]
impl SwapRepository for InMemoryBackend {
    async fn list_for_user(&self, user: &UserId) -> Result<Vec<SwapWithItems>, DomainError> {
        self.begin("swaps.list_for_user").await?;
        let tables = self.tables();
        let mut swaps: Vec<&Swap> = tables
            .swaps
            .iter()
            .filter(|s| s.is_participant(user))
            .collect();
        swaps.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        Ok(swaps.into_iter().map(|s| tables.with_items(s)).collect())
    }

    async fn find(&self, id: SwapId) -> Result<Option<SwapWithItems>, DomainError> {
        self.begin("swaps.find").await?;
        let tables = self.tables();
        Ok(tables
            .swaps
            .iter()
            .find(|s| s.id == id)
            .map(|s| tables.with_items(s)))
    }

    async fn pending_item_ids(&self, items: &[ItemId]) -> Result<HashSet<ItemId>, DomainError> {
        self.begin("swaps.pending_item_ids").await?;
        let wanted: HashSet<ItemId> = items.iter().copied().collect();
        Ok(self
            .tables()
            .swaps
            .iter()
            .filter(|s| s.status.is_pending())
            .flat_map(|s| std::iter::once(s.requested_item_id).chain(s.offered_item_id))
            .filter(|id| wanted.contains(id))
            .collect())
    }

    async fn create(&self, swap: &NewSwap) -> Result<Swap, DomainError> {
        self.begin("swaps.create").await?;
        let created = Swap {
            id: SwapId::new(),
            sender_id: swap.sender_id.clone(),
            receiver_id: swap.receiver_id.clone(),
            requested_item_id: swap.requested_item_id,
            offered_item_id: swap.offered_item_id,
            message: swap.message.clone(),
            status: swap.status,
            created_at: Timestamp::now(),
        };
        let notification = trigger_notification(
            &created.receiver_id,
            NotificationType::TradeOffered,
            created.id,
        );
        self.insert_swap(created.clone());
        self.insert_notification(notification);
        Ok(created)
    }

    async fn transition(
        &self,
        id: SwapId,
        actor: &UserId,
        action: SwapAction,
    ) -> Result<Option<Swap>, DomainError> {
        self.begin("swaps.transition").await?;
        Ok(self.resolve_swap(id, actor, action))
    }
}

#[async_trait]
impl WishlistRepository for InMemoryBackend {
    async fn item_ids(&self, user: &UserId) -> Result<HashSet<ItemId>, DomainError> {
        self.begin("wishlist.item_ids").await?;
        Ok(self.wishlist_of(user))
    }

    async fn entries(&self, user: &UserId) -> Result<Vec<WishlistEntryWithItem>, DomainError> {
        self.begin("wishlist.entries").await?;
        let tables = self.tables();
        Ok(tables
            .wishlist
            .iter()
            .rev()
            .filter(|w| &w.user_id == user)
            .map(|w| WishlistEntryWithItem {
                entry: w.clone(),
                item: tables.item(w.item_id).cloned(),
            })
            .collect())
    }

    async fn toggle(&self, user: &UserId, item: ItemId) -> Result<bool, DomainError> {
        self.begin("wishlist.toggle").await?;
        let (added, pending) = {
            let mut tables = self.tables();
            if tables.item(item).is_none() {
                return Err(DomainError::new(ErrorCode::ItemNotFound, "Item"));
            }
            match tables
                .wishlist
                .iter()
                .position(|w| &w.user_id == user && w.item_id == item)
            {
                Some(index) => {
                    let removed = tables.wishlist.remove(index);
                    (false, Pending {
                        table: Table::Wishlist,
                        kind: ChangeKind::Delete,
                        new: None,
                        old: to_row(&removed),
                    })
                }
                None => {
                    let entry = WishlistEntry {
                        id: WishlistEntryId::new(),
                        user_id: user.clone(),
                        item_id: item,
                    };
                    let row = to_row(&entry);
                    tables.wishlist.push(entry);
                    (true, Pending {
                        table: Table::Wishlist,
                        kind: ChangeKind::Insert,
                        new: row,
                        old: None,
                    })
                }
            }
        };
        self.publish(vec![pending]);
        Ok(added)
    }

    async fn remove(&self, entry: WishlistEntryId, user: &UserId) -> Result<bool, DomainError> {
        self.begin("wishlist.remove").await?;
        let removed = {
            let mut tables = self.tables();
            let index = tables
                .wishlist
                .iter()
                .position(|w| w.id == entry && &w.user_id == user);
            index.map(|i| tables.wishlist.remove(i))
        };
        match removed {
            Some(row) => {
                self.publish(vec![Pending {
                    table: Table::Wishlist,
                    kind: ChangeKind::Delete,
                    new: None,
                    old: to_row(&row),
                }]);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl NotificationRepository for InMemoryBackend {
    async fn recent(&self, user: &UserId, limit: usize) -> Result<Vec<Notification>, DomainError> {
        self.begin("notifications.recent").await?;
        let mut rows = self.notifications_for(user);
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
        rows.truncate(limit);
        Ok(rows)
    }

    async fn mark_read(&self, id: NotificationId) -> Result<(), DomainError> {
        self.begin("notifications.mark_read").await?;
        let pending = {
            let mut tables = self.tables();
            tables
                .notifications
                .iter_mut()
                .find(|n| n.id == id && !n.is_read)
                .map(|n| {
                    let old = to_row(n);
                    n.is_read = true;
                    Pending {
                        table: Table::Notifications,
                        kind: ChangeKind::Update,
                        new: to_row(n),
                        old,
                    }
                })
        };
        self.publish(pending.into_iter().collect());
        Ok(())
    }

    async fn mark_all_read(&self, user: &UserId) -> Result<(), DomainError> {
        self.begin("notifications.mark_all_read").await?;
        let pending: Vec<Pending> = {
            let mut tables = self.tables();
            tables
                .notifications
                .iter_mut()
                .filter(|n| &n.user_id == user && !n.is_read)
                .map(|n| {
                    let old = to_row(n);
                    n.is_read = true;
                    Pending {
                        table: Table::Notifications,
                        kind: ChangeKind::Update,
                        new: to_row(n),
                        old,
                    }
                })
                .collect()
        };
        self.publish(pending);
        Ok(())
    }
}

#[async_trait]
impl ProfileRepository for InMemoryBackend {
    async fn find(&self, user: &UserId) -> Result<Option<Profile>, DomainError> {
        self.begin("profiles.find").await?;
        Ok(self.tables().profiles.get(user).cloned())
    }

    async fn update(&self, user: &UserId, update: &ProfileUpdate) -> Result<Profile, DomainError> {
        self.begin("profiles.update").await?;
        let (updated, pending) = {
            let mut tables = self.tables();
            let profile = tables
                .profiles
                .entry(user.clone())
                .or_insert_with(|| Profile::empty(user.clone()));
            let old = to_row(profile);
            profile.apply(update);
            let updated = profile.clone();
            let pending = Pending {
                table: Table::Profiles,
                kind: ChangeKind::Update,
                new: to_row(&updated),
                old,
            };
            (updated, pending)
        };
        self.publish(vec![pending]);
        Ok(updated)
    }

    async fn stats(&self, user: &UserId) -> Result<ProfileStats, DomainError> {
        self.begin("profiles.stats").await?;
        let tables = self.tables();
        let owned = tables.items.iter().filter(|i| &i.owner_id == user);
        Ok(ProfileStats {
            items: owned.clone().count() as u64,
            active_items: owned.filter(|i| i.is_listed()).count() as u64,
            wishlist: tables.wishlist.iter().filter(|w| &w.user_id == user).count() as u64,
            swaps: tables.swaps.iter().filter(|s| s.is_participant(user)).count() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    fn item(owner: &UserId, title: &str) -> Item {
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

    #[tokio::test]
    async fn archive_is_guarded_by_owner_and_state() {
        let backend = InMemoryBackend::new();
        let alice = user("alice");
        let listed = item(&alice, "Lamp");
        backend.insert_item(listed.clone());
        let now = Timestamp::now();

        assert!(backend.archive(listed.id, &user("bob"), now).await.unwrap().is_none());
        assert!(backend.archive(listed.id, &alice, now).await.unwrap().is_some());
        assert!(backend.archive(listed.id, &alice, now).await.unwrap().is_none());
        assert!(backend.relist(listed.id, &alice).await.unwrap().is_some());
        assert!(backend.relist(listed.id, &alice).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn transition_matches_only_pending_rows_for_the_right_role() {
        let backend = InMemoryBackend::new();
        let (alice, bob) = (user("alice"), user("bob"));
        let wanted = item(&bob, "Bike");
        backend.insert_item(wanted.clone());
        let proposal = NewSwap::new(alice.clone(), bob.clone(), wanted.id, None, None).unwrap();
        let swap = SwapRepository::create(&backend, &proposal).await.unwrap();

        assert!(backend
            .transition(swap.id, &alice, SwapAction::Accept)
            .await
            .unwrap()
            .is_none());
        let accepted = backend
            .transition(swap.id, &bob, SwapAction::Accept)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(accepted.status, SwapStatus::Accepted);
        assert!(backend
            .transition(swap.id, &alice, SwapAction::Cancel)
            .await
            .unwrap()
            .is_none());

        // offer to bob, acceptance to alice
        assert_eq!(backend.notifications_for(&bob).len(), 1);
        assert_eq!(
            backend.notifications_for(&alice)[0].kind,
            NotificationType::TradeAccepted
        );
    }

    #[tokio::test]
    async fn toggle_flips_membership() {
        let backend = InMemoryBackend::new();
        let alice = user("alice");
        let lamp = item(&user("bob"), "Lamp");
        backend.insert_item(lamp.clone());

        assert!(backend.toggle(&alice, lamp.id).await.unwrap());
        assert!(!backend.toggle(&alice, lamp.id).await.unwrap());
        assert!(backend.wishlist_of(&alice).is_empty());
        assert!(backend.toggle(&alice, ItemId::new()).await.is_err());
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_once() {
        let backend = InMemoryBackend::new();
        backend.fail_next("items.list_owned");

        assert!(backend.list_owned(&user("alice")).await.is_err());
        assert!(backend.list_owned(&user("alice")).await.is_ok());
        assert_eq!(backend.calls("items.list_owned"), 2);
    }

    #[tokio::test]
    async fn stats_count_items_wishlist_and_swaps() {
        let backend = InMemoryBackend::new();
        let (alice, bob) = (user("alice"), user("bob"));
        let mut old = item(&alice, "Old chair");
        old.archived_at = Some(Timestamp::now());
        backend.insert_item(old);
        backend.insert_item(item(&alice, "Desk"));
        let bike = item(&bob, "Bike");
        backend.insert_item(bike.clone());
        backend.toggle(&alice, bike.id).await.unwrap();
        let proposal = NewSwap::new(alice.clone(), bob, bike.id, None, None).unwrap();
        SwapRepository::create(&backend, &proposal).await.unwrap();

        let stats = backend.stats(&alice).await.unwrap();
        assert_eq!(
            stats,
            ProfileStats {
                items: 2,
                active_items: 1,
                wishlist: 1,
                swaps: 1,
            }
        );
    }
}
