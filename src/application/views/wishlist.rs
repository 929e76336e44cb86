//! Wishlist screen.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::application::sync::{perform_optimistic_update, RefetchOnChange};
use crate::domain::foundation::{ItemId, WishlistEntryId};
use crate::domain::item::Item;
use crate::domain::sync::{ChangeTopic, SyncError};
use crate::domain::wishlist::WishlistEntryWithItem;
use crate::ports::ConfirmRequest;

use super::{refetch_on, ActionOutcome, Services};

pub struct WishlistView {
    services: Services,
    entries: Mutex<Vec<WishlistEntryWithItem>>,
    _refetch: RefetchOnChange,
}

impl WishlistView {
    pub fn new(services: Services) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let refetch = refetch_on(
                &services,
                "wishlist",
                &[ChangeTopic::WishlistChanged, ChangeTopic::ItemsChanged],
                weak,
                |view: Arc<WishlistView>| async move { view.refresh().await },
            );
            Self {
                services,
                entries: Mutex::new(Vec::new()),
                _refetch: refetch,
            }
        })
    }

    fn entries_mut(&self) -> MutexGuard<'_, Vec<WishlistEntryWithItem>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn refresh(&self) -> Result<(), SyncError> {
        let user = match self.services.require_user() {
            Ok(user) => user,
            Err(e) => {
                self.entries_mut().clear();
                return Err(e);
            }
        };
        debug!(user = %user, "refreshing wishlist");
        let entries = self.services.wishlist.entries(&user).await?;
        *self.entries_mut() = entries;
        Ok(())
    }

    pub fn entries(&self) -> Vec<WishlistEntryWithItem> {
        self.entries_mut().clone()
    }

    /// Removes an entry after confirmation.
    ///
    /// An entry that is already gone on the backend counts as removed.
    pub async fn remove(&self, entry: WishlistEntryId) -> Result<ActionOutcome<()>, SyncError> {
        let user = self.services.require_user()?;
        if !self.entries_mut().iter().any(|e| e.entry.id == entry) {
            return Err(SyncError::not_found("Wishlist entry"));
        }

        let confirmed = self
            .services
            .confirm(
                ConfirmRequest::new("Remove from wishlist?", "You can add it again later.")
                    .confirm_label("Remove")
                    .destructive(),
            )
            .await;
        if !confirmed {
            return Ok(ActionOutcome::Dismissed);
        }

        let removed = perform_optimistic_update(
            || {
                let mut entries = self.entries_mut();
                let index = entries.iter().position(|e| e.entry.id == entry);
                index.map(|i| (i, entries.remove(i)))
            },
            || async {
                self.services
                    .wishlist
                    .remove(entry, &user)
                    .await
                    .map_err(SyncError::from)
            },
            |snapshot| {
                if let Some((index, row)) = snapshot {
                    let mut entries = self.entries_mut();
                    let index = index.min(entries.len());
                    entries.insert(index, row);
                }
            },
        )
        .await?;

        if !removed {
            debug!(entry_id = %entry, "wishlist entry was already gone");
        }
        info!(entry_id = %entry, "removed from wishlist");
        self.services.emit(ChangeTopic::WishlistChanged);
        Ok(ActionOutcome::Applied(()))
    }

    /// Checks the item is still available before navigating to it; stale
    /// entries are dropped locally.
    pub async fn open_item(&self, item: ItemId) -> Result<Item, SyncError> {
        match self.services.items.find(item).await? {
            Some(found) if found.is_listed() => Ok(found),
            _ => {
                self.entries_mut().retain(|e| e.entry.item_id != item);
                Err(SyncError::not_found("Item"))
            }
        }
    }
}
