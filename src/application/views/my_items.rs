//! My items screen: the owner's listings, delist and relist.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::application::sync::{perform_optimistic_update, RefetchOnChange};
use crate::domain::foundation::{DomainError, ItemId, OwnedByUser, Timestamp};
use crate::domain::item::{Item, NewItem};
use crate::domain::sync::{ChangeTopic, SyncError};
use crate::ports::ConfirmRequest;

use super::{refetch_on, ActionOutcome, Services};

/// Items grouped the way the screen shows them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MyItemsSections {
    /// Listed and referenced by a pending swap.
    pub pending: Vec<Item>,
    /// Listed and free.
    pub active: Vec<Item>,
    pub archived: Vec<Item>,
}

#[derive(Default)]
struct MyItemsState {
    items: Vec<Item>,
    pending: HashSet<ItemId>,
}

pub struct MyItemsView {
    services: Services,
    state: Mutex<MyItemsState>,
    _refetch: RefetchOnChange,
}

impl MyItemsView {
    pub fn new(services: Services) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let refetch = refetch_on(
                &services,
                "my_items",
                &[ChangeTopic::ItemsChanged, ChangeTopic::SwapsChanged],
                weak,
                |view: Arc<MyItemsView>| async move { view.refresh().await },
            );
            Self {
                services,
                state: Mutex::new(MyItemsState::default()),
                _refetch: refetch,
            }
        })
    }

    fn state(&self) -> MutexGuard<'_, MyItemsState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn refresh(&self) -> Result<(), SyncError> {
        let user = match self.services.require_user() {
            Ok(user) => user,
            Err(e) => {
                *self.state() = MyItemsState::default();
                return Err(e);
            }
        };
        debug!(user = %user, "refreshing my items");

        let items = self.services.items.list_owned(&user).await?;
        let ids: Vec<ItemId> = items.iter().map(|i| i.id).collect();
        let pending = if ids.is_empty() {
            HashSet::new()
        } else {
            self.services.swaps.pending_item_ids(&ids).await?
        };

        let mut state = self.state();
        state.items = items;
        state.pending = pending;
        Ok(())
    }

    /// Listed items first, then archived ones.
    pub fn items(&self) -> Vec<Item> {
        let mut items = self.state().items.clone();
        items.sort_by_key(|i| !i.is_listed());
        items
    }

    pub fn sections(&self) -> MyItemsSections {
        let state = self.state();
        let mut sections = MyItemsSections::default();
        for item in &state.items {
            if !item.is_listed() {
                sections.archived.push(item.clone());
            } else if state.pending.contains(&item.id) {
                sections.pending.push(item.clone());
            } else {
                sections.active.push(item.clone());
            }
        }
        sections
    }

    pub fn is_pending(&self, id: ItemId) -> bool {
        self.state().pending.contains(&id)
    }

    /// Lists a new item.
    pub async fn create(&self, item: NewItem) -> Result<Item, SyncError> {
        let user = self.services.require_user()?;
        if item.owner_id != user {
            return Err(SyncError::Forbidden("items are listed by their owner".into()));
        }
        let created = self.services.items.create(&item).await?;
        self.state().items.insert(0, created.clone());
        info!(item_id = %created.id, "item listed");
        self.services.emit(ChangeTopic::ItemsChanged);
        Ok(created)
    }

    /// Soft-deletes a listed item after confirmation.
    pub async fn delist(&self, id: ItemId) -> Result<ActionOutcome<Item>, SyncError> {
        let user = self.services.require_user()?;
        let item = self.local(id)?;
        item.check_ownership(&user)?;
        if !item.is_listed() {
            return Err(SyncError::InvalidTransition("item is already delisted".into()));
        }

        let confirmed = self
            .services
            .confirm(
                ConfirmRequest::new(
                    "Delist item?",
                    "It will be hidden from others. You can relist it later.",
                )
                .confirm_label("Delist")
                .destructive(),
            )
            .await;
        if !confirmed {
            return Ok(ActionOutcome::Dismissed);
        }

        let now = Timestamp::now();
        let updated = self
            .guarded(id, Some(now), || async {
                self.services.items.archive(id, &user, now).await
            })
            .await?;
        info!(item_id = %id, "item delisted");
        Ok(ActionOutcome::Applied(updated))
    }

    /// Puts an archived item back on the market.
    pub async fn relist(&self, id: ItemId) -> Result<Item, SyncError> {
        let user = self.services.require_user()?;
        let item = self.local(id)?;
        item.check_ownership(&user)?;
        if item.is_listed() {
            return Err(SyncError::InvalidTransition("item is already listed".into()));
        }

        let updated = self
            .guarded(id, None, || async { self.services.items.relist(id, &user).await })
            .await?;
        info!(item_id = %id, "item relisted");
        Ok(updated)
    }

    fn local(&self, id: ItemId) -> Result<Item, SyncError> {
        self.state()
            .items
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or_else(|| SyncError::not_found("Item"))
    }

    /// Sets `archived_at` locally, runs the guarded write, and restores
    /// the previous value if the write fails or matches nothing. After a
    /// failure the row is re-read from the backend; a conflict carries the
    /// state found there.
    async fn guarded<F, Fut>(
        &self,
        id: ItemId,
        archived_at: Option<Timestamp>,
        write: F,
    ) -> Result<Item, SyncError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<Item>, DomainError>>,
    {
        let result = perform_optimistic_update(
            || self.set_archived(id, archived_at),
            || async {
                match write().await {
                    Ok(Some(item)) => Ok(item),
                    Ok(None) => Err(SyncError::conflict("Item", None)),
                    Err(e) => Err(SyncError::from(e)),
                }
            },
            |previous| {
                self.set_archived(id, previous);
            },
        )
        .await;

        match result {
            Ok(updated) => {
                self.replace(updated.clone());
                self.services.emit(ChangeTopic::ItemsChanged);
                Ok(updated)
            }
            Err(err) => {
                let current_state = self.reload(id).await;
                warn!(item_id = %id, error = %err, "item change rolled back");
                Err(match err {
                    SyncError::Conflict { resource, .. } => SyncError::Conflict {
                        resource,
                        current_state,
                    },
                    other => other,
                })
            }
        }
    }

    /// Replaces the local row with the stored one, dropping it when gone.
    /// Returns the stored listing state, or `None` if it could not be read.
    async fn reload(&self, id: ItemId) -> Option<String> {
        match self.services.items.find(id).await {
            Ok(Some(item)) => {
                let state = if item.is_listed() { "listed" } else { "delisted" };
                self.replace(item);
                Some(state.to_string())
            }
            Ok(None) => {
                self.state().items.retain(|i| i.id != id);
                Some("removed".to_string())
            }
            Err(e) => {
                debug!(item_id = %id, error = %e, "re-fetch after failed item change failed");
                None
            }
        }
    }

    /// Returns the value it replaced.
    fn set_archived(&self, id: ItemId, archived_at: Option<Timestamp>) -> Option<Timestamp> {
        let mut state = self.state();
        match state.items.iter_mut().find(|i| i.id == id) {
            Some(item) => std::mem::replace(&mut item.archived_at, archived_at),
            None => None,
        }
    }

    fn replace(&self, item: Item) {
        let mut state = self.state();
        if let Some(slot) = state.items.iter_mut().find(|i| i.id == item.id) {
            *slot = item;
        }
    }
}
