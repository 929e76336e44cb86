//! Browse screen: listed items plus the viewer's wishlist hearts.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

use crate::application::sync::{perform_optimistic_update, RefetchOnChange};
use crate::domain::foundation::ItemId;
use crate::domain::item::Item;
use crate::domain::sync::{ChangeTopic, SyncError};
use crate::ports::{ItemQuery, ItemSort};

use super::{refetch_on, Services, ToggleOutcome};

/// Local, non-query filters applied on top of the fetched page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BrowseFilter {
    pub only_wishlisted: bool,
    pub with_images_only: bool,
}

#[derive(Default)]
struct BrowseState {
    items: Vec<Item>,
    wishlisted: HashSet<ItemId>,
    toggling: HashSet<ItemId>,
    search: Option<String>,
    sort: ItemSort,
    filter: BrowseFilter,
}

pub struct BrowseView {
    services: Services,
    state: Mutex<BrowseState>,
    _refetch: RefetchOnChange,
}

impl BrowseView {
    pub fn new(services: Services) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let refetch = refetch_on(
                &services,
                "browse",
                &[ChangeTopic::ItemsChanged, ChangeTopic::WishlistChanged],
                weak,
                |view: Arc<BrowseView>| async move { view.refresh().await },
            );
            Self {
                services,
                state: Mutex::new(BrowseState::default()),
                _refetch: refetch,
            }
        })
    }

    fn state(&self) -> MutexGuard<'_, BrowseState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Re-fetches the listed items and, when signed in, the wishlist set.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let query = {
            let state = self.state();
            let mut query = ItemQuery::new(self.services.settings.browse_limit).sorted(state.sort);
            if let Some(search) = &state.search {
                query = query.with_search(search.clone());
            }
            query
        };
        debug!(search = ?query.search, "refreshing browse");

        let items = self.services.items.list_listed(&query).await?;
        let wishlisted = match self.services.auth.current_user() {
            Some(user) => self.services.wishlist.item_ids(&user).await?,
            None => HashSet::new(),
        };

        let mut state = self.state();
        state.items = items;
        // Hearts with a toggle in flight keep their optimistic value
        let in_flight: Vec<(ItemId, bool)> = state
            .toggling
            .iter()
            .map(|id| (*id, state.wishlisted.contains(id)))
            .collect();
        state.wishlisted = wishlisted;
        for (id, on) in in_flight {
            set_membership(&mut state.wishlisted, id, on);
        }
        Ok(())
    }

    pub async fn set_search(&self, search: impl Into<String>) -> Result<(), SyncError> {
        let search = search.into();
        let trimmed = search.trim();
        self.state().search = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self.refresh().await
    }

    pub async fn set_sort(&self, sort: ItemSort) -> Result<(), SyncError> {
        self.state().sort = sort;
        self.refresh().await
    }

    pub fn set_filter(&self, filter: BrowseFilter) {
        self.state().filter = filter;
    }

    /// Items after the local filters.
    pub fn items(&self) -> Vec<Item> {
        let state = self.state();
        state
            .items
            .iter()
            .filter(|item| !state.filter.only_wishlisted || state.wishlisted.contains(&item.id))
            .filter(|item| {
                !state.filter.with_images_only
                    || item
                        .image_url
                        .as_deref()
                        .map(|url| !url.trim().is_empty())
                        .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    pub fn is_wishlisted(&self, item: ItemId) -> bool {
        self.state().wishlisted.contains(&item)
    }

    /// Flips the heart immediately, then lets the backend decide.
    ///
    /// The backend's answer wins over the optimistic value. A second toggle
    /// of the same item while the first is in flight is ignored.
    pub async fn toggle_wishlist(&self, item: ItemId) -> Result<ToggleOutcome, SyncError> {
        let user = self.services.require_user()?;

        if !self.state().toggling.insert(item) {
            return Ok(ToggleOutcome::InFlight);
        }

        let result = perform_optimistic_update(
            || {
                let mut state = self.state();
                let was = state.wishlisted.contains(&item);
                set_membership(&mut state.wishlisted, item, !was);
                was
            },
            || async {
                self.services
                    .wishlist
                    .toggle(&user, item)
                    .await
                    .map_err(SyncError::from)
            },
            |was| set_membership(&mut self.state().wishlisted, item, was),
        )
        .await;

        let mut state = self.state();
        state.toggling.remove(&item);
        let now = result?;
        set_membership(&mut state.wishlisted, item, now);
        drop(state);

        info!(item_id = %item, wishlisted = now, "wishlist toggled");
        self.services.emit(ChangeTopic::WishlistChanged);
        Ok(ToggleOutcome::from_state(now))
    }

    /// Fetches an item before navigating to it.
    ///
    /// A missing or delisted item is dropped from the local list and
    /// reported as `NotFound`.
    pub async fn open_item(&self, id: ItemId) -> Result<Item, SyncError> {
        match self.services.items.find(id).await? {
            Some(item) if item.is_listed() => Ok(item),
            _ => {
                self.state().items.retain(|i| i.id != id);
                Err(SyncError::not_found("Item"))
            }
        }
    }
}

fn set_membership(set: &mut HashSet<ItemId>, id: ItemId, present: bool) {
    if present {
        set.insert(id);
    } else {
        set.remove(&id);
    }
}
