//! Views - screen-level projections of backend rows.
//!
//! Each view owns a local cache, refreshes it when its change topics fire
//! (debounced), and performs user actions optimistically.

mod browse;
mod my_items;
mod notifications;
mod profile;
mod swaps;
mod wishlist;

pub use browse::{BrowseFilter, BrowseView};
pub use my_items::{MyItemsSections, MyItemsView};
pub use notifications::{notification_channel_name, NotificationCenter, NotificationEntry};
pub use profile::{AvatarUpload, ProfileView};
pub use swaps::{propose_swap, SwapDetailView, SwapInboxView, SwapProposal};
pub use wishlist::WishlistView;

use std::future::Future;
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::application::sync::{Debouncer, RefetchOnChange};
use crate::domain::sync::{ChangeTopic, SyncError};

use super::Services;

/// Result of an action that asks for confirmation first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome<T> {
    Applied(T),
    /// The user dismissed the confirmation; nothing changed.
    Dismissed,
}

impl<T> ActionOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, ActionOutcome::Applied(_))
    }

    pub fn applied(self) -> Option<T> {
        match self {
            ActionOutcome::Applied(value) => Some(value),
            ActionOutcome::Dismissed => None,
        }
    }
}

/// Result of a wishlist toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    Added,
    Removed,
    /// A toggle of the same item is still in flight; this one was ignored.
    InFlight,
}

impl ToggleOutcome {
    fn from_state(wishlisted: bool) -> Self {
        if wishlisted {
            ToggleOutcome::Added
        } else {
            ToggleOutcome::Removed
        }
    }
}

/// Wires `topics` to a debounced call of `refresh` on the view behind `view`.
pub(crate) fn refetch_on<V, F, Fut>(
    services: &Services,
    name: &'static str,
    topics: &[ChangeTopic],
    view: &Weak<V>,
    refresh: F,
) -> RefetchOnChange
where
    V: Send + Sync + 'static,
    F: Fn(Arc<V>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SyncError>> + Send + 'static,
{
    let view = view.clone();
    let refresh = Arc::new(refresh);
    let debouncer = Debouncer::new(name, services.settings.debounce, move || {
        let view = view.upgrade();
        let refresh = refresh.clone();
        async move {
            if let Some(view) = view {
                if let Err(e) = refresh(view).await {
                    debug!(view = name, error = %e, "background refresh failed");
                }
            }
        }
    });
    RefetchOnChange::attach(services.subscriber.as_ref(), topics, Arc::new(debouncer))
}
