//! Wishlist rows: one per (user, item) pair.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ItemId, OwnedByUser, UserId, WishlistEntryId};
use crate::domain::item::Item;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistEntry {
    pub id: WishlistEntryId,
    pub user_id: UserId,
    pub item_id: ItemId,
}

impl OwnedByUser for WishlistEntry {
    fn owner_id(&self) -> &UserId {
        &self.user_id
    }
}

/// A wishlist row joined with the item it points at.
///
/// `item` is `None` when the row survived but the item is no longer readable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WishlistEntryWithItem {
    #[serde(flatten)]
    pub entry: WishlistEntry,
    #[serde(default)]
    pub item: Option<Item>,
}

impl WishlistEntryWithItem {
    /// Entries whose item is gone or delisted are shown as unavailable.
    pub fn is_available(&self) -> bool {
        self.item.as_ref().map(Item::is_listed).unwrap_or(false)
    }
}
