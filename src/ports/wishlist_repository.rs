//! WishlistRepository port.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::domain::{
    foundation::{DomainError, ItemId, UserId, WishlistEntryId},
    wishlist::WishlistEntryWithItem,
};

#[async_trait]
pub trait WishlistRepository: Send + Sync {
    /// Item ids on the user's wishlist.
    async fn item_ids(&self, user: &UserId) -> Result<HashSet<ItemId>, DomainError>;

    /// Entries with their items embedded, newest first.
    async fn entries(&self, user: &UserId) -> Result<Vec<WishlistEntryWithItem>, DomainError>;

    /// Atomically adds or removes `item`. Returns whether the item is on
    /// the wishlist afterwards.
    async fn toggle(&self, user: &UserId, item: ItemId) -> Result<bool, DomainError>;

    /// Deletes one entry owned by `user`. Returns false when nothing matched.
    async fn remove(&self, entry: WishlistEntryId, user: &UserId) -> Result<bool, DomainError>;
}
