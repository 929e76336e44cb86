//! SwapRepository port for trade proposals.

use async_trait::async_trait;
use std::collections::HashSet;

use crate::domain::{
    foundation::{DomainError, ItemId, SwapId, UserId},
    swap::{NewSwap, Swap, SwapAction, SwapWithItems},
};

/// Repository for swaps.
#[async_trait]
pub trait SwapRepository: Send + Sync {
    /// Swaps where `user` is sender or receiver, newest first, with the
    /// requested and offered items embedded.
    async fn list_for_user(&self, user: &UserId) -> Result<Vec<SwapWithItems>, DomainError>;

    async fn find(&self, id: SwapId) -> Result<Option<SwapWithItems>, DomainError>;

    /// Ids among `items` that are requested or offered by a pending swap.
    async fn pending_item_ids(&self, items: &[ItemId]) -> Result<HashSet<ItemId>, DomainError>;

    async fn create(&self, swap: &NewSwap) -> Result<Swap, DomainError>;

    /// Guarded transition.
    ///
    /// Sets `status = action.target_status()` only where `id` matches,
    /// `actor` holds the action's required role and the status is still
    /// pending. Returns `None` when zero rows matched, which callers treat
    /// as a conflict.
    async fn transition(
        &self,
        id: SwapId,
        actor: &UserId,
        action: SwapAction,
    ) -> Result<Option<Swap>, DomainError>;
}
