//! ItemRepository port for listed items.

use async_trait::async_trait;

use crate::domain::{
    foundation::{DomainError, ItemId, Timestamp, UserId},
    item::{Item, NewItem},
};

/// Ordering of the browse query. Ties on `created_at` break by id, descending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ItemSort {
    #[default]
    Newest,
    Oldest,
}

/// Filter for the browse query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemQuery {
    /// Case-insensitive match on title or description.
    pub search: Option<String>,
    pub sort: ItemSort,
    pub limit: usize,
}

impl ItemQuery {
    pub fn new(limit: usize) -> Self {
        Self {
            search: None,
            sort: ItemSort::Newest,
            limit,
        }
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        let search = search.into();
        let trimmed = search.trim();
        self.search = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        self
    }

    pub fn sorted(mut self, sort: ItemSort) -> Self {
        self.sort = sort;
        self
    }
}

/// Repository for items.
///
/// `archive` and `relist` are guarded updates: they only touch a row owned
/// by `owner` and in the expected listed/archived state, and return `None`
/// when no row matched.
#[async_trait]
pub trait ItemRepository: Send + Sync {
    /// Listed (non-archived) items in the requested order.
    async fn list_listed(&self, query: &ItemQuery) -> Result<Vec<Item>, DomainError>;

    /// All of the owner's items, archived included, newest first.
    async fn list_owned(&self, owner: &UserId) -> Result<Vec<Item>, DomainError>;

    async fn find(&self, id: ItemId) -> Result<Option<Item>, DomainError>;

    async fn create(&self, item: &NewItem) -> Result<Item, DomainError>;

    /// `archived_at = at` where `id`, `user_id = owner` and `archived_at IS NULL`.
    async fn archive(
        &self,
        id: ItemId,
        owner: &UserId,
        at: Timestamp,
    ) -> Result<Option<Item>, DomainError>;

    /// `archived_at = NULL` where `id`, `user_id = owner` and `archived_at IS NOT NULL`.
    async fn relist(&self, id: ItemId, owner: &UserId) -> Result<Option<Item>, DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_search_is_dropped() {
        assert_eq!(ItemQuery::new(10).with_search("   ").search, None);
        assert_eq!(
            ItemQuery::new(10).with_search(" boots ").search.as_deref(),
            Some("boots")
        );
    }
}
