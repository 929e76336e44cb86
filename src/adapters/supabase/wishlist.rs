//! Wishlist table and the `toggle_wishlist` procedure.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;

use crate::domain::foundation::{DomainError, ErrorCode, ItemId, UserId, WishlistEntryId};
use crate::domain::wishlist::{WishlistEntry, WishlistEntryWithItem};
use crate::ports::WishlistRepository;

use super::client::SupabaseClient;
use super::query::Query;

const TABLE: &str = "wishlist";

const ENTRY_SELECT: &str = "id,user_id,item_id,created_at,item:items!wishlist_item_id_fkey(*)";

#[derive(Deserialize)]
struct ItemRef {
    item_id: ItemId,
}

pub struct SupabaseWishlist {
    client: SupabaseClient,
}

impl SupabaseWishlist {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WishlistRepository for SupabaseWishlist {
    async fn item_ids(&self, user: &UserId) -> Result<HashSet<ItemId>, DomainError> {
        let query = Query::select("item_id").eq("user_id", user.as_str());
        let request = self.client.rest(Method::GET, TABLE, &query);
        let rows: Vec<ItemRef> = self.client.send_json(request).await?;
        Ok(rows.into_iter().map(|r| r.item_id).collect())
    }

    async fn entries(&self, user: &UserId) -> Result<Vec<WishlistEntryWithItem>, DomainError> {
        let query = Query::select(ENTRY_SELECT)
            .eq("user_id", user.as_str())
            .order("created_at", false);
        let request = self.client.rest(Method::GET, TABLE, &query);
        self.client.send_json(request).await
    }

    /// The procedure flips membership for the caller and returns the new
    /// state; the user is taken from the bearer token.
    async fn toggle(&self, _user: &UserId, item: ItemId) -> Result<bool, DomainError> {
        let request = self
            .client
            .request(Method::POST, "rest/v1/rpc/toggle_wishlist")
            .json(&json!({ "p_item": item }));
        let state: Option<bool> = self.client.send_json(request).await?;
        state.ok_or_else(|| {
            DomainError::new(ErrorCode::SerializationError, "toggle_wishlist returned null")
        })
    }

    async fn remove(&self, entry: WishlistEntryId, user: &UserId) -> Result<bool, DomainError> {
        let query = Query::new()
            .eq("id", entry.to_string())
            .eq("user_id", user.as_str());
        let request = self
            .client
            .rest(Method::DELETE, TABLE, &query)
            .header("Prefer", "return=representation");
        let rows: Vec<WishlistEntry> = self.client.send_json(request).await?;
        Ok(!rows.is_empty())
    }
}
