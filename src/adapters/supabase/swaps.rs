//! Swaps table. Every read uses the same embedded select so list and
//! detail rows have one shape.

use async_trait::async_trait;
use reqwest::Method;
use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;

use crate::domain::foundation::{DomainError, ItemId, SwapId, UserId};
use crate::domain::swap::{NewSwap, Swap, SwapAction, SwapStatus, SwapWithItems};
use crate::ports::SwapRepository;

use super::client::SupabaseClient;
use super::query::{in_list, Query};

const TABLE: &str = "swaps";

/// Swap columns plus both referenced items.
pub const SWAP_SELECT: &str = "*,\
requested:items!item_id(id,title,image_url),\
offered:items!offered_item_id(id,title,image_url)";

#[derive(Deserialize)]
struct ItemRefs {
    item_id: ItemId,
    #[serde(default)]
    offered_item_id: Option<ItemId>,
}

pub struct SupabaseSwaps {
    client: SupabaseClient,
}

impl SupabaseSwaps {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

/// Guard of a transition: the row is still pending and `actor` holds the
/// role the action requires.
pub(crate) fn transition_guard(id: SwapId, actor: &UserId, action: SwapAction) -> Query {
    Query::new()
        .eq("id", id.to_string())
        .eq(action.required_role().column(), actor.as_str())
        .eq("status", SwapStatus::Pending.as_str())
}

/// Swaps `user` sent or received, newest first.
pub(crate) fn participant_query(user: &UserId) -> Query {
    Query::select(SWAP_SELECT)
        .any_eq(&["sender_id", "receiver_id"], user.as_str())
        .order("created_at", false)
}

#[async_trait]
impl SwapRepository for SupabaseSwaps {
    async fn list_for_user(&self, user: &UserId) -> Result<Vec<SwapWithItems>, DomainError> {
        let query = participant_query(user);
        let request = self.client.rest(Method::GET, TABLE, &query);
        self.client.send_json(request).await
    }

    async fn find(&self, id: SwapId) -> Result<Option<SwapWithItems>, DomainError> {
        let query = Query::select(SWAP_SELECT).eq("id", id.to_string()).limit(1);
        let request = self.client.rest(Method::GET, TABLE, &query);
        let rows: Vec<SwapWithItems> = self.client.send_json(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn pending_item_ids(&self, items: &[ItemId]) -> Result<HashSet<ItemId>, DomainError> {
        if items.is_empty() {
            return Ok(HashSet::new());
        }
        let ids = in_list(items.iter().map(ItemId::to_string));
        let query = Query::select("item_id,offered_item_id")
            .eq("status", SwapStatus::Pending.as_str())
            .or([
                format!("item_id.in.{}", ids),
                format!("offered_item_id.in.{}", ids),
            ]);
        let request = self.client.rest(Method::GET, TABLE, &query);
        let rows: Vec<ItemRefs> = self.client.send_json(request).await?;

        let wanted: HashSet<ItemId> = items.iter().copied().collect();
        Ok(rows
            .into_iter()
            .flat_map(|r| std::iter::once(r.item_id).chain(r.offered_item_id))
            .filter(|id| wanted.contains(id))
            .collect())
    }

    async fn create(&self, swap: &NewSwap) -> Result<Swap, DomainError> {
        let request = self
            .client
            .rest(Method::POST, TABLE, &Query::new())
            .header("Prefer", "return=representation")
            .json(swap);
        let rows: Vec<Swap> = self.client.send_json(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| DomainError::backend("insert returned no row"))
    }

    async fn transition(
        &self,
        id: SwapId,
        actor: &UserId,
        action: SwapAction,
    ) -> Result<Option<Swap>, DomainError> {
        let request = self
            .client
            .rest(Method::PATCH, TABLE, &transition_guard(id, actor, action))
            .header("Prefer", "return=representation")
            .json(&json!({ "status": action.target_status() }));
        let rows: Vec<Swap> = self.client.send_json(request).await?;
        Ok(rows.into_iter().next())
    }
}
