//! Items table.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::json;

use crate::domain::foundation::{DomainError, ItemId, Timestamp, UserId};
use crate::domain::item::{Item, NewItem};
use crate::ports::{ItemQuery, ItemRepository, ItemSort};

use super::client::SupabaseClient;
use super::query::Query;

const TABLE: &str = "items";

pub struct SupabaseItems {
    client: SupabaseClient,
}

impl SupabaseItems {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }

    /// PATCH `archived_at` and return the matched rows.
    async fn set_archived(
        &self,
        query: Query,
        archived_at: Option<Timestamp>,
    ) -> Result<Option<Item>, DomainError> {
        let request = self
            .client
            .rest(Method::PATCH, TABLE, &query)
            .header("Prefer", "return=representation")
            .json(&json!({ "archived_at": archived_at }));
        let rows: Vec<Item> = self.client.send_json(request).await?;
        Ok(rows.into_iter().next())
    }
}

pub(crate) fn browse_query(query: &ItemQuery) -> Query {
    let mut q = Query::select("*").is_null("archived_at");
    if let Some(search) = &query.search {
        q = q.search(&["title", "description"], search);
    }
    q.order("created_at", query.sort == ItemSort::Oldest)
        .order("id", false)
        .limit(query.limit)
}

#[async_trait]
impl ItemRepository for SupabaseItems {
    async fn list_listed(&self, query: &ItemQuery) -> Result<Vec<Item>, DomainError> {
        let request = self.client.rest(Method::GET, TABLE, &browse_query(query));
        self.client.send_json(request).await
    }

    async fn list_owned(&self, owner: &UserId) -> Result<Vec<Item>, DomainError> {
        let query = Query::select("*")
            .eq("user_id", owner.as_str())
            .order("created_at", false)
            .order("id", false);
        let request = self.client.rest(Method::GET, TABLE, &query);
        self.client.send_json(request).await
    }

    async fn find(&self, id: ItemId) -> Result<Option<Item>, DomainError> {
        let query = Query::select("*").eq("id", id.to_string()).limit(1);
        let request = self.client.rest(Method::GET, TABLE, &query);
        let rows: Vec<Item> = self.client.send_json(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn create(&self, item: &NewItem) -> Result<Item, DomainError> {
        let request = self
            .client
            .rest(Method::POST, TABLE, &Query::new())
            .header("Prefer", "return=representation")
            .json(item);
        let rows: Vec<Item> = self.client.send_json(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| DomainError::backend("insert returned no row"))
    }

    async fn archive(
        &self,
        id: ItemId,
        owner: &UserId,
        at: Timestamp,
    ) -> Result<Option<Item>, DomainError> {
        let guard = Query::new()
            .eq("id", id.to_string())
            .eq("user_id", owner.as_str())
            .is_null("archived_at");
        self.set_archived(guard, Some(at)).await
    }

    async fn relist(&self, id: ItemId, owner: &UserId) -> Result<Option<Item>, DomainError> {
        let guard = Query::new()
            .eq("id", id.to_string())
            .eq("user_id", owner.as_str())
            .not_null("archived_at");
        self.set_archived(guard, None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn browse_query_orders_and_limits() {
        let query = ItemQuery::new(100).with_search("lamp").sorted(ItemSort::Oldest);
        let params = browse_query(&query);
        let params: Vec<(&str, &str)> = params
            .params()
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();

        assert!(params.contains(&("archived_at", "is.null")));
        assert!(params.contains(&("or", "(title.ilike.*lamp*,description.ilike.*lamp*)")));
        assert!(params.contains(&("order", "created_at.asc,id.desc")));
        assert!(params.contains(&("limit", "100")));
    }
}
