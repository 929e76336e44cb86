//! Notifications table.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value as JsonValue};
use tracing::warn;

use crate::domain::foundation::{DomainError, NotificationId, UserId};
use crate::domain::notification::Notification;
use crate::ports::NotificationRepository;

use super::client::SupabaseClient;
use super::query::Query;

const TABLE: &str = "notifications";

pub struct SupabaseNotifications {
    client: SupabaseClient,
}

impl SupabaseNotifications {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationRepository for SupabaseNotifications {
    /// Rows that fail to decode are skipped rather than failing the page.
    async fn recent(&self, user: &UserId, limit: usize) -> Result<Vec<Notification>, DomainError> {
        let query = Query::select("*")
            .eq("user_id", user.as_str())
            .order("created_at", false)
            .limit(limit);
        let request = self.client.rest(Method::GET, TABLE, &query);
        let rows: Vec<JsonValue> = self.client.send_json(request).await?;
        Ok(rows
            .iter()
            .filter_map(|row| match Notification::from_row(row) {
                Ok(n) => Some(n),
                Err(e) => {
                    warn!(error = %e, "skipping undecodable notification");
                    None
                }
            })
            .collect())
    }

    async fn mark_read(&self, id: NotificationId) -> Result<(), DomainError> {
        let query = Query::new().eq("id", id.to_string());
        let request = self
            .client
            .rest(Method::PATCH, TABLE, &query)
            .json(&json!({ "is_read": true }));
        self.client.send_empty(request).await
    }

    async fn mark_all_read(&self, user: &UserId) -> Result<(), DomainError> {
        let query = Query::new()
            .eq("user_id", user.as_str())
            .eq("is_read", "false");
        let request = self
            .client
            .rest(Method::PATCH, TABLE, &query)
            .json(&json!({ "is_read": true }));
        self.client.send_empty(request).await
    }
}
