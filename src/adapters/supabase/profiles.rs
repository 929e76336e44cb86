//! Profiles table and the activity counters shown on the profile screen.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value as JsonValue;

use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::domain::profile::{Profile, ProfileStats, ProfileUpdate};
use crate::ports::ProfileRepository;

use super::client::SupabaseClient;
use super::query::Query;

const TABLE: &str = "profiles";

pub struct SupabaseProfiles {
    client: SupabaseClient,
}

impl SupabaseProfiles {
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

/// Upsert body: the row key, the changed columns and `updated_at`.
fn update_body(
    user: &UserId,
    update: &ProfileUpdate,
    at: Timestamp,
) -> Result<JsonValue, DomainError> {
    let mut body = serde_json::to_value(update)
        .map_err(|e| DomainError::new(ErrorCode::SerializationError, e.to_string()))?;
    if let Some(map) = body.as_object_mut() {
        map.insert("id".to_string(), JsonValue::String(user.to_string()));
        map.insert("updated_at".to_string(), JsonValue::String(at.to_rfc3339()));
    }
    Ok(body)
}

#[async_trait]
impl ProfileRepository for SupabaseProfiles {
    async fn find(&self, user: &UserId) -> Result<Option<Profile>, DomainError> {
        let query = Query::select("*").eq("id", user.as_str()).limit(1);
        let request = self.client.rest(Method::GET, TABLE, &query);
        let rows: Vec<Profile> = self.client.send_json(request).await?;
        Ok(rows.into_iter().next())
    }

    async fn update(&self, user: &UserId, update: &ProfileUpdate) -> Result<Profile, DomainError> {
        // Merging on the primary key covers a row the sign-up trigger has
        // not written yet.
        let request = self
            .client
            .rest(Method::POST, TABLE, &Query::new())
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&update_body(user, update, Timestamp::now())?);
        let rows: Vec<Profile> = self.client.send_json(request).await?;
        rows.into_iter()
            .next()
            .ok_or_else(|| DomainError::new(ErrorCode::ProfileNotFound, "Profile"))
    }

    async fn stats(&self, user: &UserId) -> Result<ProfileStats, DomainError> {
        let uid = user.as_str();
        let items = Query::select("id").eq("user_id", uid);
        let active = Query::select("id").eq("user_id", uid).is_null("archived_at");
        let wishlist = Query::select("id").eq("user_id", uid);
        let swaps = Query::select("id").any_eq(&["sender_id", "receiver_id"], uid);

        let (items, active_items, wishlist, swaps) = futures::try_join!(
            self.client.count("items", &items),
            self.client.count("items", &active),
            self.client.count("wishlist", &wishlist),
            self.client.count("swaps", &swaps),
        )?;
        Ok(ProfileStats {
            items,
            active_items,
            wishlist,
            swaps,
        })
    }
}
