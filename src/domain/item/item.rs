//! Listed item entity.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ItemId, OwnedByUser, Timestamp, UserId, ValidationError};

const MAX_TITLE_LEN: usize = 120;

/// A listed (or delisted) item. Rows are soft-deleted via `archived_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(rename = "user_id")]
    pub owner_id: UserId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub trade_for: Option<String>,
    pub created_at: Timestamp,
    /// `None` while listed.
    #[serde(default)]
    pub archived_at: Option<Timestamp>,
}

impl Item {
    pub fn is_listed(&self) -> bool {
        self.archived_at.is_none()
    }

    pub fn summary(&self) -> ItemSummary {
        ItemSummary {
            id: self.id,
            title: Some(self.title.clone()),
            image_url: self.image_url.clone(),
        }
    }

    /// Case-insensitive substring match on title and description.
    pub fn matches_search(&self, query: &str) -> bool {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return true;
        }
        self.title.to_lowercase().contains(&needle)
            || self
                .description
                .as_deref()
                .map(|d| d.to_lowercase().contains(&needle))
                .unwrap_or(false)
    }
}

impl OwnedByUser for Item {
    fn owner_id(&self) -> &UserId {
        &self.owner_id
    }
}

/// Projection of an item embedded in other rows (swaps, wishlist).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemSummary {
    pub id: ItemId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

/// Insert payload for the listing flow.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewItem {
    #[serde(rename = "user_id")]
    pub owner_id: UserId,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trade_for: Option<String>,
}

impl NewItem {
    pub fn new(owner_id: UserId, title: impl Into<String>) -> Result<Self, ValidationError> {
        let title = title.into().trim().to_string();
        if title.is_empty() {
            return Err(ValidationError::empty_field("title"));
        }
        let len = title.chars().count();
        if len > MAX_TITLE_LEN {
            return Err(ValidationError::too_long("title", MAX_TITLE_LEN, len));
        }
        Ok(Self {
            owner_id,
            title,
            description: None,
            image_url: None,
            trade_for: None,
        })
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_trade_for(mut self, trade_for: impl Into<String>) -> Self {
        self.trade_for = Some(trade_for.into());
        self
    }
}
