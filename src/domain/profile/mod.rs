//! User profiles. Keyed by the owning user's id and mutated only by them.

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::foundation::{OwnedByUser, Timestamp, UserId, ValidationError};

const MAX_BIO_LEN: usize = 300;
const MAX_INTERESTS: usize = 20;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: UserId,
    #[serde(default, rename = "full_name")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub interests: Vec<String>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub push_enabled: bool,
    #[serde(default)]
    pub push_token: Option<String>,
    #[serde(default)]
    pub rating_avg: Option<f64>,
    #[serde(default)]
    pub rating_count: Option<i64>,
}

impl Profile {
    /// A blank profile as created by the sign-up trigger.
    pub fn empty(id: UserId) -> Self {
        Self {
            id,
            display_name: None,
            avatar_url: None,
            bio: None,
            interests: Vec::new(),
            push_enabled: false,
            push_token: None,
            rating_avg: None,
            rating_count: None,
        }
    }

    /// Average rating clamped to the 0-5 star range.
    pub fn stars(&self) -> f64 {
        self.rating_avg.unwrap_or(0.0).clamp(0.0, 5.0)
    }

    pub fn review_count(&self) -> i64 {
        self.rating_count.unwrap_or(0).max(0)
    }

    /// Applies an update locally, mirroring what the backend will store.
    pub fn apply(&mut self, update: &ProfileUpdate) {
        if let Some(name) = &update.display_name {
            self.display_name = Some(name.clone());
        }
        if let Some(url) = &update.avatar_url {
            self.avatar_url = Some(url.clone());
        }
        if let Some(bio) = &update.bio {
            self.bio = Some(bio.clone());
        }
        if let Some(interests) = &update.interests {
            self.interests = interests.clone();
        }
        if let Some(enabled) = update.push_enabled {
            self.push_enabled = enabled;
        }
        if let Some(token) = &update.push_token {
            self.push_token = Some(token.clone());
        }
    }
}

impl OwnedByUser for Profile {
    fn owner_id(&self) -> &UserId {
        &self.id
    }
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(rename = "full_name", skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interests: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self == &ProfileUpdate::default()
    }

    /// Trims text fields and drops blank interests.
    pub fn normalized(mut self) -> Result<Self, ValidationError> {
        if let Some(name) = self.display_name.take() {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(ValidationError::empty_field("full_name"));
            }
            self.display_name = Some(name);
        }
        if let Some(bio) = self.bio.take() {
            let bio = bio.trim().to_string();
            let len = bio.chars().count();
            if len > MAX_BIO_LEN {
                return Err(ValidationError::too_long("bio", MAX_BIO_LEN, len));
            }
            self.bio = Some(bio);
        }
        if let Some(interests) = self.interests.take() {
            let mut cleaned: Vec<String> = interests
                .into_iter()
                .map(|i| i.trim().to_string())
                .filter(|i| !i.is_empty())
                .collect();
            cleaned.dedup();
            if cleaned.len() > MAX_INTERESTS {
                return Err(ValidationError::too_long(
                    "interests",
                    MAX_INTERESTS,
                    cleaned.len(),
                ));
            }
            self.interests = Some(cleaned);
        }
        Ok(self)
    }
}

/// Activity counters shown on the profile screen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileStats {
    /// All items ever listed, archived included.
    pub items: u64,
    /// Items currently listed.
    pub active_items: u64,
    pub wishlist: u64,
    /// Swaps where the user is sender or receiver.
    pub swaps: u64,
}

/// Storage path for a new avatar: `{user}/{millis}-{suffix}.jpg`.
///
/// The per-user prefix is what the bucket's access policy keys on.
pub fn avatar_path(user_id: &UserId, at: Timestamp, suffix: &str) -> String {
    format!("{}/{}-{}.jpg", user_id, at.as_unix_millis(), suffix)
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

fn null_as_false<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_sparse_row() {
        let row = json!({
            "id": "u-1",
            "full_name": "Sam",
            "interests": null,
            "push_enabled": null,
            "rating_avg": 7.5,
            "rating_count": 3
        });

        let profile: Profile = serde_json::from_value(row).unwrap();
        assert_eq!(profile.display_name.as_deref(), Some("Sam"));
        assert!(profile.interests.is_empty());
        assert!(!profile.push_enabled);
        assert_eq!(profile.stars(), 5.0);
        assert_eq!(profile.review_count(), 3);
    }

    #[test]
    fn update_serializes_only_present_fields() {
        let update = ProfileUpdate {
            bio: Some("Hi".into()),
            push_enabled: Some(true),
            ..Default::default()
        };
        let json = serde_json::to_value(&update).unwrap();
        assert_eq!(json, json!({ "bio": "Hi", "push_enabled": true }));
    }

    #[test]
    fn normalized_trims_and_filters_interests() {
        let update = ProfileUpdate {
            display_name: Some("  Sam ".into()),
            interests: Some(vec![" vinyl ".into(), "".into(), "bikes".into()]),
            ..Default::default()
        }
        .normalized()
        .unwrap();

        assert_eq!(update.display_name.as_deref(), Some("Sam"));
        assert_eq!(update.interests, Some(vec!["vinyl".to_string(), "bikes".to_string()]));
    }

    #[test]
    fn normalized_rejects_blank_name() {
        let update = ProfileUpdate {
            display_name: Some("   ".into()),
            ..Default::default()
        };
        assert!(update.normalized().is_err());
    }

    #[test]
    fn apply_leaves_absent_fields() {
        let mut profile = Profile::empty(UserId::new("u").unwrap());
        profile.bio = Some("old".into());
        profile.apply(&ProfileUpdate {
            display_name: Some("New".into()),
            ..Default::default()
        });
        assert_eq!(profile.display_name.as_deref(), Some("New"));
        assert_eq!(profile.bio.as_deref(), Some("old"));
    }

    #[test]
    fn avatar_path_is_prefixed_by_user() {
        let user = UserId::new("u-9").unwrap();
        let path = avatar_path(&user, Timestamp::from_unix_millis(42), "abc");
        assert_eq!(path, "u-9/42-abc.jpg");
    }
}
