//! Own profile: details, avatar, push registration and activity counts.

use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::sync::{perform_optimistic_update, RefetchOnChange};
use crate::domain::foundation::Timestamp;
use crate::domain::profile::{avatar_path, Profile, ProfileStats, ProfileUpdate};
use crate::domain::sync::{ChangeTopic, SyncError};

use super::{refetch_on, Services};

/// An image picked for the avatar, already encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl AvatarUpload {
    pub fn jpeg(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            content_type: "image/jpeg".to_string(),
        }
    }
}

#[derive(Default)]
struct ProfileState {
    profile: Option<Profile>,
    stats: ProfileStats,
}

pub struct ProfileView {
    services: Services,
    state: Mutex<ProfileState>,
    _profile_refetch: RefetchOnChange,
    _stats_refetch: RefetchOnChange,
}

impl ProfileView {
    pub fn new(services: Services) -> Arc<Self> {
        Arc::new_cyclic(|weak| {
            let profile_refetch = refetch_on(
                &services,
                "profile",
                &[ChangeTopic::ProfileChanged],
                weak,
                |view: Arc<ProfileView>| async move { view.refresh().await },
            );
            let stats_refetch = refetch_on(
                &services,
                "profile_stats",
                &[
                    ChangeTopic::ItemsChanged,
                    ChangeTopic::WishlistChanged,
                    ChangeTopic::SwapsChanged,
                ],
                weak,
                |view: Arc<ProfileView>| async move { view.refresh_stats().await },
            );
            Self {
                services,
                state: Mutex::new(ProfileState::default()),
                _profile_refetch: profile_refetch,
                _stats_refetch: stats_refetch,
            }
        })
    }

    fn state(&self) -> MutexGuard<'_, ProfileState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Loads the profile and its counters.
    ///
    /// A user without a profile row yet sees a blank profile.
    pub async fn refresh(&self) -> Result<(), SyncError> {
        let user = match self.services.require_user() {
            Ok(user) => user,
            Err(e) => {
                *self.state() = ProfileState::default();
                return Err(e);
            }
        };
        debug!(user = %user, "refreshing profile");

        let profile = self
            .services
            .profiles
            .find(&user)
            .await?
            .unwrap_or_else(|| Profile::empty(user.clone()));
        let stats = self.services.profiles.stats(&user).await?;

        let mut state = self.state();
        state.profile = Some(profile);
        state.stats = stats;
        Ok(())
    }

    pub async fn refresh_stats(&self) -> Result<(), SyncError> {
        let user = self.services.require_user()?;
        let stats = self.services.profiles.stats(&user).await?;
        self.state().stats = stats;
        Ok(())
    }

    pub fn profile(&self) -> Option<Profile> {
        self.state().profile.clone()
    }

    pub fn stats(&self) -> ProfileStats {
        self.state().stats
    }

    /// Saves a partial update, showing it before the backend confirms.
    pub async fn update(&self, update: ProfileUpdate) -> Result<Profile, SyncError> {
        let user = self.services.require_user()?;
        let update = update
            .normalized()
            .map_err(|e| SyncError::InvalidTransition(e.to_string()))?;
        if update.is_empty() {
            return self
                .profile()
                .ok_or_else(|| SyncError::not_found("Profile"));
        }

        let saved = perform_optimistic_update(
            || {
                let mut state = self.state();
                let previous = state.profile.clone();
                if let Some(profile) = state.profile.as_mut() {
                    profile.apply(&update);
                }
                previous
            },
            || async {
                self.services
                    .profiles
                    .update(&user, &update)
                    .await
                    .map_err(SyncError::from)
            },
            |previous| self.state().profile = previous,
        )
        .await?;

        self.state().profile = Some(saved.clone());
        info!(user = %user, "profile updated");
        self.services.emit(ChangeTopic::ProfileChanged);
        Ok(saved)
    }

    /// Uploads a new avatar under the user's prefix and points the profile
    /// at it. Returns the public URL.
    pub async fn upload_avatar(&self, upload: AvatarUpload) -> Result<String, SyncError> {
        let user = self.services.require_user()?;
        if upload.bytes.is_empty() {
            return Err(SyncError::InvalidTransition("the picked image is empty".into()));
        }

        let bucket = self.services.settings.avatar_bucket.as_str();
        let path = avatar_path(&user, Timestamp::now(), &Uuid::new_v4().simple().to_string());
        self.services
            .storage
            .upload(bucket, &path, upload.bytes, &upload.content_type)
            .await?;
        let url = self.services.storage.public_url(bucket, &path);
        debug!(path = %path, "avatar uploaded");

        self.update(ProfileUpdate {
            avatar_url: Some(url.clone()),
            ..ProfileUpdate::default()
        })
        .await?;
        Ok(url)
    }

    /// Turns push on or off. Turning it on also registers the device
    /// token; if permission is denied push stays off.
    ///
    /// Returns whether push ended up enabled.
    pub async fn set_push_enabled(&self, enabled: bool) -> Result<bool, SyncError> {
        self.services.require_user()?;
        if enabled {
            return Ok(self.register_push_token().await?.is_some());
        }
        self.update(ProfileUpdate {
            push_enabled: Some(false),
            ..ProfileUpdate::default()
        })
        .await?;
        Ok(false)
    }

    /// Asks for permission and stores this device's token on the profile.
    ///
    /// `None` when the user declined.
    pub async fn register_push_token(&self) -> Result<Option<String>, SyncError> {
        let user = self.services.require_user()?;
        if !self.services.push.request_permission().await? {
            info!(user = %user, "push permission denied");
            return Ok(None);
        }
        let token = self.services.push.device_token().await?;
        self.update(ProfileUpdate {
            push_enabled: Some(true),
            push_token: Some(token.clone()),
            ..ProfileUpdate::default()
        })
        .await?;
        Ok(Some(token))
    }
}
