//! Refresh timing configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Host shell the client runs in. Web shells poll notifications faster
/// because their realtime sockets are dropped more eagerly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    #[default]
    Native,
    Web,
}

impl Platform {
    pub fn default_poll_interval(&self) -> Duration {
        match self {
            Platform::Native => Duration::from_secs(20),
            Platform::Web => Duration::from_secs(12),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub platform: Platform,

    /// Quiet period before a view re-fetches
    #[serde(default = "default_debounce")]
    pub debounce_ms: u64,

    #[serde(default = "default_browse_limit")]
    pub browse_limit: usize,

    #[serde(default = "default_notification_limit")]
    pub notification_limit: usize,

    /// Delay of the second notification fetch after a change
    #[serde(default = "default_notification_recheck")]
    pub notification_recheck_ms: u64,

    #[serde(default = "default_poll_initial_delay")]
    pub poll_initial_delay_ms: u64,

    /// Overrides the platform's poll interval
    #[serde(default)]
    pub poll_interval_secs: Option<u64>,

    /// Refresh the access token this long before it expires
    #[serde(default = "default_token_refresh_margin")]
    pub token_refresh_margin_secs: u64,
}

impl SyncConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn notification_recheck(&self) -> Duration {
        Duration::from_millis(self.notification_recheck_ms)
    }

    pub fn poll_initial_delay(&self) -> Duration {
        Duration::from_millis(self.poll_initial_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval_secs
            .map(Duration::from_secs)
            .unwrap_or_else(|| self.platform.default_poll_interval())
    }

    pub fn token_refresh_margin(&self) -> Duration {
        Duration::from_secs(self.token_refresh_margin_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.debounce_ms == 0 {
            return Err(ValidationError::InvalidInterval("SYNC__DEBOUNCE_MS"));
        }
        if self.poll_interval_secs == Some(0) {
            return Err(ValidationError::InvalidInterval("SYNC__POLL_INTERVAL_SECS"));
        }
        if !(1..=1000).contains(&self.browse_limit) {
            return Err(ValidationError::InvalidLimit("SYNC__BROWSE_LIMIT"));
        }
        if !(1..=1000).contains(&self.notification_limit) {
            return Err(ValidationError::InvalidLimit("SYNC__NOTIFICATION_LIMIT"));
        }
        Ok(())
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            platform: Platform::default(),
            debounce_ms: default_debounce(),
            browse_limit: default_browse_limit(),
            notification_limit: default_notification_limit(),
            notification_recheck_ms: default_notification_recheck(),
            poll_initial_delay_ms: default_poll_initial_delay(),
            poll_interval_secs: None,
            token_refresh_margin_secs: default_token_refresh_margin(),
        }
    }
}

fn default_debounce() -> u64 {
    200
}

fn default_browse_limit() -> usize {
    100
}

fn default_notification_limit() -> usize {
    50
}

fn default_notification_recheck() -> u64 {
    900
}

fn default_poll_initial_delay() -> u64 {
    8000
}

fn default_token_refresh_margin() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_poll_interval_follows_platform() {
        let native = SyncConfig::default();
        assert_eq!(native.poll_interval(), Duration::from_secs(20));

        let web = SyncConfig {
            platform: Platform::Web,
            ..Default::default()
        };
        assert_eq!(web.poll_interval(), Duration::from_secs(12));
    }

    #[test]
    fn test_explicit_poll_interval_wins() {
        let config = SyncConfig {
            platform: Platform::Web,
            poll_interval_secs: Some(45),
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_secs(45));
    }

    #[test]
    fn test_limits_are_bounded() {
        let config = SyncConfig {
            notification_limit: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidLimit("SYNC__NOTIFICATION_LIMIT"))
        );
        assert!(SyncConfig::default().validate().is_ok());
    }

    #[test]
    fn test_platform_deserialization() {
        let platform: Platform = serde_json::from_str("\"web\"").unwrap();
        assert_eq!(platform, Platform::Web);
    }
}
