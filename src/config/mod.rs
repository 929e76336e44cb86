//! Application configuration module
//!
//! This module provides type-safe configuration loading from environment variables
//! using the `config` and `dotenvy` crates. Configuration is loaded with the
//! `SWAPSYNC` prefix and nested values use double underscores as separators.
//!
//! # Example
//!
//! ```no_run
//! use swapsync::config::AppConfig;
//!
//! let config = AppConfig::load().expect("Failed to load configuration");
//! config.validate().expect("Invalid configuration");
//!
//! println!("Backend at {}", config.backend.url);
//! ```

mod backend;
mod error;
mod features;
mod logging;
mod realtime;
mod sync;

pub use backend::BackendConfig;
pub use error::{ConfigError, ValidationError};
pub use features::FeatureFlags;
pub use logging::LoggingConfig;
pub use realtime::RealtimeConfig;
pub use sync::{Platform, SyncConfig};

use serde::Deserialize;

use crate::adapters::supabase::{RealtimeSettings, SupabaseConfig};
use crate::application::SyncSettings;
use secrecy::ExposeSecret;

/// Root application configuration
///
/// Load using [`AppConfig::load()`] which reads from environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Hosted backend (URL, anon key, storage bucket)
    pub backend: BackendConfig,

    /// Realtime channel timing
    #[serde(default)]
    pub realtime: RealtimeConfig,

    /// Refresh, debounce and polling timing
    #[serde(default)]
    pub sync: SyncConfig,

    /// Log output
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Feature flags
    #[serde(default)]
    pub features: FeatureFlags,
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// This function:
    /// 1. Loads `.env` file if present (for development)
    /// 2. Reads environment variables with `SWAPSYNC` prefix
    /// 3. Uses `__` (double underscore) to separate nested values
    /// 4. Deserializes into typed configuration structs
    ///
    /// # Environment Variable Format
    ///
    /// - `SWAPSYNC__BACKEND__URL=...` -> `backend.url = ...`
    /// - `SWAPSYNC__SYNC__PLATFORM=web` -> `sync.platform = web`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Required environment variables are missing
    /// - Values cannot be parsed into expected types
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file if present (development)
        dotenvy::dotenv().ok();

        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("SWAPSYNC")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Validate all configuration values
    ///
    /// # Errors
    ///
    /// Returns `ValidationError` if any configuration value is invalid.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.backend.validate()?;
        self.realtime.validate()?;
        self.sync.validate()?;
        self.logging.validate()?;
        Ok(())
    }

    /// Tunables handed to every view.
    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            debounce: self.sync.debounce(),
            browse_limit: self.sync.browse_limit,
            notification_limit: self.sync.notification_limit,
            notification_recheck: self.sync.notification_recheck(),
            poll_initial_delay: self.sync.poll_initial_delay(),
            poll_interval: self.sync.poll_interval(),
            polling_enabled: self.features.notification_polling,
            reconnect_delay: self.realtime.reconnect_delay(),
            verbose_realtime: self.features.verbose_realtime,
            avatar_bucket: self.backend.avatar_bucket.clone(),
            token_refresh_margin: self.sync.token_refresh_margin(),
            ..SyncSettings::default()
        }
    }

    pub fn supabase(&self) -> SupabaseConfig {
        SupabaseConfig::new(&self.backend.url, self.backend.anon_key.expose_secret().as_str())
            .with_timeout(self.backend.request_timeout())
    }

    pub fn realtime_settings(&self) -> RealtimeSettings {
        RealtimeSettings {
            heartbeat_interval: self.realtime.heartbeat_interval(),
            join_timeout: self.realtime.join_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;
    use std::time::Duration;

    // Mutex to ensure tests don't run in parallel (env vars are global)
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn set_minimal_env() {
        env::set_var("SWAPSYNC__BACKEND__URL", "https://abc.supabase.co");
        env::set_var("SWAPSYNC__BACKEND__ANON_KEY", "anon-key");
    }

    fn clear_env() {
        env::remove_var("SWAPSYNC__BACKEND__URL");
        env::remove_var("SWAPSYNC__BACKEND__ANON_KEY");
        env::remove_var("SWAPSYNC__SYNC__PLATFORM");
        env::remove_var("SWAPSYNC__SYNC__DEBOUNCE_MS");
        env::remove_var("SWAPSYNC__FEATURES__NOTIFICATION_POLLING");
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        assert!(result.is_ok(), "Failed to load config: {:?}", result.err());
        let config = result.unwrap();
        assert_eq!(config.backend.url, "https://abc.supabase.co");
        assert_eq!(config.backend.anon_key.expose_secret(), "anon-key");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_defaults_match_sync_settings() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let settings = result.unwrap().sync_settings();
        let defaults = SyncSettings::default();
        assert_eq!(settings.debounce, defaults.debounce);
        assert_eq!(settings.notification_recheck, defaults.notification_recheck);
        assert_eq!(settings.poll_interval, defaults.poll_interval);
        assert_eq!(settings.reconnect_delay, defaults.reconnect_delay);
        assert_eq!(settings.avatar_bucket, defaults.avatar_bucket);
        assert!(settings.polling_enabled);
    }

    #[test]
    fn test_web_platform_and_overrides() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        env::set_var("SWAPSYNC__SYNC__PLATFORM", "web");
        env::set_var("SWAPSYNC__SYNC__DEBOUNCE_MS", "350");
        env::set_var("SWAPSYNC__FEATURES__NOTIFICATION_POLLING", "false");
        let result = AppConfig::load();
        clear_env();

        let settings = result.unwrap().sync_settings();
        assert_eq!(settings.poll_interval, Duration::from_secs(12));
        assert_eq!(settings.debounce, Duration::from_millis(350));
        assert!(!settings.polling_enabled);
    }

    #[test]
    fn test_missing_backend_fails() {
        let _guard = ENV_MUTEX.lock().unwrap();
        clear_env();
        assert!(AppConfig::load().is_err());
    }

    #[test]
    fn test_supabase_config_uses_timeout() {
        let _guard = ENV_MUTEX.lock().unwrap();
        set_minimal_env();
        let result = AppConfig::load();
        clear_env();

        let supabase = result.unwrap().supabase();
        assert_eq!(supabase.timeout, Duration::from_secs(15));
        assert_eq!(supabase.anon_key(), "anon-key");
    }
}
