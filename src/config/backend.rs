//! Hosted backend configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Project URL, anon key and storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    /// Project URL, e.g. `https://abc.supabase.co`
    pub url: String,

    /// Public anon key sent as `apikey`
    pub anon_key: SecretString,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Bucket receiving avatar uploads
    #[serde(default = "default_avatar_bucket")]
    pub avatar_bucket: String,
}

impl BackendConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    fn is_local(&self) -> bool {
        let host = self
            .url
            .trim_start_matches("http://")
            .trim_start_matches("https://");
        host.starts_with("localhost") || host.starts_with("127.0.0.1")
    }

    /// Validate backend configuration
    ///
    /// Plain HTTP is only accepted for a local stack.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.url.is_empty() {
            return Err(ValidationError::MissingRequired("BACKEND__URL"));
        }
        if !self.url.starts_with("http://") && !self.url.starts_with("https://") {
            return Err(ValidationError::InvalidBackendUrl);
        }
        if self.url.starts_with("http://") && !self.is_local() {
            return Err(ValidationError::BackendMustBeHttps);
        }
        if self.anon_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("BACKEND__ANON_KEY"));
        }
        if self.request_timeout_secs == 0 || self.request_timeout_secs > 300 {
            return Err(ValidationError::InvalidTimeout);
        }
        if self.avatar_bucket.is_empty() {
            return Err(ValidationError::MissingRequired("BACKEND__AVATAR_BUCKET"));
        }
        Ok(())
    }
}

fn default_request_timeout() -> u64 {
    15
}

fn default_avatar_bucket() -> String {
    "user-photos".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> BackendConfig {
        BackendConfig {
            url: url.to_string(),
            anon_key: SecretString::new("anon".to_string()),
            request_timeout_secs: default_request_timeout(),
            avatar_bucket: default_avatar_bucket(),
        }
    }

    #[test]
    fn test_https_url_is_valid() {
        assert!(config("https://abc.supabase.co").validate().is_ok());
    }

    #[test]
    fn test_plain_http_only_for_localhost() {
        assert!(config("http://localhost:54321").validate().is_ok());
        assert!(config("http://127.0.0.1:54321").validate().is_ok());
        assert_eq!(
            config("http://abc.supabase.co").validate(),
            Err(ValidationError::BackendMustBeHttps)
        );
    }

    #[test]
    fn test_rejects_missing_scheme_and_key() {
        assert_eq!(
            config("abc.supabase.co").validate(),
            Err(ValidationError::InvalidBackendUrl)
        );

        let mut no_key = config("https://abc.supabase.co");
        no_key.anon_key = SecretString::new(String::new());
        assert_eq!(
            no_key.validate(),
            Err(ValidationError::MissingRequired("BACKEND__ANON_KEY"))
        );
    }

    #[test]
    fn test_rejects_zero_timeout() {
        let mut cfg = config("https://abc.supabase.co");
        cfg.request_timeout_secs = 0;
        assert_eq!(cfg.validate(), Err(ValidationError::InvalidTimeout));
    }
}
