//! Feature flags configuration

use serde::Deserialize;

/// Feature flags for enabling/disabling functionality
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureFlags {
    /// Log realtime channel status at debug instead of trace
    #[serde(default)]
    pub verbose_realtime: bool,

    /// Poll the notification feed while the app is in the foreground
    #[serde(default = "default_notification_polling")]
    pub notification_polling: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            verbose_realtime: false,
            notification_polling: default_notification_polling(),
        }
    }
}

fn default_notification_polling() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feature_flags_defaults() {
        let flags = FeatureFlags::default();
        assert!(!flags.verbose_realtime);
        assert!(flags.notification_polling);
    }

    #[test]
    fn test_feature_flags_deserialization() {
        let json = r#"{ "verbose_realtime": true }"#;

        let flags: FeatureFlags = serde_json::from_str(json).unwrap();
        assert!(flags.verbose_realtime);
        assert!(flags.notification_polling);
    }
}
