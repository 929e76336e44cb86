//! Log output configuration

use serde::Deserialize;

use super::error::ValidationError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directives; `RUST_LOG` applies when unset
    #[serde(default)]
    pub filter: Option<String>,

    /// Emit JSON lines instead of human-readable output
    #[serde(default)]
    pub json: bool,
}

impl LoggingConfig {
    /// Directives to build the subscriber's filter from.
    pub fn directives(&self) -> String {
        self.filter
            .clone()
            .or_else(|| std::env::var("RUST_LOG").ok())
            .unwrap_or_else(|| "info,swapsync=debug".to_string())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.filter {
            Some(filter) if filter.trim().is_empty() => {
                Err(ValidationError::InvalidLogFilter(filter.clone()))
            }
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_explicit_filter_wins() {
        let config = LoggingConfig {
            filter: Some("warn".to_string()),
            json: false,
        };
        assert_eq!(config.directives(), "warn");
    }

    #[test]
    fn test_blank_filter_rejected() {
        let config = LoggingConfig {
            filter: Some("  ".to_string()),
            json: true,
        };
        assert!(config.validate().is_err());
    }
}
