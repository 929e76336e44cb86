//! Realtime channel configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct RealtimeConfig {
    /// Wait before re-joining an unhealthy channel
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_ms: u64,

    /// Socket heartbeat period
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// How long a join waits for the server's reply
    #[serde(default = "default_join_timeout")]
    pub join_timeout_secs: u64,
}

impl RealtimeConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn join_timeout(&self) -> Duration {
        Duration::from_secs(self.join_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.reconnect_delay_ms == 0 {
            return Err(ValidationError::InvalidInterval("REALTIME__RECONNECT_DELAY_MS"));
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(ValidationError::InvalidInterval(
                "REALTIME__HEARTBEAT_INTERVAL_SECS",
            ));
        }
        if self.join_timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            join_timeout_secs: default_join_timeout(),
        }
    }
}

fn default_reconnect_delay() -> u64 {
    800
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_join_timeout() -> u64 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_realtime_defaults() {
        let config = RealtimeConfig::default();
        assert_eq!(config.reconnect_delay(), Duration::from_millis(800));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_reconnect_delay_rejected() {
        let config = RealtimeConfig {
            reconnect_delay_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
