//! Router configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{NearchatError, NearchatResult};
use crate::proximity::{ProximityPolicy, DEFAULT_RANGE};

/// Default pause between two drain passes for the same user
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_secs(5);

/// Text sent back in every `register_ack`
pub const DEFAULT_REGISTER_ACK: &str = "Registered successfully";

/// Behaviour knobs of the routing core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Inclusive delivery radius in raw coordinate units
    pub range: f64,
    /// Delay before the next drain pass of a user's pending queue
    pub retry_interval: Duration,
    /// Message carried by `register_ack`
    pub register_ack_message: String,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            range: DEFAULT_RANGE,
            retry_interval: DEFAULT_RETRY_INTERVAL,
            register_ack_message: DEFAULT_REGISTER_ACK.to_string(),
        }
    }
}

impl RouterConfig {
    pub fn with_range(mut self, range: f64) -> Self {
        self.range = range;
        self
    }

    pub fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    pub fn proximity(&self) -> ProximityPolicy {
        ProximityPolicy::new(self.range)
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> NearchatResult<()> {
        if !self.range.is_finite() || self.range < 0.0 {
            return Err(NearchatError::InvalidConfiguration {
                reason: format!("range must be a finite, non-negative number, got {}", self.range),
            });
        }
        if self.retry_interval.is_zero() {
            return Err(NearchatError::InvalidConfiguration {
                reason: "retry interval must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RouterConfig::default();
        assert_eq!(config.range, 200.0);
        assert_eq!(config.retry_interval, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let config = RouterConfig::default().with_range(-1.0);
        assert!(config.validate().is_err());

        let config = RouterConfig::default().with_range(f64::NAN);
        assert!(config.validate().is_err());

        let config = RouterConfig::default().with_retry_interval(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
