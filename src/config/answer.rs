/// Answer channel configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{ConfigError, ConfigResult};
use crate::impl_default;

/// Smallest payload region: must hold an 8-byte int/float answer.
pub const MIN_ANSWER_CAPACITY: usize = 8;

/// How the compute side waits for an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WaitStrategy {
    /// Park on a condvar until the host publishes.
    Blocking,
    /// Sleep for a fixed interval between state checks.
    Polling { interval_ms: u64 },
}

impl Default for WaitStrategy {
    fn default() -> Self {
        WaitStrategy::Blocking
    }
}

/// Answer channel configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    /// Payload region size in bytes; a bytes answer holds at most `capacity - 4`.
    pub capacity_bytes: usize,

    /// Wait strategy.
    #[serde(default)]
    pub wait: WaitStrategy,

    /// Warn (and keep waiting) every time this much time has passed.
    pub slow_wait_warning_ms: u64,

    /// Optional hard timeout; `None` waits forever.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

impl_default!(AnswerConfig {
    capacity_bytes: 65536,
    wait: WaitStrategy::Blocking,
    slow_wait_warning_ms: 1000,
    timeout_ms: None,
});

impl AnswerConfig {
    pub fn slow_wait_warning(&self) -> Duration {
        Duration::from_millis(self.slow_wait_warning_ms)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.capacity_bytes < MIN_ANSWER_CAPACITY {
            return Err(ConfigError::ValidationError(format!(
                "Answer capacity must be at least {} bytes",
                MIN_ANSWER_CAPACITY
            )));
        }
        if self.capacity_bytes > u32::MAX as usize {
            return Err(ConfigError::ValidationError(
                "Answer capacity does not fit the 32-bit length prefix".to_string(),
            ));
        }
        if let WaitStrategy::Polling { interval_ms: 0 } = self.wait {
            return Err(ConfigError::ValidationError(
                "Polling interval must be non-zero".to_string(),
            ));
        }
        if self.slow_wait_warning_ms == 0 {
            return Err(ConfigError::ValidationError(
                "Slow wait warning threshold must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_blocking_without_timeout() {
        let config = AnswerConfig::default();
        assert_eq!(config.wait, WaitStrategy::Blocking);
        assert!(config.timeout().is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let config = AnswerConfig {
            wait: WaitStrategy::Polling { interval_ms: 0 },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tiny_capacity_rejected() {
        let config = AnswerConfig {
            capacity_bytes: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
