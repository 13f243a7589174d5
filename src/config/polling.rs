// ABOUTME: Stack status polling settings: interval, overall timeout and transient retry budget.
// ABOUTME: Durations accept humantime strings such as "10s" or "30m".

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::error::{ConfigError, Result};

pub const DEFAULT_MAX_TRANSIENT_RETRIES: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackPolling {
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,
    #[serde(default = "default_max_transient_retries")]
    pub max_transient_retries: u32,
}

impl StackPolling {
    pub const KEYS: &'static [&'static str] = &["interval", "timeout", "maxTransientRetries"];

    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(ConfigError::invalid(
                "stackPolling.interval",
                "interval must be greater than zero",
            ));
        }
        if self.timeout < self.interval {
            return Err(ConfigError::invalid(
                "stackPolling.timeout",
                "timeout must not be shorter than interval",
            ));
        }
        Ok(())
    }
}

impl Default for StackPolling {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            timeout: default_timeout(),
            max_transient_retries: default_max_transient_retries(),
        }
    }
}

fn default_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_timeout() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_max_transient_retries() -> u32 {
    DEFAULT_MAX_TRANSIENT_RETRIES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_humantime_durations() {
        let polling: StackPolling =
            serde_yaml::from_str("interval: 5s\ntimeout: 1h\n").unwrap();
        assert_eq!(polling.interval, Duration::from_secs(5));
        assert_eq!(polling.timeout, Duration::from_secs(3600));
        assert_eq!(polling.max_transient_retries, DEFAULT_MAX_TRANSIENT_RETRIES);
    }

    #[test]
    fn timeout_shorter_than_interval_rejected() {
        let polling = StackPolling {
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(10),
            ..Default::default()
        };
        let err = polling.validate().unwrap_err();
        assert_eq!(err.path(), Some("stackPolling.timeout"));
    }
}
