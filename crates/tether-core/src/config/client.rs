//! Command client configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::serde_utils::duration_millis;
use crate::transport::{ClientOptions, DEFAULT_STATUS_INTERVAL};
use crate::types::SubscriptionKind;

/// Configuration for a command client
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Working directory of the background service (holds the command socket)
    pub working_directory: PathBuf,

    /// Maximum number of log lines kept in memory
    pub log_max_lines: usize,

    /// Interval between status pushes requested from the service
    #[serde(with = "duration_millis")]
    pub status_interval: Duration,

    /// How long to wait for the service to accept a subscription
    #[serde(with = "duration_millis")]
    pub handshake_timeout: Duration,

    /// Retry schedule for connect sequences
    pub retry: RetryPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            working_directory: super::default_working_directory(),
            log_max_lines: 300,
            status_interval: DEFAULT_STATUS_INTERVAL,
            handshake_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

impl ClientConfig {
    /// Subscribe options for `kind` using this configuration
    pub fn options(&self, kind: SubscriptionKind) -> ClientOptions {
        ClientOptions::new(kind).with_status_interval(self.status_interval)
    }
}

/// Linear backoff schedule for a bounded number of connect attempts
///
/// Attempt `i` (0-indexed) is preceded by `initial_delay + i * step`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per connect sequence
    pub max_attempts: u32,

    /// Delay before the first attempt
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,

    /// Added to the delay for every following attempt
    #[serde(with = "duration_millis")]
    pub step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay: Duration::from_millis(100),
            step: Duration::from_millis(50),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit values
    pub fn new(max_attempts: u32, initial_delay: Duration, step: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            step,
        }
    }

    /// Delay to sleep before attempt `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.initial_delay + self.step.saturating_mul(attempt)
    }

    /// Every delay of a full sequence, in order
    pub fn schedule(&self) -> impl Iterator<Item = Duration> + '_ {
        (0..self.max_attempts).map(|attempt| self.delay_for(attempt))
    }

    /// Sum of all delays in a full sequence
    pub fn total_delay(&self) -> Duration {
        self.schedule().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_schedule() {
        let policy = RetryPolicy::default();
        let delays: Vec<u64> = policy
            .schedule()
            .map(|d| d.as_millis() as u64)
            .collect();

        assert_eq!(
            delays,
            vec![100, 150, 200, 250, 300, 350, 400, 450, 500, 550]
        );
        assert_eq!(policy.total_delay(), Duration::from_millis(3250));
    }

    #[test]
    fn test_zero_attempts_has_empty_schedule() {
        let policy = RetryPolicy::new(0, Duration::from_millis(100), Duration::from_millis(50));
        assert_eq!(policy.schedule().count(), 0);
        assert_eq!(policy.total_delay(), Duration::ZERO);
    }

    #[test]
    fn test_default_client_config() {
        let config = ClientConfig::default();
        assert_eq!(config.log_max_lines, 300);
        assert_eq!(config.status_interval, Duration::from_secs(2));
        assert_eq!(config.retry.max_attempts, 10);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ClientConfig = toml::from_str(
            r#"
            log_max_lines = 50

            [retry]
            max_attempts = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.log_max_lines, 50);
        assert_eq!(config.status_interval, Duration::from_secs(2));
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.initial_delay, Duration::from_millis(100));
    }

    #[test]
    fn test_options_carry_status_interval() {
        let config = ClientConfig {
            status_interval: Duration::from_millis(500),
            ..ClientConfig::default()
        };
        let options = config.options(SubscriptionKind::Status);
        assert_eq!(options.status_interval_nanos(), 500_000_000);
    }
}
