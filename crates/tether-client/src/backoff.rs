//! Linear backoff for connect sequences

use std::time::Duration;

use tether_core::config::RetryPolicy;

/// Linear backoff over a bounded number of attempts
///
/// Yields `initial + attempt * step` for each attempt until the policy's
/// attempt budget is spent.
#[derive(Debug, Clone)]
pub struct LinearBackoff {
    /// Schedule parameters
    policy: RetryPolicy,
    /// Delays handed out so far
    attempt: u32,
}

impl LinearBackoff {
    /// Create a new backoff from a retry policy
    pub fn from_policy(policy: RetryPolicy) -> Self {
        Self { policy, attempt: 0 }
    }

    /// Create a new backoff with custom parameters
    pub fn new(max_attempts: u32, initial: Duration, step: Duration) -> Self {
        Self::from_policy(RetryPolicy::new(max_attempts, initial, step))
    }

    /// Get the delay before the next attempt, or `None` once the budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.attempt >= self.policy.max_attempts {
            return None;
        }

        let delay = self.policy.delay_for(self.attempt);
        self.attempt += 1;
        Some(delay)
    }

    /// Number of delays handed out so far
    pub fn attempts(&self) -> u32 {
        self.attempt
    }

    /// Attempts left in the budget
    pub fn remaining(&self) -> u32 {
        self.policy.max_attempts.saturating_sub(self.attempt)
    }
}
