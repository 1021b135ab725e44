//! Reconnect policy for a dropped event stream.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bounded exponential backoff between reconnect attempts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum consecutive reconnect attempts before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first reconnect in milliseconds
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Maximum delay between reconnects in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier (delay *= multiplier after each attempt)
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_max_attempts() -> u32 {
    5
}
fn default_initial_delay() -> u64 {
    500
}
fn default_max_delay() -> u64 {
    10000
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl RetryPolicy {
    /// No reconnects at all
    pub fn none() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    /// Calculate delay for a specific attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::from_millis(self.initial_delay_ms.min(self.max_delay_ms));
        }

        let delay = self.initial_delay_ms as f64
            * self.backoff_multiplier.powi((attempt - 1) as i32);

        let capped = delay.min(self.max_delay_ms as f64) as u64;
        Duration::from_millis(capped)
    }

    /// Backoff delay, raised to the server's `retry:` hint when it asks
    /// for longer. Never exceeds `max_delay_ms`.
    pub fn delay_with_hint(&self, attempt: u32, server_hint_ms: Option<u64>) -> Duration {
        let backoff = self.delay_for_attempt(attempt);
        match server_hint_ms {
            Some(hint) => backoff.max(Duration::from_millis(hint.min(self.max_delay_ms))),
            None => backoff,
        }
    }

    /// Whether reconnect number `attempt` (1-indexed) is within budget
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt <= self.max_attempts
    }
}
