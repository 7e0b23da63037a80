//! Reconnect delay policies
//!
//! A shard that loses its connection through a transport error waits before
//! dialing again. The policy decides how long, per attempt, and whether to
//! keep trying at all.

use std::time::Duration;

/// Controls the delay between reconnection attempts
pub trait ReconnectPolicy: Send + Sync {
    /// Delay before attempt number `attempt` (0-indexed)
    ///
    /// `None` means stop reconnecting.
    fn next_delay(&self, attempt: usize) -> Option<Duration>;
}

/// Waits the same amount before every attempt
#[derive(Debug, Clone)]
pub struct FixedDelay {
    delay: Duration,
    max_attempts: Option<usize>,
}

impl FixedDelay {
    pub fn new(delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }
}

impl ReconnectPolicy for FixedDelay {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        match self.max_attempts {
            Some(max) if attempt >= max => None,
            _ => Some(self.delay),
        }
    }
}

/// Doubles the delay per attempt, capped at `max_delay`
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_attempts: Option<usize>,
}

impl ExponentialBackoff {
    pub fn new(initial_delay: Duration, max_delay: Duration, max_attempts: Option<usize>) -> Self {
        Self {
            initial_delay,
            max_delay,
            max_attempts,
        }
    }
}

impl ReconnectPolicy for ExponentialBackoff {
    fn next_delay(&self, attempt: usize) -> Option<Duration> {
        if let Some(max) = self.max_attempts {
            if attempt >= max {
                return None;
            }
        }
        let millis = (self.initial_delay.as_millis() as u64)
            .saturating_mul(2u64.saturating_pow(attempt.min(32) as u32));
        Some(Duration::from_millis(
            millis.min(self.max_delay.as_millis() as u64),
        ))
    }
}
