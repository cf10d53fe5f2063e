//! Capped exponential backoff for reconnection attempts

use std::time::Duration;

/// Reconnection backoff state
///
/// Delay for attempt `n` (1-based) is `min(base_delay * 2^(n-1), max_delay)`.
/// The attempt counter is reset on every successful connect and increases by
/// one for every scheduled retry.
///
/// With `max_attempts == None` the policy never gives up (the delay just
/// stays at `max_delay`). With `Some(limit)`, [`next_delay`](Self::next_delay)
/// returns `None` once `limit` retries have been scheduled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectPolicy {
    base_delay: Duration,
    max_delay: Duration,
    attempt_count: u32,
    max_attempts: Option<u32>,
}

impl ReconnectPolicy {
    /// Unbounded policy (keeps retrying forever)
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            base_delay,
            max_delay,
            attempt_count: 0,
            max_attempts: None,
        }
    }

    /// Policy that gives up after `max_attempts` scheduled retries
    pub fn bounded(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            ..Self::new(base_delay, max_delay)
        }
    }

    /// Delay for a given 1-based attempt number, independent of current state
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u32.checked_pow(exponent).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Count one more attempt and return its delay
    ///
    /// Returns `None` without counting when the attempt ceiling is reached.
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempt_count = self.attempt_count.saturating_add(1);
        Some(self.delay_for(self.attempt_count))
    }

    /// Forget previous attempts (called on successful connect)
    pub fn reset(&mut self) {
        self.attempt_count = 0;
    }

    /// Number of retries scheduled since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempt_count
    }

    /// Attempt ceiling, `None` when unbounded
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Whether the ceiling has been reached
    pub fn is_exhausted(&self) -> bool {
        self.max_attempts
            .is_some_and(|limit| self.attempt_count >= limit)
    }

    pub fn base_delay(&self) -> Duration {
        self.base_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}
