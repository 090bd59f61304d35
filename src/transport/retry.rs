//! Retry policies for reachability polling and session attempts.
//!
//! A policy is a value, not a loop: callers ask a [`RetryTracker`] whether
//! another attempt is allowed and how long to wait before it. The default
//! policy never gives up, matching a consumer that waits for its producer
//! to come online.

use std::time::Duration;

use crate::core::DEFAULT_RETRY_DELAY;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Retry immediately.
    None,
    /// Same delay before every retry.
    Constant(Duration),
    /// `initial * factor^(n-1)` before retry `n`, capped at `max`.
    Exponential {
        /// Delay before the first retry.
        initial: Duration,
        /// Upper bound on any delay.
        max: Duration,
        /// Growth factor per retry.
        factor: u32,
    },
}

impl Backoff {
    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        match *self {
            Self::None => Duration::ZERO,
            Self::Constant(delay) => delay,
            Self::Exponential {
                initial,
                max,
                factor,
            } => {
                let exponent = retry.saturating_sub(1);
                factor
                    .checked_pow(exponent)
                    .and_then(|scale| initial.checked_mul(scale))
                    .map_or(max, |delay| delay.min(max))
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::Constant(DEFAULT_RETRY_DELAY)
    }
}

/// Bounded or unbounded retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RetryPolicy {
    /// Total attempts allowed (`None` = unbounded).
    max_attempts: Option<u32>,
    /// Delay schedule between attempts.
    backoff: Backoff,
}

impl RetryPolicy {
    /// Retry forever.
    pub const fn unbounded(backoff: Backoff) -> Self {
        Self {
            max_attempts: None,
            backoff,
        }
    }

    /// Allow at most `max_attempts` attempts in total.
    pub const fn bounded(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff,
        }
    }

    /// Total attempts allowed, if bounded.
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Delay schedule.
    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Check if the policy can ever allow an attempt.
    pub fn is_satisfiable(&self) -> bool {
        self.max_attempts != Some(0)
    }

    /// Start tracking a fresh sequence of attempts.
    pub fn tracker(&self) -> RetryTracker {
        RetryTracker {
            policy: *self,
            attempts: 0,
        }
    }
}

/// Attempt counter for one [`RetryPolicy`].
#[derive(Debug, Clone)]
pub struct RetryTracker {
    policy: RetryPolicy,
    attempts: u32,
}

impl RetryTracker {
    /// Check if another attempt is allowed.
    pub fn should_retry(&self) -> bool {
        self.policy
            .max_attempts
            .is_none_or(|max| self.attempts < max)
    }

    /// Record the start of an attempt and return its 1-based number, or
    /// `None` if the policy is exhausted.
    pub fn begin(&mut self) -> Option<u32> {
        if !self.should_retry() {
            return None;
        }
        self.attempts = self.attempts.saturating_add(1);
        Some(self.attempts)
    }

    /// Delay to wait before the next attempt.
    pub fn next_delay(&self) -> Duration {
        if self.attempts == 0 {
            Duration::ZERO
        } else {
            self.policy.backoff.delay(self.attempts)
        }
    }

    /// Attempts started so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Reset the counter.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }
}
