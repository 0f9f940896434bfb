//! # Retry policy for waiting acquisitions.
//!
//! [`RetryPolicy`] bundles a [`BackoffPolicy`] with an optional cap on the
//! number of denied attempts before the waiting helper gives up and hands the
//! last `Denied` back to the caller.

use std::time::Duration;

use crate::policies::BackoffPolicy;

/// How a waiting acquisition paces and bounds its attempts.
#[derive(Clone, Copy, Debug, Default)]
pub struct RetryPolicy {
    /// Delay schedule between denied attempts.
    pub backoff: BackoffPolicy,
    /// Maximum number of attempts (`None` = until cancelled).
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Policy that retries until cancelled.
    pub fn unlimited(backoff: BackoffPolicy) -> Self {
        Self {
            backoff,
            max_attempts: None,
        }
    }

    /// Policy that gives up after `attempts` denied attempts (minimum 1).
    pub fn bounded(backoff: BackoffPolicy, attempts: u32) -> Self {
        Self {
            backoff,
            max_attempts: Some(attempts.max(1)),
        }
    }

    /// Delay to sleep after `attempt` denied attempts (1-based), or `None`
    /// when the attempt budget is spent. `prev` is the delay slept after the
    /// previous denial, if any.
    pub fn delay_after(&self, attempt: u32, prev: Option<Duration>) -> Option<Duration> {
        if let Some(max) = self.max_attempts
            && attempt >= max
        {
            return None;
        }
        Some(self.backoff.next_after(attempt.saturating_sub(1), prev))
    }
}
