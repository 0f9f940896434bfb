//! # Backoff between denied acquisition attempts.
//!
//! A waiting [`Limiter::acquire`](crate::Limiter::acquire) sleeps
//! `min(first · factor^n, max)` after its n-th denial (0-based), jittered per
//! [`JitterPolicy`]. The base depends on `n` alone, except under
//! `Decorrelated` jitter, where each delay is drawn from `[first, 3 · prev]`
//! and `prev` is the delay actually slept last time (see [`BackoffPolicy::next_after`]).
//!
//! # Example
//! ```rust
//! use std::time::Duration;
//! use tagvisor::{BackoffPolicy, JitterPolicy};
//!
//! let backoff = BackoffPolicy {
//!     first: Duration::from_millis(50),
//!     max: Duration::from_secs(2),
//!     factor: 2.0,
//!     jitter: JitterPolicy::None,
//! };
//!
//! assert_eq!(backoff.next(0), Duration::from_millis(50));
//! assert_eq!(backoff.next(1), Duration::from_millis(100));
//! assert_eq!(backoff.next(10), Duration::from_secs(2));
//! ```

use std::time::Duration;

use crate::policies::jitter::JitterPolicy;

/// Growth schedule of the waits between acquisition attempts.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    /// Delay after the first denied attempt.
    pub first: Duration,
    /// Maximum delay between attempts.
    pub max: Duration,
    /// Multiplicative growth factor (`>= 1.0` recommended).
    pub factor: f64,
    /// Jitter policy so that waiters on one tag do not retry in lockstep.
    pub jitter: JitterPolicy,
}

impl Default for BackoffPolicy {
    /// Returns a strategy with:
    /// - `factor = 2.0` (doubling);
    /// - `first = 25ms`;
    /// - `max = 1s`;
    /// - `jitter = Equal`.
    fn default() -> Self {
        Self {
            first: Duration::from_millis(25),
            max: Duration::from_secs(1),
            jitter: JitterPolicy::Equal,
            factor: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Jittered delay after the `attempt`-th denial (0-based).
    ///
    /// A `factor` below 1.0 shrinks the delays, 1.0 keeps them at `first`.
    pub fn next(&self, attempt: u32) -> Duration {
        self.next_after(attempt, None)
    }

    /// Like [`next`](Self::next), given the delay slept after the previous
    /// denial. Only `Decorrelated` jitter reads `prev`; without one it starts
    /// from `first`.
    pub fn next_after(&self, attempt: u32, prev: Option<Duration>) -> Duration {
        match self.jitter {
            JitterPolicy::Decorrelated => {
                let floor = self.first.min(self.max);
                self.jitter
                    .apply_decorrelated(floor, prev.unwrap_or(floor), self.max)
            }
            other => other.apply(self.base(attempt)),
        }
    }

    /// Un-jittered delay, `max` when the product overflows or leaves `[0, max]`.
    fn base(&self, attempt: u32) -> Duration {
        let exp = i32::try_from(attempt).unwrap_or(i32::MAX);
        let secs = self.first.as_secs_f64() * self.factor.powi(exp);
        if secs.is_finite() && (0.0..=self.max.as_secs_f64()).contains(&secs) {
            Duration::from_secs_f64(secs)
        } else {
            self.max
        }
    }
}
