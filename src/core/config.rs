//! # Global runtime configuration.
//!
//! Provides [`Config`], the centralized settings for a [`Limiter`](crate::Limiter).
//!
//! ## Sentinel values
//! - `sweep_interval = 0s` → sweeper disabled (leases are never reclaimed)
//! - `default_lease = 0s` → slots acquired without an explicit lease never expire
//! - `retry.max_attempts = None` → waiting acquisitions retry until cancelled

use std::time::Duration;

use crate::policies::RetryPolicy;

/// Global configuration for the limiter runtime.
///
/// ## Field semantics
/// - `sweep_interval`: period of the lease expiry sweeper (`0s` = disabled)
/// - `default_lease`: lease applied when the caller passes none (`0s` = no lease)
/// - `max_list_limit`: upper bound on `list_limits` page size (min 1)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `grace`: how long `shutdown` waits for background workers
/// - `retry`: default wait policy of `acquire_set`
///
/// ## Notes
/// All fields are public. Prefer the helper accessors over sentinel checks
/// (`0`) scattered across the codebase.
#[derive(Clone, Debug)]
pub struct Config {
    /// Period between two sweeper passes.
    ///
    /// Each pass lists expired slots tag by tag and reclaims the ones still
    /// expired at removal time.
    pub sweep_interval: Duration,

    /// Lease used when an acquisition does not pass one explicitly.
    pub default_lease: Duration,

    /// Largest page returned by `list_limits`.
    pub max_list_limit: usize,

    /// Capacity of the event bus broadcast channel ring buffer.
    ///
    /// Slow subscribers that lag behind more than `bus_capacity` messages will
    /// receive `Lagged` and skip older items.
    pub bus_capacity: usize,

    /// Maximum time to wait for background workers on shutdown.
    ///
    /// Exceeding it returns `RuntimeError::GraceExceeded`.
    pub grace: Duration,

    /// Default wait/backoff policy for `acquire_set`.
    pub retry: RetryPolicy,
}

impl Config {
    /// Sweeper period as an `Option`.
    ///
    /// - `None` → sweeper disabled
    /// - `Some(d)` → one pass every `d`
    #[inline]
    pub fn sweep_period(&self) -> Option<Duration> {
        if self.sweep_interval.is_zero() {
            None
        } else {
            Some(self.sweep_interval)
        }
    }

    /// Resolves the lease of an acquisition.
    ///
    /// An explicit lease wins; `Some(0s)` means "no expiry". Without one the
    /// configured default applies, with the same zero sentinel.
    #[inline]
    pub fn resolve_lease(&self, explicit: Option<Duration>) -> Option<Duration> {
        let lease = explicit.unwrap_or(self.default_lease);
        if lease.is_zero() { None } else { Some(lease) }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the list page cap clamped to a minimum of 1.
    #[inline]
    pub fn max_list_limit_clamped(&self) -> usize {
        self.max_list_limit.max(1)
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `sweep_interval = 1s`
    /// - `default_lease = 5min`
    /// - `max_list_limit = 200`
    /// - `bus_capacity = 1024`
    /// - `grace = 5s`
    /// - `retry = RetryPolicy::default()` (unbounded, exponential backoff)
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(1),
            default_lease: Duration::from_secs(300),
            max_list_limit: 200,
            bus_capacity: 1024,
            grace: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_sentinels_disable() {
        let cfg = Config {
            sweep_interval: Duration::ZERO,
            default_lease: Duration::ZERO,
            bus_capacity: 0,
            max_list_limit: 0,
            ..Config::default()
        };
        assert_eq!(cfg.sweep_period(), None);
        assert_eq!(cfg.resolve_lease(None), None);
        assert_eq!(cfg.bus_capacity_clamped(), 1);
        assert_eq!(cfg.max_list_limit_clamped(), 1);
    }

    #[test]
    fn explicit_lease_overrides_default() {
        let cfg = Config::default();
        assert_eq!(cfg.resolve_lease(None), Some(Duration::from_secs(300)));
        assert_eq!(
            cfg.resolve_lease(Some(Duration::from_secs(2))),
            Some(Duration::from_secs(2))
        );
        assert_eq!(cfg.resolve_lease(Some(Duration::ZERO)), None);
    }
}
