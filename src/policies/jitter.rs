//! # Jitter for acquisition waits.
//!
//! Many holders blocked on the same saturated tag are woken by the same
//! release. [`JitterPolicy`] spreads their next attempts so they do not all
//! hit the tag mutex in the same instant.
//!
//! | Policy         | Delay for a base `d`                         |
//! |----------------|----------------------------------------------|
//! | `None`         | `d`                                          |
//! | `Full`         | uniform in `[0, d]`                          |
//! | `Equal`        | `d/2` + uniform in `[0, d/2]`                |
//! | `Decorrelated` | uniform in `[floor, min(3·d, max)]`          |

use rand::Rng;
use std::time::Duration;

/// Randomization applied on top of a backoff delay.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum JitterPolicy {
    /// Exact backoff delay. Suits a single waiter and deterministic tests.
    #[default]
    None,
    /// Anywhere between zero and the base delay.
    Full,
    /// At least half the base delay, at most the whole of it.
    Equal,
    /// Between the policy floor and three times the base, capped at `max`.
    ///
    /// Needs the floor and cap, see [`apply_decorrelated`](Self::apply_decorrelated).
    Decorrelated,
}

impl JitterPolicy {
    /// Jitters `delay`.
    ///
    /// `Decorrelated` has no context here and returns `delay` unchanged.
    pub fn apply(&self, delay: Duration) -> Duration {
        let ms = millis(delay);
        match self {
            JitterPolicy::None | JitterPolicy::Decorrelated => delay,
            JitterPolicy::Full => random_between(0, ms),
            JitterPolicy::Equal => {
                let half = ms / 2;
                random_between(half, ms)
            }
        }
    }

    /// Decorrelated jitter around `prev`, never below `floor` nor above `max`.
    ///
    /// Any other policy falls back to [`apply`](Self::apply) on `prev`.
    pub fn apply_decorrelated(&self, floor: Duration, prev: Duration, max: Duration) -> Duration {
        if *self != JitterPolicy::Decorrelated {
            return self.apply(prev);
        }
        let lo = millis(floor);
        let hi = millis(prev).saturating_mul(3).min(millis(max)).max(lo);
        random_between(lo, hi)
    }
}

fn millis(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

/// Uniform delay in `[lo, hi]` milliseconds; `lo` when the range is empty.
fn random_between(lo: u64, hi: u64) -> Duration {
    if hi <= lo {
        return Duration::from_millis(lo);
    }
    Duration::from_millis(rand::rng().random_range(lo..=hi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_and_zero_are_exact() {
        let d = Duration::from_millis(40);
        assert_eq!(JitterPolicy::None.apply(d), d);
        assert_eq!(JitterPolicy::Full.apply(Duration::ZERO), Duration::ZERO);
        assert_eq!(JitterPolicy::Equal.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn decorrelated_collapses_to_floor_when_range_is_empty() {
        let floor = Duration::from_millis(50);
        let got = JitterPolicy::Decorrelated.apply_decorrelated(
            floor,
            Duration::from_millis(10),
            Duration::from_millis(20),
        );
        assert_eq!(got, floor);
    }
}
