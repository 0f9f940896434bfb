//! # Time source for lease and record timestamps.
//!
//! The ledger and registry never call `Utc::now()` directly; they read a
//! [`Clock`] handed to them at construction. Production code uses
//! [`SystemClock`]; tests and simulations drive a [`ManualClock`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Source of wall-clock timestamps.
pub trait Clock: Send + Sync + 'static {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Shared clock handle.
pub type ClockRef = Arc<dyn Clock>;

/// Wall clock backed by the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use tagvisor::{Clock, ManualClock};
///
/// let clock = ManualClock::default();
/// let t0 = clock.now();
/// clock.advance(Duration::from_secs(30));
/// assert_eq!((clock.now() - t0).num_seconds(), 30);
/// ```
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        if let Some(next) = now.checked_add_signed(to_chrono(by)) {
            *now = next;
        }
    }

    /// Sets the clock to an absolute instant.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Converts a std duration to a chrono one, saturating at chrono's range.
pub(crate) fn to_chrono(d: Duration) -> chrono::Duration {
    chrono::Duration::from_std(d).unwrap_or(chrono::Duration::MAX)
}

/// `at + d`, or `None` when the sum leaves chrono's representable range.
pub(crate) fn deadline(at: DateTime<Utc>, d: Duration) -> Option<DateTime<Utc>> {
    at.checked_add_signed(to_chrono(d))
}

/// Converts a (possibly negative) chrono duration to std, clamping at zero.
pub(crate) fn to_std(d: chrono::Duration) -> Duration {
    d.to_std().unwrap_or(Duration::ZERO)
}
