//! # Runtime events emitted by the registry, ledger, coordinator and sweeper.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Definition events**: limit created, updated, deleted
//! - **Slot events**: granted, denied, released, renewed, reclaimed
//! - **Runtime events**: sweep completed, shutdown requested
//! - **Subscriber events**: overflow and panic of a subscriber worker
//!
//! The [`Event`] struct carries additional metadata such as timestamps, tag,
//! holder, reasons and lease/overdue durations.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tagvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::SlotReclaimed)
//!     .with_tag("db-write")
//!     .with_holder("run-42")
//!     .with_overdue(Duration::from_secs(3));
//!
//! assert_eq!(ev.kind, EventKind::SlotReclaimed);
//! assert_eq!(ev.tag.as_deref(), Some("db-write"));
//! assert_eq!(ev.overdue_ms, Some(3000));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    // === Definition events ===
    /// A limit definition was created.
    ///
    /// Sets:
    /// - `tag`: limit tag
    /// - `ceiling`: configured ceiling (`0` = unlimited)
    LimitCreated,

    /// The ceiling of an existing definition changed.
    ///
    /// Sets:
    /// - `tag`: limit tag
    /// - `ceiling`: new ceiling
    /// - `held`: slots held at the moment of the change
    LimitUpdated,

    /// A limit definition was deleted; its tag stops admitting new slots.
    ///
    /// Sets:
    /// - `tag`: limit tag
    /// - `held`: slots still draining
    LimitDeleted,

    // === Slot events ===
    /// A slot was granted to a holder.
    ///
    /// Sets:
    /// - `tag`, `holder`
    /// - `held`: slots held after the grant
    /// - `ceiling`: ceiling at grant time
    /// - `lease_ms`: lease duration (absent = no expiry)
    SlotGranted,

    /// An acquisition was denied because the tag is saturated.
    ///
    /// Sets:
    /// - `tag`: the blocking tag
    /// - `holder`
    /// - `held`, `ceiling`
    SlotDenied,

    /// A holder released its slot.
    ///
    /// Sets:
    /// - `tag`, `holder`
    /// - `held`: slots held after the release
    SlotReleased,

    /// A holder extended its lease.
    ///
    /// Sets:
    /// - `tag`, `holder`
    /// - `lease_ms`: new lease duration
    LeaseRenewed,

    /// The sweeper reclaimed an expired slot.
    ///
    /// Sets:
    /// - `tag`, `holder`
    /// - `overdue_ms`: how long past its deadline the lease was
    /// - `held`: slots held after the reclamation
    SlotReclaimed,

    // === Runtime events ===
    /// One sweeper pass finished.
    ///
    /// Sets:
    /// - `held`: number of slots reclaimed in this pass
    SweepCompleted,

    /// Shutdown requested (OS signal observed or explicit call).
    ShutdownRequested,

    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `holder`: subscriber name
    /// - `reason`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `holder`: subscriber name
    /// - `reason`: reason string (e.g., "full", "closed")
    SubscriberOverflow,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Limit tag, if applicable.
    pub tag: Option<Arc<str>>,
    /// Holder (work unit) id, or subscriber name for subscriber events.
    pub holder: Option<Arc<str>>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Ceiling of the tag at the time of the event.
    pub ceiling: Option<u32>,
    /// Held slot count after the event was applied.
    pub held: Option<u32>,
    /// Lease duration in milliseconds (compact).
    pub lease_ms: Option<u64>,
    /// Overdue duration of a reclaimed lease in milliseconds (compact).
    pub overdue_ms: Option<u64>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            tag: None,
            holder: None,
            reason: None,
            ceiling: None,
            held: None,
            lease_ms: None,
            overdue_ms: None,
        }
    }

    /// Attaches a tag.
    #[inline]
    pub fn with_tag(mut self, tag: impl Into<Arc<str>>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    /// Attaches a holder id.
    #[inline]
    pub fn with_holder(mut self, holder: impl Into<Arc<str>>) -> Self {
        self.holder = Some(holder.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the tag ceiling.
    #[inline]
    pub fn with_ceiling(mut self, ceiling: u32) -> Self {
        self.ceiling = Some(ceiling);
        self
    }

    /// Attaches the held slot count.
    #[inline]
    pub fn with_held(mut self, held: u32) -> Self {
        self.held = Some(held);
        self
    }

    /// Attaches a lease duration (stored as milliseconds); `None` leaves it unset.
    #[inline]
    pub fn with_lease(mut self, lease: Option<Duration>) -> Self {
        self.lease_ms = lease.map(millis);
        self
    }

    /// Attaches an overdue duration (stored as milliseconds).
    #[inline]
    pub fn with_overdue(mut self, d: Duration) -> Self {
        self.overdue_ms = Some(millis(d));
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_holder(subscriber)
            .with_reason(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_holder(subscriber)
            .with_reason(info)
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    #[inline]
    pub fn is_subscriber_panic(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberPanicked)
    }
}

fn millis(d: Duration) -> u64 {
    d.as_millis().min(u128::from(u64::MAX)) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = Event::new(EventKind::SlotGranted);
        let b = Event::new(EventKind::SlotReleased);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn no_lease_leaves_field_unset() {
        let ev = Event::new(EventKind::SlotGranted).with_lease(None);
        assert_eq!(ev.lease_ms, None);
        let ev = ev.with_lease(Some(Duration::from_secs(2)));
        assert_eq!(ev.lease_ms, Some(2000));
    }

    #[test]
    fn subscriber_helpers_classify() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert!(ev.is_subscriber_overflow());
        assert!(!ev.is_subscriber_panic());
        assert_eq!(ev.holder.as_deref(), Some("audit"));
    }
}
