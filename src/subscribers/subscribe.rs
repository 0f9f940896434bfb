//! # Event subscriber trait.
//!
//! Implement [`Subscribe`] to hook metrics, audit trails or alerting (a
//! reclaimed lease usually means a crashed work unit) into the limiter.
//! Register implementations with
//! [`LimiterBuilder::with_subscribers`](crate::LimiterBuilder::with_subscribers);
//! each one is driven by its own worker behind a bounded queue (see
//! [`SubscriberSet`](crate::SubscriberSet)).
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use tagvisor::{Event, EventKind, Subscribe};
//!
//! struct ReclaimAlerts;
//!
//! #[async_trait]
//! impl Subscribe for ReclaimAlerts {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::SlotReclaimed {
//!             // page someone about a crashed work unit
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "reclaim-alerts" }
//!     fn queue_capacity(&self) -> usize { 256 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Consumer of limiter events.
///
/// `on_event` runs on the subscriber's own worker, one event at a time in
/// publication order. Blocking calls stall only this subscriber, but they do
/// stall a runtime thread; prefer async I/O.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &Event);

    /// Name used in logs and in `SubscriberOverflow`/`SubscriberPanicked` events.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Capacity of this subscriber's queue; events beyond it are dropped.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
