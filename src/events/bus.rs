//! # In-process event bus.
//!
//! The ledger, registry and sweeper publish into one [`Bus`]; the limiter's
//! fan-out listener (and anyone holding [`Limiter::subscribe`](crate::Limiter::subscribe))
//! reads from it.
//!
//! ```text
//! LimitRegistry ─┐
//! SlotLedger    ─┼─► Bus (broadcast ring) ─┬─► fan-out listener ─► SubscriberSet
//! Sweeper       ─┘                         └─► Limiter::subscribe() receivers
//! ```
//!
//! Publishing never waits. The ledger publishes only after dropping the tag
//! mutex. A receiver that falls more than `capacity` events behind gets
//! `RecvError::Lagged` and loses the oldest ones. Nothing is stored for
//! receivers that do not exist yet.

use tokio::sync::broadcast;

use super::event::Event;

/// Cloneable handle on the broadcast channel carrying [`Event`]s.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Bus {
    /// Creates a bus buffering up to `capacity` events (at least one).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Sends `ev` to every current receiver; a bus without receivers drops it.
    pub fn publish(&self, ev: Event) {
        if self.tx.receiver_count() > 0 {
            let _ = self.tx.send(ev);
        }
    }

    /// New receiver, seeing only events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
