//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted by the registry, ledger, coordinator,
//! sweeper and subscriber workers.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `LimitRegistry`, `SlotLedger`, `Coordinator`, `Sweeper`,
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: the listener spawned by `Limiter::builder().build()` that
//!   fans out to `SubscriberSet`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
