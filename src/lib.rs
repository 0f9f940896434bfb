//! # tagvisor
//!
//! **Tagvisor** caps how many work units may hold a slot of a given *tag* at
//! once. A work unit (job, run, request) names the tags it needs; it starts only
//! when every one of them has room, and gives the slots back when it finishes,
//! or the sweeper takes them back when its lease runs out.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   create_limit / set_ceiling / delete_limit        try_acquire / acquire / release / renew_lease
//!                   │                                                   │
//!                   ▼                                                   ▼
//! ┌──────────────────────────────────┐              ┌──────────────────────────────────────┐
//! │  LimitRegistry                   │              │  Coordinator                         │
//! │  - LimitStore (definitions)      │              │  - sorted tag walk                   │
//! │  - write gate                    │              │  - LIFO rollback (drop guard)        │
//! └────────────────┬─────────────────┘              │  - backoff + Notify waiting          │
//!                  │ configure / retire             └──────────────────┬───────────────────┘
//!                  ▼                                                   ▼
//! ┌───────────────────────────────────────────────────────────────────────────────────────────┐
//! │  SlotLedger: tag ──► Mutex<TagState { ceiling, retired, holders }>                        │
//! └───────────────────────────────────────────────┬───────────────────────────────────────────┘
//!                      ▲                          │ publishes
//!   expired / reclaim  │                          ▼
//!        ┌─────────────┴─────┐   ┌─────────────────────────────────┐
//!        │ Sweeper (interval)│   │ Bus (broadcast channel)         │
//!        └───────────────────┘   └────────────────┬────────────────┘
//!                                                 ▼
//!                                 subscriber_listener ──► SubscriberSet
//!                                               ┌─────────┼─────────┐
//!                                               ▼         ▼         ▼
//!                                            worker1   worker2   workerN
//! ```
//!
//! ### Acquisition
//! ```text
//! try_acquire(holder, {gpu, db-write}, lease)
//!   ├─► sort + dedupe       → [db-write, gpu]
//!   ├─► ledger.try_acquire(db-write) → Granted   (taken = [db-write])
//!   ├─► ledger.try_acquire(gpu)      → Denied
//!   └─► rollback: release(db-write)  → Denied { blocking_tag: "gpu" }
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Limits**        | Tag-keyed ceilings with CRUD and pluggable storage.          | [`LimitRegistry`], [`LimitStore`]           |
//! | **Slots**         | Per-tag holder accounting with optional leases.              | [`SlotLedger`], [`Slot`], [`Admission`]     |
//! | **Coordination**  | All-or-nothing acquisition across tag sets.                  | [`Coordinator`], [`Acquisition`]            |
//! | **Expiry**        | Periodic reclamation of unrenewed leases.                    | [`Sweeper`]                                 |
//! | **Subscriber API**| Hook into limit and slot events.                             | [`Subscribe`], [`Event`], [`EventKind`]     |
//! | **Policies**      | Backoff and jitter for waiting acquisitions.                 | [`RetryPolicy`], [`BackoffPolicy`]          |
//! | **Errors**        | Typed errors for limit operations and the runtime.           | [`LimitError`], [`RuntimeError`]            |
//! | **Configuration** | Centralize runtime settings.                                 | [`Config`]                                  |
//!
//! ## Optional features
//! - `logging`: exports a built-in [`LogWriter`] subscriber rendering events through `tracing`.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tagvisor::{Config, Limiter};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let limiter = Limiter::builder(Config::default()).build();
//!     limiter.create_limit("gpu", 2).await?;
//!     limiter.create_limit("db-write", 1).await?;
//!
//!     let token = CancellationToken::new();
//!     let got = limiter
//!         .acquire("train-7", &["gpu", "db-write"], Some(Duration::from_secs(60)), &token)
//!         .await?;
//!     assert!(got.is_granted());
//!
//!     limiter.renew_lease("train-7", &["gpu", "db-write"], Some(Duration::from_secs(60)))?;
//!     limiter.release("train-7", &["gpu", "db-write"]);
//!
//!     limiter.shutdown().await?;
//!     Ok(())
//! }
//! ```
mod clock;
mod coordinator;
mod core;
mod error;
mod events;
mod ledger;
mod policies;
mod registry;
mod subscribers;

// ---- Public re-exports ----

pub use self::core::{Config, Limiter, LimiterBuilder, Sweeper};
pub use clock::{Clock, ClockRef, ManualClock, SystemClock};
pub use coordinator::{Acquisition, Coordinator};
pub use error::{LimitError, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use ledger::{Admission, ExpiredSlot, Slot, SlotLedger};
pub use policies::{BackoffPolicy, JitterPolicy, RetryPolicy};
pub use registry::{LimitDefinition, LimitRegistry, LimitSnapshot, LimitStore, MemoryStore};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber.
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
