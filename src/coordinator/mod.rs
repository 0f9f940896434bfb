//! # Acquisition coordinator: all-or-nothing slots across tag sets.
//!
//! A work unit usually needs several tags at once (`db-write` and `gpu`).
//! Grabbing them one by one and waiting on the saturated one would let it pin
//! the scarce tags it already holds; the [`Coordinator`] instead treats the
//! set as one attempt.
//!
//! ## Flow
//! ```text
//! try_acquire_set(holder, {gpu, db-write})
//!   sort → [db-write, gpu]
//!     ├─► ledger.try_acquire(db-write) ── Granted ──► taken = [db-write]
//!     └─► ledger.try_acquire(gpu)      ── Denied  ──► release(db-write), Denied(gpu)
//! ```
//!
//! ## Rules
//! - Tags are walked in lexicographic order by every caller.
//! - Attempts never block; waiting is layered on top by `acquire_set`.
//! - The rollback runs from a drop guard, so it also runs on error or panic.

mod acquisition;
mod core;

pub use self::core::Coordinator;
pub use acquisition::Acquisition;
