//! # Slot ledger: per-tag accounting of held slots.
//!
//! The ledger is the only owner of [`Slot`] records. For every tag it keeps a
//! ceiling, a retired flag and the set of holders, all behind one mutex per tag.
//!
//! ## Architecture
//! ```text
//! RwLock<HashMap<tag, Arc<TagCell>>>        (shared on every call)
//!            │
//!            ├──► TagCell "db-write"
//!            │      ├─ Mutex<TagState { ceiling, retired, holders }>
//!            │      └─ Notify (freed)  ──► waiters in Coordinator::acquire_set
//!            └──► TagCell "gpu"
//!                   └─ ...
//! ```
//!
//! ## Rules
//! - `held ≤ ceiling` for every tag with `ceiling > 0`; checked and inserted
//!   in one critical section.
//! - `ceiling = 0` means unlimited: every attempt is granted, nothing recorded.
//! - One slot per (tag, holder); a second acquire is a `Conflict`.
//! - `release` is idempotent.
//! - A retired tag (definition deleted) admits nothing and renews nothing;
//!   its cell disappears when the last holder leaves.
//! - Reclamation re-reads the deadline under the tag mutex.

mod core;
mod slot;

pub use self::core::{ExpiredSlot, SlotLedger};
pub use slot::{Admission, Slot};
