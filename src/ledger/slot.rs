use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

/// A held unit of capacity under one tag.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Owning limit tag.
    pub tag: String,
    /// Work unit occupying the slot.
    pub holder_id: String,
    /// When the slot was granted.
    pub acquired_at: DateTime<Utc>,
    /// Deadline after which the sweeper may reclaim the slot (`None` = never).
    pub lease_expires_at: Option<DateTime<Utc>>,
}

/// Outcome of a single-tag acquisition attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// Slot inserted (or tag unlimited).
    Granted {
        /// Lease deadline of the new slot.
        lease_expires_at: Option<DateTime<Utc>>,
    },
    /// Tag saturated; nothing changed.
    Denied {
        /// Slots held when the attempt was rejected.
        held: u32,
        /// Ceiling in force when the attempt was rejected.
        ceiling: u32,
    },
}

impl Admission {
    #[inline]
    pub fn is_granted(&self) -> bool {
        matches!(self, Admission::Granted { .. })
    }
}

/// Per-holder bookkeeping inside a tag.
#[derive(Clone, Copy, Debug)]
pub(super) struct SlotRecord {
    pub acquired_at: DateTime<Utc>,
    pub lease_expires_at: Option<DateTime<Utc>>,
}

/// Mutable state of one tag, guarded by the cell mutex.
pub(super) struct TagState {
    /// `0` = unlimited, no holder bookkeeping.
    pub ceiling: u32,
    /// Definition deleted: no new grants, no renewals, holders drain.
    pub retired: bool,
    pub holders: HashMap<Arc<str>, SlotRecord>,
}

impl TagState {
    pub fn new(ceiling: u32) -> Self {
        Self {
            ceiling,
            retired: false,
            holders: HashMap::new(),
        }
    }

    #[inline]
    pub fn held(&self) -> u32 {
        self.holders.len().min(u32::MAX as usize) as u32
    }

    #[inline]
    pub fn has_room(&self) -> bool {
        self.held() < self.ceiling
    }
}

/// One tag's guarded state plus the wake-up channel for waiters.
pub(super) struct TagCell {
    pub state: parking_lot::Mutex<TagState>,
    pub freed: Arc<Notify>,
}

impl TagCell {
    pub fn new(ceiling: u32) -> Arc<Self> {
        Arc::new(Self {
            state: parking_lot::Mutex::new(TagState::new(ceiling)),
            freed: Arc::new(Notify::new()),
        })
    }
}
