use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::clock::{self, ClockRef};
use crate::error::LimitError;
use crate::events::{Bus, Event, EventKind};

use super::slot::{Admission, Slot, SlotRecord, TagCell};

/// A slot observed as expired during a sweep scan.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExpiredSlot {
    pub tag: Arc<str>,
    pub holder: Arc<str>,
    /// Deadline as read at scan time; removal re-reads it.
    pub observed_deadline: DateTime<Utc>,
}

/// Per-tag slot accounting.
///
/// Every operation on one tag runs inside that tag's mutex, which makes
/// `try_acquire`, `release`, `renew_lease` and reclamation linearizable per tag.
/// The outer map lock is taken shared on every call and exclusively only when a
/// tag cell is inserted or pruned, so different tags never serialize on each
/// other. Lock order is always map → cell.
pub struct SlotLedger {
    tags: RwLock<HashMap<Arc<str>, Arc<TagCell>>>,
    clock: ClockRef,
    bus: Bus,
}

impl SlotLedger {
    pub fn new(clock: ClockRef, bus: Bus) -> Self {
        Self {
            tags: RwLock::new(HashMap::new()),
            clock,
            bus,
        }
    }

    /// Current time according to the ledger clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Installs or updates the ceiling of a tag and re-opens it if retired.
    ///
    /// Returns the number of slots held at the moment of the change. Lowering
    /// the ceiling below that number evicts nobody; grants resume once holders
    /// drain below the new ceiling.
    pub(crate) fn configure(&self, tag: &str, ceiling: u32) -> u32 {
        {
            let tags = self.tags.read();
            if let Some(cell) = tags.get(tag) {
                return Self::apply_ceiling(cell, ceiling);
            }
        }
        let mut tags = self.tags.write();
        let cell = tags
            .entry(Arc::from(tag))
            .or_insert_with(|| TagCell::new(ceiling));
        Self::apply_ceiling(cell, ceiling)
    }

    fn apply_ceiling(cell: &TagCell, ceiling: u32) -> u32 {
        let mut st = cell.state.lock();
        let grew = ceiling == 0 || ceiling > st.ceiling || st.retired;
        st.ceiling = ceiling;
        st.retired = false;
        let held = st.held();
        drop(st);
        if grew {
            cell.freed.notify_waiters();
        }
        held
    }

    /// Stops admitting new slots for `tag`. Existing holders keep their slots
    /// until they release or are reclaimed, but can no longer renew.
    ///
    /// Returns the number of slots left draining.
    pub(crate) fn retire(&self, tag: &str) -> u32 {
        let mut tags = self.tags.write();
        let Some(cell) = tags.get(tag).cloned() else {
            return 0;
        };
        let mut st = cell.state.lock();
        st.retired = true;
        let held = st.held();
        if held == 0 {
            tags.remove(tag);
        }
        drop(st);
        drop(tags);
        cell.freed.notify_waiters();
        held
    }

    /// Attempts to take one slot of `tag` for `holder`.
    ///
    /// The capacity check and the insert happen under the tag mutex, so two
    /// racers can never both observe `held == ceiling - 1` and both win.
    ///
    /// Errors:
    /// - `NotFound`: no definition for `tag`, or it was deleted
    /// - `Conflict`: `holder` already holds a slot of `tag`
    pub fn try_acquire(
        &self,
        tag: &str,
        holder: &str,
        lease: Option<Duration>,
    ) -> Result<Admission, LimitError> {
        self.try_acquire_at(tag, holder, lease, self.clock.now())
    }

    pub(crate) fn try_acquire_at(
        &self,
        tag: &str,
        holder: &str,
        lease: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Result<Admission, LimitError> {
        let lease_expires_at = lease.and_then(|d| clock::deadline(now, d));

        let tags = self.tags.read();
        let cell = tags.get(tag).ok_or_else(|| LimitError::tag_not_found(tag))?;
        let mut st = cell.state.lock();
        if st.retired {
            return Err(LimitError::tag_not_found(tag));
        }
        if st.ceiling == 0 {
            return Ok(Admission::Granted { lease_expires_at });
        }
        if st.holders.contains_key(holder) {
            return Err(LimitError::Conflict {
                tag: tag.to_string(),
                holder: holder.to_string(),
            });
        }
        let ceiling = st.ceiling;
        if !st.has_room() {
            let held = st.held();
            drop(st);
            drop(tags);
            debug!(tag, holder, held, ceiling, "slot denied");
            self.bus.publish(
                Event::new(EventKind::SlotDenied)
                    .with_tag(tag)
                    .with_holder(holder)
                    .with_held(held)
                    .with_ceiling(ceiling),
            );
            return Ok(Admission::Denied { held, ceiling });
        }
        st.holders.insert(
            Arc::from(holder),
            SlotRecord {
                acquired_at: now,
                lease_expires_at,
            },
        );
        let held = st.held();
        drop(st);
        drop(tags);

        debug!(tag, holder, held, ceiling, "slot granted");
        self.bus.publish(
            Event::new(EventKind::SlotGranted)
                .with_tag(tag)
                .with_holder(holder)
                .with_held(held)
                .with_ceiling(ceiling)
                .with_lease(lease),
        );
        Ok(Admission::Granted { lease_expires_at })
    }

    /// Removes `holder`'s slot of `tag` if present.
    ///
    /// Idempotent: releasing a slot that is not held (already released,
    /// reclaimed, or never granted) is a no-op. Returns whether a slot was removed.
    pub fn release(&self, tag: &str, holder: &str) -> bool {
        self.remove_slot(tag, holder, None)
    }

    pub(crate) fn release_with_reason(&self, tag: &str, holder: &str, reason: &'static str) -> bool {
        self.remove_slot(tag, holder, Some(reason))
    }

    fn remove_slot(&self, tag: &str, holder: &str, reason: Option<&'static str>) -> bool {
        let tags = self.tags.read();
        let Some(cell) = tags.get(tag) else {
            return false;
        };
        let mut st = cell.state.lock();
        if st.holders.remove(holder).is_none() {
            return false;
        }
        let held = st.held();
        let drained = st.retired && held == 0;
        drop(st);
        cell.freed.notify_waiters();
        drop(tags);

        debug!(tag, holder, held, reason, "slot released");
        let mut ev = Event::new(EventKind::SlotReleased)
            .with_tag(tag)
            .with_holder(holder)
            .with_held(held);
        if let Some(reason) = reason {
            ev = ev.with_reason(reason);
        }
        self.bus.publish(ev);

        if drained {
            self.prune(tag);
        }
        true
    }

    /// Moves `holder`'s lease deadline to `now + lease` (`None` = never expires).
    ///
    /// Fails with `NotFound` when the tag is unknown or deleted, or when the
    /// holder no longer holds a slot (it may have been reclaimed). Unlimited
    /// tags keep no holder records, so renewing there always succeeds.
    pub fn renew_lease(
        &self,
        tag: &str,
        holder: &str,
        lease: Option<Duration>,
    ) -> Result<Option<DateTime<Utc>>, LimitError> {
        let now = self.clock.now();
        let lease_expires_at = lease.and_then(|d| clock::deadline(now, d));

        let tags = self.tags.read();
        let cell = tags.get(tag).ok_or_else(|| LimitError::tag_not_found(tag))?;
        let mut st = cell.state.lock();
        if st.retired {
            return Err(LimitError::tag_not_found(tag));
        }
        let unlimited = st.ceiling == 0;
        match st.holders.get_mut(holder) {
            Some(rec) => rec.lease_expires_at = lease_expires_at,
            None if unlimited => return Ok(lease_expires_at),
            None => return Err(LimitError::holder_not_found(tag, holder)),
        }
        drop(st);
        drop(tags);

        self.bus.publish(
            Event::new(EventKind::LeaseRenewed)
                .with_tag(tag)
                .with_holder(holder)
                .with_lease(lease),
        );
        Ok(lease_expires_at)
    }

    /// Number of slots currently held for `tag` (`0` for unknown or unlimited tags).
    pub fn held_count(&self, tag: &str) -> u32 {
        self.tags
            .read()
            .get(tag)
            .map(|cell| cell.state.lock().held())
            .unwrap_or(0)
    }

    /// Snapshot of the slots of `tag`, oldest grant first.
    pub fn holders(&self, tag: &str) -> Vec<Slot> {
        let tags = self.tags.read();
        let Some(cell) = tags.get(tag) else {
            return Vec::new();
        };
        let st = cell.state.lock();
        let mut slots: Vec<Slot> = st
            .holders
            .iter()
            .map(|(holder, rec)| Slot {
                tag: tag.to_string(),
                holder_id: holder.to_string(),
                acquired_at: rec.acquired_at,
                lease_expires_at: rec.lease_expires_at,
            })
            .collect();
        slots.sort_by(|a, b| {
            a.acquired_at
                .cmp(&b.acquired_at)
                .then_with(|| a.holder_id.cmp(&b.holder_id))
        });
        slots
    }

    /// Tags currently tracked (defined, or deleted but still draining), sorted.
    pub fn tags(&self) -> Vec<Arc<str>> {
        let mut tags: Vec<Arc<str>> = self.tags.read().keys().cloned().collect();
        tags.sort_unstable();
        tags
    }

    /// Lists slots of `tag` whose lease deadline has passed at `now`.
    ///
    /// This is only a scan; [`reclaim_if_expired`](Self::reclaim_if_expired)
    /// decides again under the tag mutex.
    pub fn expired(&self, tag: &str, now: DateTime<Utc>) -> Vec<ExpiredSlot> {
        let tags = self.tags.read();
        let Some((key, cell)) = tags.get_key_value(tag) else {
            return Vec::new();
        };
        let st = cell.state.lock();
        st.holders
            .iter()
            .filter_map(|(holder, rec)| match rec.lease_expires_at {
                Some(deadline) if deadline < now => Some(ExpiredSlot {
                    tag: Arc::clone(key),
                    holder: Arc::clone(holder),
                    observed_deadline: deadline,
                }),
                _ => None,
            })
            .collect()
    }

    /// Removes the slot only if its **current** deadline has passed at `now`.
    ///
    /// A renewal that landed after the scan moved the deadline forward and
    /// keeps the slot alive. Returns how overdue the reclaimed lease was.
    pub fn reclaim_if_expired(
        &self,
        tag: &str,
        holder: &str,
        now: DateTime<Utc>,
    ) -> Option<Duration> {
        let tags = self.tags.read();
        let cell = tags.get(tag)?;
        let mut st = cell.state.lock();
        let deadline = st.holders.get(holder)?.lease_expires_at?;
        if deadline >= now {
            return None;
        }
        st.holders.remove(holder);
        let held = st.held();
        let drained = st.retired && held == 0;
        drop(st);
        cell.freed.notify_waiters();
        drop(tags);

        let overdue = clock::to_std(now - deadline);
        warn!(tag, holder, overdue_ms = overdue.as_millis() as u64, held, "lease expired; slot reclaimed");
        self.bus.publish(
            Event::new(EventKind::SlotReclaimed)
                .with_tag(tag)
                .with_holder(holder)
                .with_held(held)
                .with_overdue(overdue),
        );

        if drained {
            self.prune(tag);
        }
        Some(overdue)
    }

    /// Wake-up handle notified whenever `tag` frees capacity or changes state.
    pub(crate) fn freed(&self, tag: &str) -> Option<Arc<Notify>> {
        self.tags
            .read()
            .get(tag)
            .map(|cell| Arc::clone(&cell.freed))
    }

    /// Drops the cell of a retired tag once its last holder is gone.
    fn prune(&self, tag: &str) {
        let mut tags = self.tags.write();
        let remove = tags.get(tag).is_some_and(|cell| {
            let st = cell.state.lock();
            st.retired && st.holders.is_empty()
        });
        if remove {
            tags.remove(tag);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};

    fn ledger() -> (SlotLedger, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        (SlotLedger::new(clock.clone(), Bus::new(64)), clock)
    }

    #[test]
    fn unknown_tag_is_not_found() {
        let (l, _) = ledger();
        let err = l.try_acquire("nope", "h1", None).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn ceiling_one_scenario() {
        let (l, _) = ledger();
        l.configure("db-write", 1);

        assert!(l.try_acquire("db-write", "h1", None).unwrap().is_granted());
        assert_eq!(
            l.try_acquire("db-write", "h2", None).unwrap(),
            Admission::Denied { held: 1, ceiling: 1 }
        );
        assert!(l.release("db-write", "h1"));
        assert!(l.try_acquire("db-write", "h2", None).unwrap().is_granted());
        assert_eq!(l.held_count("db-write"), 1);
    }

    #[test]
    fn double_acquire_is_conflict() {
        let (l, _) = ledger();
        l.configure("t", 3);
        l.try_acquire("t", "h1", None).unwrap();
        let err = l.try_acquire("t", "h1", None).unwrap_err();
        assert_eq!(err.as_label(), "limit_conflict");
        assert_eq!(l.held_count("t"), 1);
    }

    #[test]
    fn release_is_idempotent() {
        let (l, _) = ledger();
        l.configure("t", 2);
        l.try_acquire("t", "h1", None).unwrap();
        l.try_acquire("t", "h2", None).unwrap();

        assert!(l.release("t", "h1"));
        let after_once = l.holders("t");
        assert!(!l.release("t", "h1"));
        assert_eq!(l.holders("t"), after_once);
        assert!(!l.release("unknown", "h1"));
    }

    #[test]
    fn unlimited_tag_keeps_no_records() {
        let (l, _) = ledger();
        l.configure("free", 0);
        for i in 0..100 {
            let admission = l.try_acquire("free", &format!("h{i}"), None).unwrap();
            assert!(admission.is_granted());
        }
        assert_eq!(l.held_count("free"), 0);
        assert!(l.renew_lease("free", "h1", None).is_ok());
    }

    #[test]
    fn lowering_ceiling_blocks_until_drained() {
        let (l, _) = ledger();
        l.configure("t", 3);
        for h in ["a", "b", "c"] {
            l.try_acquire("t", h, None).unwrap();
        }
        assert_eq!(l.configure("t", 1), 3);
        assert_eq!(l.held_count("t"), 3);
        assert!(!l.try_acquire("t", "d", None).unwrap().is_granted());

        l.release("t", "a");
        l.release("t", "b");
        assert!(!l.try_acquire("t", "d", None).unwrap().is_granted());
        l.release("t", "c");
        assert!(l.try_acquire("t", "d", None).unwrap().is_granted());
    }

    #[test]
    fn retired_tag_drains_then_disappears() {
        let (l, _) = ledger();
        l.configure("t", 2);
        l.try_acquire("t", "h1", Some(Duration::from_secs(10))).unwrap();

        assert_eq!(l.retire("t"), 1);
        assert!(l.try_acquire("t", "h2", None).unwrap_err().is_not_found());
        assert!(l.renew_lease("t", "h1", None).unwrap_err().is_not_found());
        assert_eq!(l.held_count("t"), 1);

        assert!(l.release("t", "h1"));
        assert!(l.tags().is_empty());
    }

    #[test]
    fn renew_unknown_holder_is_not_found() {
        let (l, _) = ledger();
        l.configure("t", 1);
        let err = l.renew_lease("t", "ghost", None).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn reclaim_rechecks_deadline() {
        let (l, clock) = ledger();
        l.configure("t", 1);
        l.try_acquire("t", "h1", Some(Duration::from_secs(5))).unwrap();

        clock.advance(Duration::from_secs(6));
        let scan = l.expired("t", clock.now());
        assert_eq!(scan.len(), 1);

        // renewal lands between scan and removal
        l.renew_lease("t", "h1", Some(Duration::from_secs(5))).unwrap();
        assert_eq!(l.reclaim_if_expired("t", "h1", clock.now()), None);
        assert_eq!(l.held_count("t"), 1);

        clock.advance(Duration::from_secs(7));
        let overdue = l.reclaim_if_expired("t", "h1", clock.now()).expect("reclaimed");
        assert_eq!(overdue, Duration::from_secs(2));
        assert_eq!(l.held_count("t"), 0);
    }

    #[test]
    fn deadline_exactly_now_is_not_expired() {
        let (l, clock) = ledger();
        l.configure("t", 1);
        l.try_acquire("t", "h1", Some(Duration::from_secs(5))).unwrap();
        clock.advance(Duration::from_secs(5));
        assert!(l.expired("t", clock.now()).is_empty());
        assert_eq!(l.reclaim_if_expired("t", "h1", clock.now()), None);
    }

    #[test]
    fn holders_are_ordered_by_grant_time() {
        let (l, clock) = ledger();
        l.configure("t", 3);
        l.try_acquire("t", "late", None).unwrap();
        clock.set(clock.now() - chrono::Duration::seconds(10));
        l.try_acquire("t", "early", None).unwrap();
        let ids: Vec<_> = l.holders("t").into_iter().map(|s| s.holder_id).collect();
        assert_eq!(ids, vec!["early", "late"]);
    }
}
