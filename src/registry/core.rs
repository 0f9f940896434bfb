//! # Limit registry: CRUD over limit definitions.
//!
//! The registry owns [`LimitDefinition`] records (through a [`LimitStore`]) and
//! pushes every ceiling change into the [`SlotLedger`] before the call returns,
//! so the next acquisition attempt already sees it.
//!
//! ## Architecture
//! ```text
//! create_limit / set_ceiling ──► store.insert/update ──► ledger.configure(tag, ceiling)
//! delete_limit               ──► store.remove        ──► ledger.retire(tag)
//! get_limit / list_limits    ──► store.get/list
//! ```
//!
//! ## Rules
//! - Mutations are serialized by a write gate so the store and the ledger
//!   never disagree about a tag.
//! - Store errors surface to the caller unchanged.
//! - Deleting a definition does not evict holders; they drain.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::clock::ClockRef;
use crate::error::LimitError;
use crate::events::{Bus, Event, EventKind};
use crate::ledger::SlotLedger;

use super::definition::{LimitDefinition, LimitSnapshot, check_ceiling, check_tag};
use super::store::LimitStore;

/// Registry of limit definitions.
pub struct LimitRegistry {
    store: Arc<dyn LimitStore>,
    ledger: Arc<SlotLedger>,
    clock: ClockRef,
    bus: Bus,
    max_list_limit: usize,
    writes: Mutex<()>,
}

impl LimitRegistry {
    pub fn new(
        store: Arc<dyn LimitStore>,
        ledger: Arc<SlotLedger>,
        clock: ClockRef,
        bus: Bus,
        max_list_limit: usize,
    ) -> Self {
        Self {
            store,
            ledger,
            clock,
            bus,
            max_list_limit: max_list_limit.max(1),
            writes: Mutex::new(()),
        }
    }

    /// Creates a limit with an empty metadata object.
    ///
    /// Errors: `InvalidArgument` (blank tag, negative ceiling), `AlreadyExists`.
    pub async fn create_limit(&self, tag: &str, ceiling: i64) -> Result<LimitDefinition, LimitError> {
        self.create_limit_with_metadata(tag, ceiling, None).await
    }

    /// Creates a limit carrying caller metadata.
    pub async fn create_limit_with_metadata(
        &self,
        tag: &str,
        ceiling: i64,
        metadata: Option<serde_json::Value>,
    ) -> Result<LimitDefinition, LimitError> {
        check_tag(tag)?;
        let ceiling = check_ceiling(ceiling)?;

        let gate = self.writes.lock().await;
        let def = LimitDefinition::new(tag, ceiling, metadata, self.clock.now());
        self.store.insert(def.clone()).await?;
        self.ledger.configure(tag, ceiling);
        drop(gate);

        info!(tag, ceiling, id = %def.id, "limit created");
        self.bus.publish(
            Event::new(EventKind::LimitCreated)
                .with_tag(tag)
                .with_ceiling(ceiling),
        );
        Ok(def)
    }

    /// Changes the ceiling of an existing limit.
    ///
    /// Effective for the very next acquisition. Lowering below the held count
    /// evicts nobody.
    pub async fn set_ceiling(&self, tag: &str, ceiling: i64) -> Result<LimitDefinition, LimitError> {
        let ceiling = check_ceiling(ceiling)?;

        let gate = self.writes.lock().await;
        let mut def = self
            .store
            .get(tag)
            .await?
            .ok_or_else(|| LimitError::tag_not_found(tag))?;
        def.ceiling = ceiling;
        def.updated_at = self.clock.now();
        if !self.store.update(def.clone()).await? {
            return Err(LimitError::tag_not_found(tag));
        }
        let held = self.ledger.configure(tag, ceiling);
        drop(gate);

        info!(tag, ceiling, held, "limit ceiling changed");
        self.bus.publish(
            Event::new(EventKind::LimitUpdated)
                .with_tag(tag)
                .with_ceiling(ceiling)
                .with_held(held),
        );
        Ok(def)
    }

    /// Reads the definition for `tag`.
    pub async fn get_limit(&self, tag: &str) -> Result<LimitDefinition, LimitError> {
        self.store
            .get(tag)
            .await?
            .ok_or_else(|| LimitError::tag_not_found(tag))
    }

    /// Reads a definition by its generated id.
    pub async fn get_limit_by_id(&self, id: Uuid) -> Result<LimitDefinition, LimitError> {
        self.store
            .get_by_id(id)
            .await?
            .ok_or_else(|| LimitError::NotFound {
                what: format!("limit id {id}"),
            })
    }

    /// Deletes the definition for `tag` and stops new acquisitions on it.
    ///
    /// Existing holders keep their slots until release or reclamation but can
    /// no longer renew.
    pub async fn delete_limit(&self, tag: &str) -> Result<LimitDefinition, LimitError> {
        let gate = self.writes.lock().await;
        let (def, draining) = self.remove_gated(tag).await?;
        drop(gate);
        self.deleted(&def, draining);
        Ok(def)
    }

    /// Deletes a definition by its generated id.
    ///
    /// The lookup and the removal share one write gate, so a stale id never
    /// removes a definition that re-used the same tag.
    pub async fn delete_limit_by_id(&self, id: Uuid) -> Result<LimitDefinition, LimitError> {
        let gate = self.writes.lock().await;
        let def = self.get_limit_by_id(id).await?;
        let (removed, draining) = self.remove_gated(&def.tag).await?;
        drop(gate);
        self.deleted(&removed, draining);
        Ok(removed)
    }

    /// Caller holds `writes`.
    async fn remove_gated(&self, tag: &str) -> Result<(LimitDefinition, u32), LimitError> {
        let def = self
            .store
            .remove(tag)
            .await?
            .ok_or_else(|| LimitError::tag_not_found(tag))?;
        let draining = self.ledger.retire(tag);
        Ok((def, draining))
    }

    fn deleted(&self, def: &LimitDefinition, draining: u32) {
        info!(tag = %def.tag, id = %def.id, draining, "limit deleted");
        self.bus.publish(
            Event::new(EventKind::LimitDeleted)
                .with_tag(def.tag.as_str())
                .with_held(draining),
        );
    }

    /// Page of definitions ordered by tag; `limit` is capped at the configured maximum.
    pub async fn list_limits(&self, offset: usize, limit: usize) -> Result<Vec<LimitDefinition>, LimitError> {
        self.store
            .list(offset, limit.min(self.max_list_limit))
            .await
    }

    /// Definition of `tag` plus its live slots.
    pub async fn snapshot(&self, tag: &str) -> Result<LimitSnapshot, LimitError> {
        let definition = self.get_limit(tag).await?;
        let active_slots = self.ledger.holders(tag);
        Ok(LimitSnapshot {
            definition,
            active_slots,
        })
    }

    /// Loads every stored definition into the ledger.
    ///
    /// Needed once at start-up when the store already holds definitions.
    /// Returns how many were loaded.
    pub async fn hydrate(&self) -> Result<usize, LimitError> {
        let _gate = self.writes.lock().await;
        let mut offset = 0;
        loop {
            let page = self.store.list(offset, self.max_list_limit).await?;
            if page.is_empty() {
                break;
            }
            offset += page.len();
            for def in &page {
                self.ledger.configure(&def.tag, def.ceiling);
            }
        }
        info!(loaded = offset, "limit definitions hydrated");
        Ok(offset)
    }

    /// Maximum page size accepted by [`list_limits`](Self::list_limits).
    pub fn max_list_limit(&self) -> usize {
        self.max_list_limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::registry::MemoryStore;
    use std::time::Duration;

    fn registry() -> (LimitRegistry, Arc<SlotLedger>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let bus = Bus::new(64);
        let ledger = Arc::new(SlotLedger::new(clock.clone(), bus.clone()));
        let reg = LimitRegistry::new(
            Arc::new(MemoryStore::new()),
            ledger.clone(),
            clock.clone(),
            bus,
            3,
        );
        (reg, ledger, clock)
    }

    #[tokio::test]
    async fn create_get_delete() {
        let (reg, _, _) = registry();
        let def = reg.create_limit("db", 2).await.unwrap();
        assert_eq!(def.ceiling, 2);
        assert_eq!(reg.get_limit("db").await.unwrap(), def);
        assert_eq!(reg.get_limit_by_id(def.id).await.unwrap(), def);

        assert_eq!(reg.delete_limit("db").await.unwrap().id, def.id);
        assert!(reg.get_limit("db").await.unwrap_err().is_not_found());
        assert!(reg.delete_limit("db").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn create_validates_and_rejects_duplicates() {
        let (reg, _, _) = registry();
        assert_eq!(
            reg.create_limit("db", -1).await.unwrap_err().as_label(),
            "limit_invalid_argument"
        );
        reg.create_limit("db", 1).await.unwrap();
        assert_eq!(
            reg.create_limit("db", 5).await.unwrap_err(),
            LimitError::AlreadyExists { tag: "db".into() }
        );
    }

    #[tokio::test]
    async fn list_caps_limit() {
        let (reg, _, _) = registry();
        for tag in ["e", "d", "c", "b", "a"] {
            reg.create_limit(tag, 1).await.unwrap();
        }
        let tags: Vec<String> = reg
            .list_limits(0, 100)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.tag)
            .collect();
        assert_eq!(tags, vec!["a", "b", "c"]);

        let tail = reg.list_limits(4, 100).await.unwrap();
        assert_eq!(tail.len(), 1);
        assert_eq!(tail[0].tag, "e");
    }

    #[tokio::test]
    async fn ceiling_change_is_visible_immediately() {
        let (reg, ledger, clock) = registry();
        let created = reg.create_limit("db", 1).await.unwrap();
        ledger.try_acquire("db", "h1", None).unwrap();
        assert!(!ledger.try_acquire("db", "h2", None).unwrap().is_granted());

        clock.advance(Duration::from_secs(1));
        let updated = reg.set_ceiling("db", 2).await.unwrap();
        assert!(updated.updated_at > created.updated_at);
        assert_eq!(updated.created_at, created.created_at);
        assert!(ledger.try_acquire("db", "h2", None).unwrap().is_granted());
    }

    #[tokio::test]
    async fn delete_keeps_holders_but_blocks_new() {
        let (reg, ledger, _) = registry();
        reg.create_limit("db", 2).await.unwrap();
        ledger.try_acquire("db", "h1", None).unwrap();

        reg.delete_limit("db").await.unwrap();
        assert_eq!(ledger.held_count("db"), 1);
        assert!(ledger.try_acquire("db", "h2", None).unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn snapshot_lists_active_slots() {
        let (reg, ledger, _) = registry();
        reg.create_limit("db", 2).await.unwrap();
        ledger.try_acquire("db", "h1", None).unwrap();
        let snap = reg.snapshot("db").await.unwrap();
        assert_eq!(snap.active_slots.len(), 1);
        assert_eq!(snap.active_slots[0].holder_id, "h1");
    }

    #[tokio::test]
    async fn hydrate_configures_ledger_from_store() {
        let clock = Arc::new(ManualClock::default());
        let bus = Bus::new(8);
        let store = Arc::new(MemoryStore::new());
        for tag in ["a", "b", "c", "d"] {
            store
                .insert(LimitDefinition::new(tag, 1, None, clock.now()))
                .await
                .unwrap();
        }
        let ledger = Arc::new(SlotLedger::new(clock.clone(), bus.clone()));
        let reg = LimitRegistry::new(store, ledger.clone(), clock, bus, 3);

        assert_eq!(reg.hydrate().await.unwrap(), 4);
        assert!(ledger.try_acquire("d", "h", None).unwrap().is_granted());
    }

    /// Pauses every `get_by_id` until the test lets it continue.
    #[derive(Default)]
    struct PausingStore {
        inner: MemoryStore,
        entered: tokio::sync::Notify,
        resume: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl LimitStore for PausingStore {
        async fn insert(&self, def: LimitDefinition) -> Result<(), LimitError> {
            self.inner.insert(def).await
        }
        async fn get(&self, tag: &str) -> Result<Option<LimitDefinition>, LimitError> {
            self.inner.get(tag).await
        }
        async fn get_by_id(&self, id: Uuid) -> Result<Option<LimitDefinition>, LimitError> {
            self.entered.notify_one();
            self.resume.notified().await;
            self.inner.get_by_id(id).await
        }
        async fn update(&self, def: LimitDefinition) -> Result<bool, LimitError> {
            self.inner.update(def).await
        }
        async fn remove(&self, tag: &str) -> Result<Option<LimitDefinition>, LimitError> {
            self.inner.remove(tag).await
        }
        async fn list(&self, offset: usize, limit: usize) -> Result<Vec<LimitDefinition>, LimitError> {
            self.inner.list(offset, limit).await
        }
    }

    #[tokio::test]
    async fn delete_by_id_never_removes_a_recreated_tag() {
        let clock = Arc::new(ManualClock::default());
        let bus = Bus::new(64);
        let store = Arc::new(PausingStore::default());
        let ledger = Arc::new(SlotLedger::new(clock.clone(), bus.clone()));
        let reg = Arc::new(LimitRegistry::new(store.clone(), ledger, clock, bus, 10));
        let old_id = reg.create_limit("gpu", 2).await.unwrap().id;

        let by_id = tokio::spawn({
            let reg = reg.clone();
            async move { reg.delete_limit_by_id(old_id).await }
        });
        store.entered.notified().await;

        // delete and re-create the tag while the id lookup is in flight
        let recreate = tokio::spawn({
            let reg = reg.clone();
            async move {
                let _ = reg.delete_limit("gpu").await;
                reg.create_limit("gpu", 5).await
            }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        store.resume.notify_one();

        assert_eq!(by_id.await.unwrap().unwrap().id, old_id);
        let fresh = recreate.await.unwrap().unwrap();
        let live = reg.get_limit("gpu").await.unwrap();
        assert_eq!(live.id, fresh.id);
        assert_eq!(live.ceiling, 5);
    }
}
