//! # Limiter: the entry point tying registry, ledger, coordinator and sweeper together.
//!
//! The [`Limiter`] owns the event bus and the runtime token, and exposes the
//! definition CRUD of the [`LimitRegistry`] and the slot operations of the
//! [`Coordinator`] behind one handle.
//!
//! ## High-level architecture
//! ```text
//! Limiter::builder(cfg).build()
//!   ├─ Bus ──► subscriber listener ──► SubscriberSet ──► [queue S1] .. [queue SN]
//!   ├─ SlotLedger (per-tag mutex)
//!   ├─ LimitRegistry ── LimitStore ──► ledger.configure / ledger.retire
//!   ├─ Coordinator ───────────────────► ledger.try_acquire / release (sorted, LIFO rollback)
//!   └─ Sweeper (every sweep_interval) ─► ledger.expired ─► ledger.reclaim_if_expired
//!
//! Shutdown path:
//!   shutdown() / run_until_signal()
//!     └─► Bus.publish(ShutdownRequested)
//!     └─► runtime_token.cancel()
//!     └─► join workers within cfg.grace ── timeout ──► RuntimeError::GraceExceeded
//! ```
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use tagvisor::{Acquisition, Config, Limiter};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let limiter = Limiter::builder(Config::default()).build();
//!     limiter.create_limit("db-write", 1).await?;
//!
//!     let first = limiter.try_acquire("run-1", &["db-write"], None)?;
//!     assert!(first.is_granted());
//!
//!     let second = limiter.try_acquire("run-2", &["db-write"], None)?;
//!     assert_eq!(second, Acquisition::Denied { blocking_tag: "db-write".into() });
//!
//!     limiter.release("run-1", &["db-write"]);
//!     assert!(limiter.try_acquire("run-2", &["db-write"], Some(Duration::from_secs(30)))?.is_granted());
//!
//!     limiter.shutdown().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    coordinator::{Acquisition, Coordinator},
    core::{
        Config,
        builder::LimiterBuilder,
        shutdown::{self, StopCause},
        sweeper::Sweeper,
    },
    error::{LimitError, RuntimeError},
    events::{Bus, Event, EventKind},
    ledger::{Slot, SlotLedger},
    policies::RetryPolicy,
    registry::{LimitDefinition, LimitRegistry, LimitSnapshot},
};

/// Tag-scoped concurrency limiter.
///
/// Built with [`Limiter::builder`]; cheap to share behind the returned `Arc`.
pub struct Limiter {
    cfg: Config,
    bus: Bus,
    ledger: Arc<SlotLedger>,
    registry: LimitRegistry,
    coordinator: Coordinator,
    sweeper: Arc<Sweeper>,
    runtime_token: CancellationToken,
    workers: Mutex<Vec<(&'static str, JoinHandle<()>)>>,
}

impl Limiter {
    /// Creates a builder for configuring the limiter.
    pub fn builder(cfg: Config) -> LimiterBuilder {
        LimiterBuilder::new(cfg)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new_internal(
        cfg: Config,
        bus: Bus,
        ledger: Arc<SlotLedger>,
        registry: LimitRegistry,
        coordinator: Coordinator,
        sweeper: Arc<Sweeper>,
        runtime_token: CancellationToken,
        workers: Vec<(&'static str, JoinHandle<()>)>,
    ) -> Self {
        Self {
            cfg,
            bus,
            ledger,
            registry,
            coordinator,
            sweeper,
            runtime_token,
            workers: Mutex::new(workers),
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Subscribes to the raw event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// Per-tag slot accounting.
    pub fn ledger(&self) -> &Arc<SlotLedger> {
        &self.ledger
    }

    /// Definition CRUD.
    pub fn registry(&self) -> &LimitRegistry {
        &self.registry
    }

    // === Limit registry ===

    /// Creates a limit (`ceiling = 0` means unlimited).
    pub async fn create_limit(&self, tag: &str, ceiling: i64) -> Result<LimitDefinition, LimitError> {
        self.registry.create_limit(tag, ceiling).await
    }

    /// Creates a limit carrying caller metadata.
    pub async fn create_limit_with_metadata(
        &self,
        tag: &str,
        ceiling: i64,
        metadata: serde_json::Value,
    ) -> Result<LimitDefinition, LimitError> {
        self.registry
            .create_limit_with_metadata(tag, ceiling, Some(metadata))
            .await
    }

    /// Changes the ceiling of an existing limit.
    pub async fn set_ceiling(&self, tag: &str, ceiling: i64) -> Result<LimitDefinition, LimitError> {
        self.registry.set_ceiling(tag, ceiling).await
    }

    pub async fn get_limit(&self, tag: &str) -> Result<LimitDefinition, LimitError> {
        self.registry.get_limit(tag).await
    }

    pub async fn get_limit_by_id(&self, id: Uuid) -> Result<LimitDefinition, LimitError> {
        self.registry.get_limit_by_id(id).await
    }

    /// Deletes a limit; current holders drain, new acquisitions fail with `NotFound`.
    pub async fn delete_limit(&self, tag: &str) -> Result<LimitDefinition, LimitError> {
        self.registry.delete_limit(tag).await
    }

    pub async fn delete_limit_by_id(&self, id: Uuid) -> Result<LimitDefinition, LimitError> {
        self.registry.delete_limit_by_id(id).await
    }

    /// Page of definitions ordered by tag.
    pub async fn list_limits(&self, offset: usize, limit: usize) -> Result<Vec<LimitDefinition>, LimitError> {
        self.registry.list_limits(offset, limit).await
    }

    /// Definition of `tag` plus its live slots.
    pub async fn snapshot(&self, tag: &str) -> Result<LimitSnapshot, LimitError> {
        self.registry.snapshot(tag).await
    }

    /// Loads the definitions of a pre-populated store into the ledger.
    pub async fn hydrate(&self) -> Result<usize, LimitError> {
        self.registry.hydrate().await
    }

    // === Slots ===

    /// All-or-nothing, non-blocking acquisition of one slot per tag.
    ///
    /// `lease = None` applies [`Config::default_lease`]; `Some(Duration::ZERO)`
    /// acquires without expiry.
    pub fn try_acquire<S: AsRef<str>>(
        &self,
        holder: &str,
        tags: &[S],
        lease: Option<Duration>,
    ) -> Result<Acquisition, LimitError> {
        self.coordinator
            .try_acquire_set(holder, tags, self.cfg.resolve_lease(lease))
    }

    /// Acquisition that waits for capacity using [`Config::retry`].
    ///
    /// Gives back the last `Denied` when `token` is cancelled or the attempt
    /// budget is spent.
    pub async fn acquire<S: AsRef<str>>(
        &self,
        holder: &str,
        tags: &[S],
        lease: Option<Duration>,
        token: &CancellationToken,
    ) -> Result<Acquisition, LimitError> {
        self.acquire_with(holder, tags, lease, self.cfg.retry, token)
            .await
    }

    /// Waiting acquisition with an explicit retry policy.
    pub async fn acquire_with<S: AsRef<str>>(
        &self,
        holder: &str,
        tags: &[S],
        lease: Option<Duration>,
        retry: RetryPolicy,
        token: &CancellationToken,
    ) -> Result<Acquisition, LimitError> {
        self.coordinator
            .acquire_set(holder, tags, self.cfg.resolve_lease(lease), retry, token)
            .await
    }

    /// Releases `holder`'s slot in each tag; returns how many were held.
    pub fn release<S: AsRef<str>>(&self, holder: &str, tags: &[S]) -> usize {
        self.coordinator.release(holder, tags)
    }

    /// Extends `holder`'s lease in each tag.
    ///
    /// Returns the new deadline (`None` = never expires).
    pub fn renew_lease<S: AsRef<str>>(
        &self,
        holder: &str,
        tags: &[S],
        lease: Option<Duration>,
    ) -> Result<Option<DateTime<Utc>>, LimitError> {
        self.coordinator
            .renew_lease(holder, tags, self.cfg.resolve_lease(lease))
    }

    /// Slots currently held for `tag`.
    pub fn held_count(&self, tag: &str) -> u32 {
        self.ledger.held_count(tag)
    }

    /// Live slots of `tag`, oldest grant first.
    pub fn holders(&self, tag: &str) -> Vec<Slot> {
        self.ledger.holders(tag)
    }

    /// Runs one sweeper pass immediately; returns the number of reclaimed slots.
    pub fn sweep_now(&self) -> usize {
        self.sweeper.sweep_once()
    }

    // === Lifecycle ===

    /// Waits for a termination signal (or an explicit [`shutdown`](Self::shutdown)
    /// from elsewhere), then shuts down.
    pub async fn run_until_signal(&self) -> Result<(), RuntimeError> {
        match shutdown::wait_for_stop(&self.runtime_token).await {
            StopCause::Signal => {
                info!("termination signal received");
                self.shutdown().await
            }
            StopCause::Cancelled => Ok(()),
        }
    }

    /// Stops the background workers and waits up to [`Config::grace`].
    ///
    /// Idempotent: later calls find nothing left to join.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        let workers = std::mem::take(&mut *self.workers.lock());
        if !self.runtime_token.is_cancelled() {
            self.bus.publish(Event::new(EventKind::ShutdownRequested));
            self.runtime_token.cancel();
        }

        let grace = self.cfg.grace;
        let deadline = tokio::time::Instant::now() + grace;
        let mut stuck = Vec::new();
        for (name, mut handle) in workers {
            if tokio::time::timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                stuck.push(name.to_string());
            }
        }

        if stuck.is_empty() {
            info!("limiter stopped");
            Ok(())
        } else {
            warn!(?grace, ?stuck, "workers did not stop within grace");
            Err(RuntimeError::GraceExceeded { grace, stuck })
        }
    }
}

impl Drop for Limiter {
    fn drop(&mut self) {
        self.runtime_token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn limiter(cfg: Config) -> (Arc<Limiter>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::default());
        let limiter = Limiter::builder(cfg).with_clock(clock.clone()).build();
        (limiter, clock)
    }

    #[tokio::test]
    async fn default_lease_applies_unless_overridden() {
        let (l, clock) = limiter(Config {
            default_lease: Duration::from_secs(10),
            sweep_interval: Duration::ZERO,
            ..Config::default()
        });
        l.create_limit("db", 3).await.unwrap();

        l.try_acquire("a", &["db"], None).unwrap();
        l.try_acquire("b", &["db"], Some(Duration::ZERO)).unwrap();
        l.try_acquire("c", &["db"], Some(Duration::from_secs(60))).unwrap();

        clock.advance(Duration::from_secs(11));
        assert_eq!(l.sweep_now(), 1);
        let left: Vec<_> = l.holders("db").into_iter().map(|s| s.holder_id).collect();
        assert_eq!(left, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let (l, _) = limiter(Config {
            sweep_interval: Duration::from_millis(10),
            ..Config::default()
        });
        l.shutdown().await.unwrap();
        l.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn run_until_signal_returns_after_explicit_shutdown() {
        let (l, _) = limiter(Config::default());
        let runner = {
            let l = Arc::clone(&l);
            tokio::spawn(async move { l.run_until_signal().await })
        };
        l.shutdown().await.unwrap();
        tokio::time::timeout(Duration::from_secs(1), runner)
            .await
            .expect("runner finished")
            .expect("join")
            .unwrap();
    }
}
