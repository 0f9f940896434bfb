//! # Lease expiry sweeper.
//!
//! Periodically returns slots whose holders stopped renewing.
//!
//! ## Pass
//! ```text
//! for tag in ledger.tags():
//!     for slot in ledger.expired(tag, now):          (scan, may be stale)
//!         ledger.reclaim_if_expired(tag, holder, now) (re-reads the deadline under the tag mutex)
//! publish(SweepCompleted { held = reclaimed })
//! ```
//!
//! ## Rules
//! - A renewal that lands between the scan and the removal wins.
//! - A pass that panics is logged; the next tick runs a fresh pass.
//! - Tags are independent; a pass never holds more than one tag mutex.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{Bus, Event, EventKind};
use crate::ledger::SlotLedger;

/// Background worker reclaiming expired leases.
pub struct Sweeper {
    ledger: Arc<SlotLedger>,
    bus: Bus,
    interval: Duration,
}

impl Sweeper {
    pub fn new(ledger: Arc<SlotLedger>, bus: Bus, interval: Duration) -> Self {
        Self {
            ledger,
            bus,
            interval,
        }
    }

    /// Runs one pass at the ledger's current time.
    ///
    /// Returns the number of reclaimed slots.
    pub fn sweep_once(&self) -> usize {
        let now = self.ledger.now();
        let mut reclaimed = 0usize;

        for tag in self.ledger.tags() {
            for slot in self.ledger.expired(&tag, now) {
                if self
                    .ledger
                    .reclaim_if_expired(&slot.tag, &slot.holder, now)
                    .is_some()
                {
                    reclaimed += 1;
                } else {
                    debug!(tag = &*slot.tag, holder = &*slot.holder, "slot renewed or released before reclaim");
                }
            }
        }

        self.bus.publish(
            Event::new(EventKind::SweepCompleted)
                .with_held(u32::try_from(reclaimed).unwrap_or(u32::MAX)),
        );
        reclaimed
    }

    /// Sweeps every `interval` until `token` is cancelled.
    pub async fn run(self: Arc<Self>, token: CancellationToken) {
        if self.interval.is_zero() {
            return;
        }
        info!(interval_ms = self.interval.as_millis() as u64, "sweeper started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // the first tick completes immediately
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(|| self.sweep_once())) {
                        let info = panic
                            .downcast_ref::<&'static str>()
                            .map(|s| (*s).to_string())
                            .or_else(|| panic.downcast_ref::<String>().cloned())
                            .unwrap_or_else(|| "unknown panic".to_string());
                        warn!(%info, "sweep pass failed; retrying on next tick");
                    }
                }
            }
        }
        info!("sweeper stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};

    fn setup() -> (Sweeper, Arc<SlotLedger>, Arc<ManualClock>, Bus) {
        let clock = Arc::new(ManualClock::default());
        let bus = Bus::new(64);
        let ledger = Arc::new(SlotLedger::new(clock.clone(), bus.clone()));
        let sweeper = Sweeper::new(ledger.clone(), bus.clone(), Duration::from_millis(10));
        (sweeper, ledger, clock, bus)
    }

    #[test]
    fn reclaims_only_overdue_slots() {
        let (sweeper, ledger, clock, _) = setup();
        ledger.configure("db", 3);
        ledger.configure("gpu", 1);
        ledger.try_acquire("db", "short", Some(Duration::from_secs(1))).unwrap();
        ledger.try_acquire("db", "long", Some(Duration::from_secs(60))).unwrap();
        ledger.try_acquire("db", "forever", None).unwrap();
        ledger.try_acquire("gpu", "short", Some(Duration::from_secs(1))).unwrap();

        assert_eq!(sweeper.sweep_once(), 0);
        clock.advance(Duration::from_secs(2));
        assert_eq!(sweeper.sweep_once(), 2);

        let left: Vec<_> = ledger.holders("db").into_iter().map(|s| s.holder_id).collect();
        assert_eq!(left, vec!["forever", "long"]);
        assert_eq!(ledger.held_count("gpu"), 0);
    }

    #[test]
    fn renewal_before_deadline_prevents_reclaim() {
        let (sweeper, ledger, clock, _) = setup();
        ledger.configure("db", 1);
        ledger.try_acquire("db", "h1", Some(Duration::from_secs(5))).unwrap();

        clock.advance(Duration::from_secs(4));
        ledger.renew_lease("db", "h1", Some(Duration::from_secs(5))).unwrap();
        clock.advance(Duration::from_secs(4));

        assert_eq!(sweeper.sweep_once(), 0);
        assert_eq!(ledger.held_count("db"), 1);
    }

    #[test]
    fn drained_deleted_tag_is_pruned() {
        let (sweeper, ledger, clock, _) = setup();
        ledger.configure("db", 1);
        ledger.try_acquire("db", "h1", Some(Duration::from_secs(1))).unwrap();
        ledger.retire("db");
        assert_eq!(ledger.tags().len(), 1);

        clock.set(clock.now() + chrono::Duration::seconds(2));
        assert_eq!(sweeper.sweep_once(), 1);
        assert!(ledger.tags().is_empty());
    }

    #[tokio::test]
    async fn publishes_reclaim_and_completion_events() {
        let (sweeper, ledger, clock, bus) = setup();
        let mut rx = bus.subscribe();
        ledger.configure("db", 1);
        ledger.try_acquire("db", "h1", Some(Duration::from_secs(1))).unwrap();
        clock.advance(Duration::from_secs(3));
        sweeper.sweep_once();

        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            if ev.kind == EventKind::SlotReclaimed {
                assert_eq!(ev.holder.as_deref(), Some("h1"));
                assert!(ev.overdue_ms.unwrap_or(0) >= 2000);
            }
            kinds.push(ev.kind);
        }
        assert!(kinds.contains(&EventKind::SlotReclaimed));
        assert_eq!(kinds.last(), Some(&EventKind::SweepCompleted));
    }

    #[tokio::test]
    async fn run_loop_reclaims_and_stops_on_cancel() {
        let (sweeper, ledger, clock, _) = setup();
        ledger.configure("db", 1);
        ledger.try_acquire("db", "h1", Some(Duration::from_secs(1))).unwrap();
        clock.advance(Duration::from_secs(2));

        let token = CancellationToken::new();
        let handle = tokio::spawn(Arc::new(sweeper).run(token.clone()));
        tokio::time::timeout(Duration::from_secs(2), async {
            while ledger.held_count("db") > 0 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("reclaimed by the loop");

        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("stopped")
            .expect("join");
    }
}
