//! # Fan-out of bus events to user subscribers.
//!
//! Every [`Subscribe`] implementation gets its own bounded queue and worker
//! task, so a slow audit sink never holds back a metrics exporter and never
//! holds back the ledger that published the event.
//!
//! ```text
//! emit(ev) ─┬─ try_send ─► [queue "audit"]   ─► worker ─► audit.on_event(ev)
//!           ├─ try_send ─► [queue "metrics"] ─► worker ─► metrics.on_event(ev)
//!           └─ full/closed ─► Bus ◄─ SubscriberOverflow { holder = name }
//! ```
//!
//! Each subscriber sees events in emission order; there is no ordering across
//! subscribers. A panic inside `on_event` is caught, reported as
//! `SubscriberPanicked`, and the worker moves on to the next event. That report
//! is not delivered back to the subscriber that panicked, and a panic while
//! handling a `SubscriberPanicked` event is only logged. The worker
//! runs the handler under `AssertUnwindSafe`, so state a subscriber shares
//! behind a lock may be left half-updated by its own panic.

use std::any::Any;
use std::sync::Arc;

use futures::FutureExt;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::warn;

use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

struct Lane {
    name: &'static str,
    tx: mpsc::Sender<Arc<Event>>,
}

/// Bounded, panic-isolated delivery to a fixed list of subscribers.
pub struct SubscriberSet {
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl SubscriberSet {
    /// Starts one worker per subscriber. Needs a running tokio runtime.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let (lanes, workers): (Vec<Lane>, Vec<JoinHandle<()>>) = subs
            .into_iter()
            .map(|sub| {
                let (tx, rx) = mpsc::channel(sub.queue_capacity().max(1));
                let lane = Lane {
                    name: sub.name(),
                    tx,
                };
                (lane, tokio::spawn(drive(sub, rx, bus.clone())))
            })
            .unzip();
        Self {
            lanes,
            workers,
            bus,
        }
    }

    /// Queues a copy of `event` for every subscriber.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Queues a shared event for every subscriber without blocking.
    ///
    /// A full or closed queue drops the event for that subscriber and
    /// publishes `SubscriberOverflow` (except for overflow events themselves,
    /// which would otherwise feed back into the bus).
    pub fn emit_arc(&self, event: Arc<Event>) {
        let report = event.kind != EventKind::SubscriberOverflow;
        let origin = match event.kind {
            EventKind::SubscriberPanicked => event.holder.as_deref(),
            _ => None,
        };
        for lane in &self.lanes {
            if origin == Some(lane.name) {
                continue;
            }
            let reason = match lane.tx.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if report {
                warn!(subscriber = lane.name, reason, seq = event.seq, "event dropped for subscriber");
                self.bus
                    .publish(Event::subscriber_overflow(lane.name, reason));
            }
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lanes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lanes.len()
    }

    /// Closes every queue and waits until the workers have drained them.
    pub async fn shutdown(self) {
        drop(self.lanes);
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

/// Worker loop of one subscriber.
async fn drive(sub: Arc<dyn Subscribe>, mut rx: mpsc::Receiver<Arc<Event>>, bus: Bus) {
    while let Some(ev) = rx.recv().await {
        let handled = std::panic::AssertUnwindSafe(sub.on_event(&ev))
            .catch_unwind()
            .await;
        if let Err(payload) = handled {
            let info = panic_message(payload.as_ref());
            warn!(subscriber = sub.name(), %info, "subscriber panicked");
            if !ev.is_subscriber_panic() {
                bus.publish(Event::subscriber_panicked(sub.name(), info));
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Collect(Arc<Mutex<Vec<EventKind>>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().push(ev.kind);
        }
        fn name(&self) -> &'static str {
            "collect"
        }
    }

    struct Boom {
        name: &'static str,
        calls: Arc<AtomicUsize>,
    }

    impl Boom {
        fn new(name: &'static str) -> Self {
            Self {
                name,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    #[async_trait]
    impl Subscribe for Boom {
        async fn on_event(&self, _ev: &Event) {
            self.calls.fetch_add(1, Ordering::SeqCst);
            panic!("boom");
        }
        fn name(&self) -> &'static str {
            self.name
        }
    }

    struct Stuck;

    #[async_trait]
    impl Subscribe for Stuck {
        async fn on_event(&self, _ev: &Event) {
            std::future::pending::<()>().await;
        }
        fn name(&self) -> &'static str {
            "stuck"
        }
        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn delivers_in_order_and_shuts_down() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let set = SubscriberSet::new(vec![Arc::new(Collect(seen.clone()))], Bus::new(8));
        assert_eq!(set.len(), 1);

        set.emit(&Event::new(EventKind::SlotGranted));
        set.emit(&Event::new(EventKind::SlotReleased));
        set.shutdown().await;

        assert_eq!(
            *seen.lock(),
            vec![EventKind::SlotGranted, EventKind::SlotReleased]
        );
    }

    #[tokio::test]
    async fn panic_is_reported_on_bus() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Boom::new("boom"))], bus.clone());

        set.emit(&Event::new(EventKind::SlotGranted));

        let ev = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timely")
            .expect("event");
        assert!(ev.is_subscriber_panic());
        assert_eq!(ev.reason.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn panic_reports_do_not_feed_back() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let a = Boom::new("boom-a");
        let b = Boom::new("boom-b");
        let (a_calls, b_calls) = (a.calls.clone(), b.calls.clone());
        let set = SubscriberSet::new(vec![Arc::new(a), Arc::new(b)], bus.clone());

        // forward everything the workers publish, the way the limiter listener does
        set.emit(&Event::new(EventKind::LimitCreated));
        for _ in 0..2 {
            let ev = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .expect("timely")
                .expect("event");
            assert!(ev.is_subscriber_panic());
            set.emit(&ev);
        }
        tokio::time::sleep(Duration::from_millis(50)).await;

        // each one saw the original event and the other's report, nothing more
        assert_eq!(a_calls.load(Ordering::SeqCst), 2);
        assert_eq!(b_calls.load(Ordering::SeqCst), 2);
        assert!(rx.try_recv().is_err());
        set.shutdown().await;
    }

    #[tokio::test]
    async fn full_queue_reports_overflow() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let set = SubscriberSet::new(vec![Arc::new(Stuck)], bus.clone());

        for _ in 0..4 {
            set.emit(&Event::new(EventKind::SlotDenied));
            tokio::task::yield_now().await;
        }

        let ev = tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timely")
            .expect("event");
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.holder.as_deref(), Some("stuck"));
    }
}
