use std::sync::Arc;

use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::{ClockRef, SystemClock},
    coordinator::Coordinator,
    core::Config,
    events::{Bus, Event},
    ledger::SlotLedger,
    registry::{LimitRegistry, LimitStore, MemoryStore},
    subscribers::{Subscribe, SubscriberSet},
};

use super::{limiter::Limiter, sweeper::Sweeper};

/// Builder for constructing a [`Limiter`] with optional collaborators.
pub struct LimiterBuilder {
    cfg: Config,
    subscribers: Vec<Arc<dyn Subscribe>>,
    store: Option<Arc<dyn LimitStore>>,
    clock: Option<ClockRef>,
}

impl LimiterBuilder {
    /// Creates a new builder with the given configuration.
    pub fn new(cfg: Config) -> Self {
        Self {
            cfg,
            subscribers: Vec::new(),
            store: None,
            clock: None,
        }
    }

    /// Sets event subscribers for observability.
    ///
    /// Subscribers receive runtime events (grants, denials, reclamations, ...)
    /// through dedicated workers with bounded queues.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Sets the definition store (defaults to [`MemoryStore`]).
    ///
    /// A store that already holds definitions needs
    /// [`Limiter::hydrate`] before the first acquisition.
    pub fn with_store(mut self, store: Arc<dyn LimitStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Sets the time source (defaults to [`SystemClock`]).
    pub fn with_clock(mut self, clock: ClockRef) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds and returns the Limiter instance.
    ///
    /// Initializes the event bus, ledger, registry and coordinator, then spawns
    /// the background workers:
    /// - subscriber fan-out (only when subscribers were given)
    /// - lease expiry sweeper (only when `sweep_interval > 0`)
    ///
    /// Must be called from within a tokio runtime.
    pub fn build(self) -> Arc<Limiter> {
        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStore::new()));
        let runtime_token = CancellationToken::new();

        let ledger = Arc::new(SlotLedger::new(Arc::clone(&clock), bus.clone()));
        let registry = LimitRegistry::new(
            store,
            Arc::clone(&ledger),
            Arc::clone(&clock),
            bus.clone(),
            self.cfg.max_list_limit_clamped(),
        );
        let coordinator = Coordinator::new(Arc::clone(&ledger));
        let sweeper = Arc::new(Sweeper::new(
            Arc::clone(&ledger),
            bus.clone(),
            self.cfg.sweep_interval,
        ));

        let mut workers = Vec::new();
        if !self.subscribers.is_empty() {
            let rx = bus.subscribe();
            let subs = SubscriberSet::new(self.subscribers, bus.clone());
            workers.push((
                "subscribers",
                tokio::spawn(subscriber_listener(rx, subs, runtime_token.clone())),
            ));
        }
        if self.cfg.sweep_period().is_some() {
            workers.push((
                "sweeper",
                tokio::spawn(Arc::clone(&sweeper).run(runtime_token.clone())),
            ));
        }

        Arc::new(Limiter::new_internal(
            self.cfg,
            bus,
            ledger,
            registry,
            coordinator,
            sweeper,
            runtime_token,
            workers,
        ))
    }
}

/// Forwards bus events to the subscriber set until the runtime stops.
///
/// On cancellation it drains what is already queued on the bus, then closes
/// the subscriber workers and waits for them.
async fn subscriber_listener(
    mut rx: broadcast::Receiver<Event>,
    set: SubscriberSet,
    token: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            res = rx.recv() => match res {
                Ok(ev) => set.emit(&ev),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "subscriber listener lagged behind the bus");
                }
                Err(RecvError::Closed) => break,
            },
            _ = token.cancelled() => break,
        }
    }
    while let Ok(ev) = rx.try_recv() {
        set.emit(&ev);
    }
    set.shutdown().await;
}
