//! # LogWriter: event renderer over `tracing`
//!
//! A subscriber that renders every incoming [`Event`] as a structured
//! `tracing` record. Install any `tracing` subscriber to see them.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO tagvisor: limit created tag="db-write" ceiling=1
//! DEBUG tagvisor: slot granted tag="db-write" holder="run-1" held=1 ceiling=1
//! DEBUG tagvisor: slot denied tag="db-write" holder="run-2" held=1 ceiling=1
//! WARN tagvisor: slot reclaimed tag="db-write" holder="run-1" overdue_ms=1500
//! ```

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let tag = e.tag.as_deref().unwrap_or("-");
        let holder = e.holder.as_deref().unwrap_or("-");
        match e.kind {
            EventKind::LimitCreated => {
                info!(target: "tagvisor", seq = e.seq, tag, ceiling = ?e.ceiling, "limit created");
            }
            EventKind::LimitUpdated => {
                info!(target: "tagvisor", seq = e.seq, tag, ceiling = ?e.ceiling, held = ?e.held, "limit updated");
            }
            EventKind::LimitDeleted => {
                info!(target: "tagvisor", seq = e.seq, tag, draining = ?e.held, "limit deleted");
            }
            EventKind::SlotGranted => {
                debug!(target: "tagvisor", seq = e.seq, tag, holder, held = ?e.held, ceiling = ?e.ceiling, lease_ms = ?e.lease_ms, "slot granted");
            }
            EventKind::SlotDenied => {
                debug!(target: "tagvisor", seq = e.seq, tag, holder, held = ?e.held, ceiling = ?e.ceiling, "slot denied");
            }
            EventKind::SlotReleased => {
                debug!(target: "tagvisor", seq = e.seq, tag, holder, held = ?e.held, "slot released");
            }
            EventKind::LeaseRenewed => {
                debug!(target: "tagvisor", seq = e.seq, tag, holder, lease_ms = ?e.lease_ms, "lease renewed");
            }
            EventKind::SlotReclaimed => {
                warn!(target: "tagvisor", seq = e.seq, tag, holder, overdue_ms = ?e.overdue_ms, held = ?e.held, "slot reclaimed");
            }
            EventKind::SweepCompleted => {
                debug!(target: "tagvisor", seq = e.seq, reclaimed = ?e.held, "sweep completed");
            }
            EventKind::ShutdownRequested => {
                info!(target: "tagvisor", seq = e.seq, "shutdown requested");
            }
            EventKind::SubscriberOverflow => {
                warn!(target: "tagvisor", seq = e.seq, subscriber = holder, reason = ?e.reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                warn!(target: "tagvisor", seq = e.seq, subscriber = holder, reason = ?e.reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
