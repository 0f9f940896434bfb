use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::LimitError;
use crate::ledger::{Admission, SlotLedger};
use crate::policies::RetryPolicy;

use super::acquisition::Acquisition;

/// Releases the slots taken by an unfinished attempt when dropped.
///
/// Armed until every tag succeeded, so an early return, an error or a panic
/// between two `try_acquire` calls all end in the same LIFO rollback.
struct Rollback<'a> {
    ledger: &'a SlotLedger,
    holder: &'a str,
    taken: Vec<&'a str>,
    armed: bool,
}

impl<'a> Rollback<'a> {
    fn new(ledger: &'a SlotLedger, holder: &'a str, capacity: usize) -> Self {
        Self {
            ledger,
            holder,
            taken: Vec::with_capacity(capacity),
            armed: true,
        }
    }

    fn commit(mut self) {
        self.armed = false;
    }
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for tag in self.taken.iter().rev() {
            self.ledger.release_with_reason(tag, self.holder, "rollback");
        }
    }
}

/// All-or-nothing acquisition across a set of tags.
#[derive(Clone)]
pub struct Coordinator {
    ledger: Arc<SlotLedger>,
}

impl Coordinator {
    pub fn new(ledger: Arc<SlotLedger>) -> Self {
        Self { ledger }
    }

    /// Tries to take one slot in every tag for `holder`, without waiting.
    ///
    /// ### Algorithm
    /// 1. Sort and dedupe tags so every caller walks them in the same order.
    /// 2. `try_acquire` each in order; on the first denial release what this
    ///    attempt took (LIFO) and return `Denied(blocking_tag)`.
    /// 3. Otherwise return `Granted` with the common lease deadline.
    ///
    /// Errors (`NotFound`, `Conflict`) are raised only after the rollback, so
    /// the caller never observes a half-granted set.
    pub fn try_acquire_set<S: AsRef<str>>(
        &self,
        holder: &str,
        tags: &[S],
        lease: Option<Duration>,
    ) -> Result<Acquisition, LimitError> {
        let ordered = normalize(holder, tags)?;
        let now = self.ledger.now();

        let mut rollback = Rollback::new(&self.ledger, holder, ordered.len());
        let mut lease_expires_at: Option<DateTime<Utc>> = None;
        for tag in ordered {
            match self.ledger.try_acquire_at(tag, holder, lease, now)? {
                Admission::Granted {
                    lease_expires_at: deadline,
                } => {
                    lease_expires_at = deadline;
                    rollback.taken.push(tag);
                }
                Admission::Denied { held, ceiling } => {
                    debug!(holder, tag, held, ceiling, taken = rollback.taken.len(), "set denied; rolling back");
                    return Ok(Acquisition::Denied {
                        blocking_tag: tag.to_string(),
                    });
                }
            }
        }
        rollback.commit();
        Ok(Acquisition::Granted { lease_expires_at })
    }

    /// Releases `holder`'s slot in every listed tag. Idempotent.
    ///
    /// Returns how many slots were actually removed.
    pub fn release<S: AsRef<str>>(&self, holder: &str, tags: &[S]) -> usize {
        tags.iter()
            .filter(|tag| self.ledger.release(tag.as_ref(), holder))
            .count()
    }

    /// Renews `holder`'s lease in every listed tag.
    ///
    /// Fails with `NotFound` on the first tag where the holder has no slot
    /// (already reclaimed, released, or tag deleted).
    pub fn renew_lease<S: AsRef<str>>(
        &self,
        holder: &str,
        tags: &[S],
        lease: Option<Duration>,
    ) -> Result<Option<DateTime<Utc>>, LimitError> {
        let ordered = normalize(holder, tags)?;
        let mut lease_expires_at = None;
        for tag in ordered {
            lease_expires_at = self.ledger.renew_lease(tag, holder, lease)?;
        }
        Ok(lease_expires_at)
    }

    /// Repeats [`try_acquire_set`](Self::try_acquire_set) until granted,
    /// cancelled, or the retry budget is spent.
    ///
    /// Between attempts it sleeps per `retry.backoff`, waking early when the
    /// last blocking tag frees a slot. No slot is held while waiting, so
    /// dropping this future at any await point leaves nothing behind.
    ///
    /// On cancellation or an exhausted budget it returns the last `Denied`.
    pub async fn acquire_set<S: AsRef<str>>(
        &self,
        holder: &str,
        tags: &[S],
        lease: Option<Duration>,
        retry: RetryPolicy,
        token: &CancellationToken,
    ) -> Result<Acquisition, LimitError> {
        let mut watch: Option<Arc<Notify>> = None;
        let mut attempt: u32 = 0;
        let mut slept: Option<Duration> = None;

        loop {
            let notify = watch.clone();
            let notified = notify.as_deref().map(Notify::notified);

            attempt = attempt.saturating_add(1);
            let outcome = self.try_acquire_set(holder, tags, lease)?;
            let Acquisition::Denied { blocking_tag } = &outcome else {
                return Ok(outcome);
            };
            if token.is_cancelled() {
                return Ok(outcome);
            }
            let Some(delay) = retry.delay_after(attempt, slept) else {
                return Ok(outcome);
            };
            slept = Some(delay);
            debug!(holder, blocking_tag = blocking_tag.as_str(), attempt, ?delay, "waiting for capacity");

            let woken = async {
                match notified {
                    Some(n) => n.await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = woken => {}
                _ = token.cancelled() => return Ok(outcome),
            }
            watch = self.ledger.freed(blocking_tag);
        }
    }
}

/// Validates inputs and returns tags sorted lexicographically without duplicates.
fn normalize<'a, S: AsRef<str>>(holder: &str, tags: &'a [S]) -> Result<Vec<&'a str>, LimitError> {
    if holder.is_empty() {
        return Err(LimitError::invalid("holder id must not be empty"));
    }
    if tags.is_empty() {
        return Err(LimitError::invalid("tag set must not be empty"));
    }
    let mut ordered: Vec<&str> = tags.iter().map(AsRef::as_ref).collect();
    ordered.sort_unstable();
    ordered.dedup();
    Ok(ordered)
}
