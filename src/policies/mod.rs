//! Wait policies for callers blocked on saturated tags.
//!
//! The ledger and coordinator never wait: every acquisition is a bounded,
//! non-blocking attempt. Waiting is a caller concern, and these knobs drive
//! the optional waiting helper [`Limiter::acquire`](crate::Limiter::acquire).
//!
//! ## Contents
//! - [`BackoffPolicy`] how waits evolve (first / factor / max + jitter)
//! - [`JitterPolicy`]  randomization strategy so competing waiters spread out
//! - [`RetryPolicy`]   backoff plus an optional attempt cap
//!
//! ## Defaults
//! - `BackoffPolicy::default()` → first=25ms, factor=2.0, max=1s, jitter=Equal.
//! - `RetryPolicy::default()` → default backoff, unlimited attempts.

mod backoff;
mod jitter;
mod retry;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
pub use retry::RetryPolicy;
