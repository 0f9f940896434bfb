//! Runtime core: configuration and lifecycle.
//!
//! The public API from this module is [`Limiter`] (with its [`LimiterBuilder`])
//! and [`Config`].
//!
//! Internal modules:
//! - [`limiter`]: the entry point wiring registry, ledger and coordinator;
//! - [`builder`]: assembles the runtime and spawns background workers;
//! - [`sweeper`]: reclaims expired leases on a fixed interval;
//! - [`shutdown`]: cross-platform shutdown signal handling.

mod builder;
mod config;
mod limiter;
mod shutdown;
mod sweeper;

pub use builder::LimiterBuilder;
pub use config::Config;
pub use limiter::Limiter;
pub use sweeper::Sweeper;
