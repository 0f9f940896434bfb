//! # Limit registry.
//!
//! Tag → [`LimitDefinition`] mapping with create/read/update/delete/list
//! operations, backed by a pluggable [`LimitStore`].

mod core;
mod definition;
mod store;

pub use self::core::LimitRegistry;
pub use definition::{LimitDefinition, LimitSnapshot};
pub use store::{LimitStore, MemoryStore};
