//! In-process collaborators.
//!
//! A TTL cache and a tracker store that live in one process's memory. They
//! honor the same contracts as the Postgres adapters in [`crate::db`] and
//! back single-process deployments and tests.

pub mod cache;
pub mod store;

pub use cache::MemoryCache;
pub use store::MemoryTrackerStore;
