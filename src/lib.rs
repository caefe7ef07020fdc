//! # deferq
//!
//! Deferred job coordinator. Derives a key from each scheduling request,
//! throttles and debounces requests sharing a key through a TTL cache, and
//! keeps one tracker per key naming the execution currently expected to
//! satisfy it.
//!
//! Ships in-process collaborators ([`memory`]), Postgres collaborators
//! ([`db`]), a pgmq host adapter ([`queue`]), a worker ([`worker`]), and
//! OpenTelemetry observability ([`telemetry`]).

pub mod cache;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod key;
pub mod memory;
pub mod model;
pub mod queue;
pub mod registry;
pub mod store;
pub mod telemetry;
pub mod worker;

pub use coordinator::{Admission, Coordinator, Enqueued, Resumed, Submission};
pub use error::{Error, Result};
