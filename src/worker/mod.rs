//! Worker: pulls delivered jobs from the queue, reconciles them with their
//! trackers, and runs the configured executable.

pub mod control;
pub mod runner;

pub use control::{Worker, WorkerConfig};
pub use runner::{RunOutcome, run_command};
