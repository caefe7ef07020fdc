//! Core data model.
//!
//! A tracker records which scheduled execution currently satisfies a logical
//! job key. A job descriptor carries a job type's immutable policy and key
//! derivation; a job invocation is one request to schedule that type.

pub mod job;
pub mod policy;
pub mod tracker;

pub use job::{JobDescriptor, JobInvocation, KeyFn};
pub use policy::{Policy, PolicyOptions, Throttle};
pub use tracker::{ProviderJobId, Tracker, TrackerId};
