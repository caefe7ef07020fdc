//! Metric instrument factories for deferq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"deferq"` meter.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for deferq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("deferq")
}

/// Counter: enqueue decisions.
/// Labels: `job_type`, `decision` ("admitted" | "throttled" | "debounced" | "suppressed").
pub fn enqueue_decisions() -> Counter<u64> {
    meter()
        .u64_counter("deferq.enqueue.decisions")
        .with_description("Enqueue attempts by coordinator decision")
        .build()
}

/// Counter: trackers written after an admitted submission.
/// Labels: `job_type`.
pub fn trackers_saved() -> Counter<u64> {
    meter()
        .u64_counter("deferq.trackers.saved")
        .with_description("Trackers persisted after enqueue")
        .build()
}

/// Counter: trackers removed after execution.
pub fn trackers_deleted() -> Counter<u64> {
    meter()
        .u64_counter("deferq.trackers.deleted")
        .with_description("Trackers deleted after execution")
        .build()
}

/// Counter: tracker saves rejected by the key uniqueness constraint.
/// Labels: `job_type`.
pub fn tracker_conflicts() -> Counter<u64> {
    meter()
        .u64_counter("deferq.trackers.conflicts")
        .with_description("Tracker saves that hit the key uniqueness constraint")
        .build()
}

/// Counter: post-execution cleanups that failed and were swallowed.
pub fn cleanup_failures() -> Counter<u64> {
    meter()
        .u64_counter("deferq.cleanup.failures")
        .with_description("Tracker cleanups that failed after execution")
        .build()
}

/// Counter: queue-level operations (create, send, read, archive, delete).
/// Labels: `queue`, `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("deferq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}

/// Bucket bounds for [`job_duration_ms`]. Job commands run from a few
/// milliseconds up to the visibility timeout; skipped jobs land in the first
/// bucket.
pub const JOB_DURATION_BUCKETS_MS: [f64; 12] = [
    0.0, 5.0, 25.0, 100.0, 250.0, 1_000.0, 2_500.0, 5_000.0, 10_000.0, 30_000.0, 60_000.0,
    300_000.0,
];

/// Histogram: job execution duration in milliseconds.
/// Labels: `job_type`, `result` ("ok" | "error" | "skipped").
pub fn job_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("deferq.job.duration_ms")
        .with_description("Job execution duration in milliseconds")
        .with_unit("ms")
        .with_boundaries(JOB_DURATION_BUCKETS_MS.to_vec())
        .build()
}
