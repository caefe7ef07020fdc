//! Job lifecycle span helpers.
//!
//! One span per enqueue attempt and one per delivered execution, both
//! keyed by job type and tracker key.

use tracing::Span;

/// Start a span for an enqueue attempt.
///
/// The `job.decision` field is declared empty and filled by
/// [`record_decision`] once policy has been applied.
pub fn start_enqueue_span(job_type: &str, key: &str) -> Span {
    tracing::info_span!(
        "job.enqueue",
        "job.type" = job_type,
        "job.key" = key,
        "job.decision" = tracing::field::Empty,
    )
}

/// Start a span for executing a delivered job.
pub fn start_perform_span(job_type: &str, key: &str, provider_job_id: &str) -> Span {
    tracing::info_span!(
        "job.perform",
        "job.type" = job_type,
        "job.key" = key,
        "job.provider_id" = provider_job_id,
        "job.decision" = tracing::field::Empty,
    )
}

/// Record the coordinator's decision on the given span.
pub fn record_decision(span: &Span, decision: &str) {
    span.record("job.decision", decision);
}
