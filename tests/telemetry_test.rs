//! Integration tests for telemetry initialization and span helpers.

use deferq::config::Config;
use deferq::telemetry::{QUEUE_ATTRIBUTE, TelemetryConfig, init_telemetry, job, metrics};
use opentelemetry::{Key, KeyValue, Value};
use secrecy::SecretString;

#[test]
fn telemetry_initializes_without_endpoint() {
    // Errs when another test in this process installed a subscriber first.
    let _guard = init_telemetry(TelemetryConfig::local("deferq-test"));
}

#[test]
fn enqueue_span_records_decision() {
    let span = job::start_enqueue_span("SampleJob", "sample_job/foo");
    job::record_decision(&span, "suppressed");
}

#[test]
fn perform_span_records_decision() {
    let span = job::start_perform_span("SampleJob", "sample_job/foo", "42");
    job::record_decision(&span, "superseded");
}

#[test]
fn instruments_accept_measurements_without_a_provider() {
    let attrs = [KeyValue::new("job_type", "SampleJob")];
    metrics::enqueue_decisions().add(1, &attrs);
    metrics::trackers_saved().add(1, &attrs);
    metrics::tracker_conflicts().add(1, &attrs);
    metrics::job_duration_ms().record(12.0, &attrs);
}

#[test]
fn resource_names_service_and_queue() {
    let config = Config {
        database_url: SecretString::from("postgres://localhost/deferq"),
        otel_endpoint: None,
        log_level: "debug".to_string(),
        queue_name: "reports".to_string(),
        day_offset: None,
    };
    let telemetry = TelemetryConfig::from_config(&config);
    assert_eq!(telemetry.service_name, "deferq");
    assert_eq!(telemetry.log_level, "debug");

    let resource = telemetry.resource();
    assert_eq!(
        resource.get(&Key::new(QUEUE_ATTRIBUTE)),
        Some(Value::from("reports"))
    );
    assert_eq!(
        resource.get(&Key::new("service.name")),
        Some(Value::from("deferq"))
    );
}

#[test]
fn local_resource_has_no_queue() {
    let resource = TelemetryConfig::local("deferq-test").resource();
    assert_eq!(resource.get(&Key::new(QUEUE_ATTRIBUTE)), None);
}

#[test]
fn job_duration_buckets_are_ascending() {
    let buckets = metrics::JOB_DURATION_BUCKETS_MS;
    assert!(buckets.windows(2).all(|pair| pair[0] < pair[1]));
    assert_eq!(buckets[0], 0.0);
}
