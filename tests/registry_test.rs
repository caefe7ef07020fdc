use chrono::TimeDelta;
use deferq::Error;
use deferq::model::Throttle;
use deferq::registry::JobRegistry;
use serde_json::json;
use std::path::Path;

const JOBS: &str = r#"
[jobs.SampleJob]
command = "bin/sample-job"

[jobs.DigestJob]
throttled = "daily"
command = "bin/digest"

[jobs.DebouncedJob]
debounced = true
throttled = "15m"
key_args = [1]

[jobs.WeeklyJob]
throttled = "weekly"
"#;

#[test]
fn parses_policies_from_toml() {
    let registry = JobRegistry::from_toml(JOBS).unwrap();

    let mut names: Vec<&str> = registry.job_types().collect();
    names.sort();
    assert_eq!(names, ["DebouncedJob", "DigestJob", "SampleJob", "WeeklyJob"]);

    let sample = registry.get("SampleJob").unwrap();
    assert!(!sample.policy().debounced);
    assert!(sample.policy().throttled.is_none());

    let digest = registry.get("DigestJob").unwrap();
    assert_eq!(digest.policy().throttled, Some(Throttle::Daily));

    let debounced = registry.get("DebouncedJob").unwrap();
    assert!(debounced.policy().debounced);
    assert_eq!(
        debounced.policy().throttled,
        Some(Throttle::Every(TimeDelta::minutes(15)))
    );
}

#[test]
fn commands_are_optional() {
    let registry = JobRegistry::from_toml(JOBS).unwrap();
    assert_eq!(
        registry.command_for("SampleJob"),
        Some(Path::new("bin/sample-job"))
    );
    assert!(registry.command_for("DebouncedJob").is_none());
    assert!(registry.command_for("Missing").is_none());
}

#[test]
fn key_args_select_argument_positions() {
    let registry = JobRegistry::from_toml(JOBS).unwrap();
    let debounced = registry.get("DebouncedJob").unwrap();

    assert_eq!(
        debounced.key_for(&[json!("x"), json!("account-7")]),
        "debounced_job/account-7"
    );
    assert_eq!(debounced.key_for(&[json!("x")]), "debounced_job/");
}

#[test]
fn unsupported_throttle_loads_and_is_reported_later() {
    let registry = JobRegistry::from_toml(JOBS).unwrap();
    assert_eq!(
        registry.get("WeeklyJob").unwrap().policy().throttled,
        Some(Throttle::Unsupported("weekly".to_string()))
    );
}

#[test]
fn unknown_job_type_is_an_error() {
    let registry = JobRegistry::from_toml(JOBS).unwrap();
    assert!(matches!(
        registry.require("NopeJob"),
        Err(Error::UnknownJobType(name)) if name == "NopeJob"
    ));
}

#[test]
fn malformed_toml_is_a_config_error() {
    let err = JobRegistry::from_toml("[jobs.Broken\ncommand = 1").unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn missing_file_is_a_config_error() {
    let err = JobRegistry::load_from_file(Path::new("does/not/exist.toml")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}
