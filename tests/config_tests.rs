//! Loading, defaults and validation of `PipelineConfig`

use chapterflow::{PipelineConfig, PipelineError};
use std::io::Write;
use std::time::Duration;

#[test]
fn test_defaults_are_valid() {
    let config = PipelineConfig::default();
    config.validate().expect("defaults validate");

    assert_eq!(config.batch.batch_size, 3);
    assert_eq!(config.batch.max_concurrency, 2);
    assert_eq!(config.batch.batch_delay(), Duration::from_secs(1));
    assert_eq!(config.remote_retry.max_attempts, 3);
    assert_eq!(config.health.circuit_breaker.failure_threshold, 5);
    assert_eq!(config.navigator.max_consecutive_errors, 3);
    assert_eq!(config.cache.translation.ttl(), Duration::from_secs(2 * 60 * 60));
}

#[test]
fn test_partial_json_keeps_other_defaults() {
    let config = PipelineConfig::from_json_str(
        r#"{ "batch": { "batch_size": 7 }, "compress_output": true }"#,
    )
    .expect("valid document");

    assert_eq!(config.batch.batch_size, 7);
    assert_eq!(config.batch.max_concurrency, 2);
    assert!(config.compress_output);
    assert_eq!(config.navigator, PipelineConfig::default().navigator);
}

#[test]
fn test_invalid_json_values_are_rejected() {
    let err = PipelineConfig::from_json_str(r#"{ "batch": { "batch_size": 0 } }"#)
        .expect_err("zero batch size");
    assert!(matches!(err, PipelineError::Validation(_)));

    let err = PipelineConfig::from_json_str("{ not json").expect_err("malformed");
    assert!(matches!(err, PipelineError::Serialization(_)));
}

#[test]
fn test_builder_validates_on_build() {
    let config = PipelineConfig::builder()
        .batch_size(5)
        .max_concurrency(4)
        .max_items(50)
        .compress_output(true)
        .build()
        .expect("valid builder chain");
    assert_eq!(config.batch.batch_size, 5);
    assert_eq!(config.navigator.max_items, 50);
    assert_eq!(config.batch.max_items, 50);

    let err = PipelineConfig::builder()
        .max_concurrency(0)
        .build()
        .expect_err("zero concurrency");
    assert!(matches!(err, PipelineError::Validation(_)));
}

#[tokio::test]
async fn test_from_json_file() {
    let mut file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    write!(file, r#"{{ "output_dir": "/tmp/chapters", "remote_retry": {{ "max_attempts": 5 }} }}"#)
        .expect("write config");

    let config = PipelineConfig::from_json_file(file.path())
        .await
        .expect("file loads");
    assert_eq!(config.output_dir, std::path::PathBuf::from("/tmp/chapters"));
    assert_eq!(config.remote_retry.max_attempts, 5);

    let missing = PipelineConfig::from_json_file("/definitely/not/here.json").await;
    assert!(matches!(missing, Err(PipelineError::Io(_))));
}
