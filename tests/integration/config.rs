//! `dataaccess.toml` driving a DataContext

use crate::common::*;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

#[test]
fn default_file_is_written_and_used() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    let ctx = DataContext::builder()
        .config_file(&path)
        .unwrap()
        .backend(Arc::new(MemoryBackend::new("main")))
        .build()
        .unwrap();

    let written = std::fs::read_to_string(&path).unwrap();
    assert_eq!(written, DataAccessConfig::default_toml());
    assert_eq!(ctx.config().retry_config(), RetryConfig::default());
}

#[test]
fn entity_overrides_from_file_apply() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(
        &path,
        r#"
[retry]
max_attempts = 2

[entities.AuditEntry]
cache_timeout_ms = 60000
"#,
    )
    .unwrap();

    let backend = Arc::new(MemoryBackend::new("main"));
    let ctx = DataContext::builder()
        .config_file(&path)
        .unwrap()
        .backend(backend.clone())
        .build()
        .unwrap();

    let audit = ctx.get::<AuditEntry>().unwrap();
    assert_eq!(audit.info().cache_timeout(), Duration::from_secs(60));
    audit.all().unwrap();
    audit.all().unwrap();
    assert_eq!(backend.stats().reads, 1);

    backend.faults().fail_reads(5, "1205");
    ctx.invalidate("AuditEntry");
    assert!(audit.all().unwrap_err().is_retry_exhausted());
    assert_eq!(backend.stats().reads, 3);
}

#[test]
fn invalid_file_fails_the_build() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join(CONFIG_FILE_NAME);
    std::fs::write(&path, "[scheduler]\nflush_interval_ms = 0\n").unwrap();
    let err = DataContext::builder().config_file(&path).unwrap_err();
    assert!(err.is_configuration());
}
