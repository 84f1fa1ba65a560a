//! Config loading tests.
//!
//! Tests for `CoreConfig::load()`: file discovery, TOML parse failures,
//! default table filling, and semantic validation.

use hdf_common::config::{ConfigError, ConfigLoader, CoreConfig};
use std::fs;
use tempfile::TempDir;

fn write_config(dir: &TempDir, content: &str) -> std::path::PathBuf {
    let path = dir.path().join("hdf.toml");
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn load_full_config() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[shared]
log_level = "debug"
service_name = "hdf-devmgr"

[dispatch]
sync_timeout_ms = 5000

[bringup]
retry_attempts = 10
retry_interval_ms = 100
"#,
    );

    let config = CoreConfig::load(&path).expect("should load");
    config.validate().expect("should validate");
    assert_eq!(config.shared.service_name, "hdf-devmgr");
    assert_eq!(config.dispatch.sync_timeout_ms, Some(5000));
    assert_eq!(config.bringup.retry_attempts, 10);
}

#[test]
fn load_minimal_config_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let path = write_config(
        &dir,
        r#"
[shared]
service_name = "hdf-devhost-0"
"#,
    );

    let config = CoreConfig::load(&path).expect("should load");
    config.validate().expect("should validate");
    assert_eq!(config.dispatch.sync_timeout_ms, None);
    assert_eq!(config.bringup.retry_attempts, 20);
}

#[test]
fn missing_file_is_file_not_found() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("does_not_exist.toml");
    assert!(matches!(
        CoreConfig::load(&path),
        Err(ConfigError::FileNotFound)
    ));
}

#[test]
fn invalid_toml_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[shared\nservice_name = ");
    assert!(matches!(
        CoreConfig::load(&path),
        Err(ConfigError::ParseError(_))
    ));
}

#[test]
fn missing_service_name_is_parse_error() {
    // service_name has no default; the struct cannot deserialize without it.
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[shared]\nlog_level = \"info\"\n");
    assert!(matches!(
        CoreConfig::load(&path),
        Err(ConfigError::ParseError(_))
    ));
}
