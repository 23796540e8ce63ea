// Property-based tests for layered configuration loading

use pacer::config::{Preset, Settings};
use proptest::prelude::*;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

fn write_config(dir: &TempDir, contents: &str) {
    fs::write(dir.path().join("default.toml"), contents).unwrap();
}

/// **Property: Scheduler settings round-trip through configuration files**
///
/// *For any* valid scheduler definition written to `default.toml`, loading
/// the configuration yields the same scheduler configuration.
#[test]
fn property_scheduler_settings_load_from_file() {
    proptest!(|(
        wait_ms in 0u64..10_000,
        extra_ms in 0u64..10_000,
        leading in any::<bool>(),
        trailing in any::<bool>(),
        log_level in prop::sample::select(vec!["trace", "debug", "info", "warn", "error"])
    )| {
        let temp_dir = TempDir::new().unwrap();
        write_config(&temp_dir, &format!(
            r#"
[observability]
log_level = "{log_level}"
json_logs = false

[schedulers.autosave]
preset = "debounce"
wait_ms = {wait_ms}
leading = {leading}
trailing = {trailing}
max_wait_ms = {max_wait_ms}
"#,
            max_wait_ms = wait_ms + extra_ms,
        ));

        let settings = Settings::load_from_path(temp_dir.path()).unwrap();
        prop_assert!(settings.validate().is_ok());
        prop_assert_eq!(settings.observability.log_level.as_str(), log_level);
        prop_assert!(!settings.observability.json_logs);

        let scheduler = settings.scheduler("autosave").unwrap();
        prop_assert_eq!(scheduler.preset, Preset::Debounce);

        let config = scheduler.to_scheduler_config();
        prop_assert_eq!(config.wait, Duration::from_millis(wait_ms));
        prop_assert_eq!(config.leading, leading);
        prop_assert_eq!(config.trailing, trailing);
        prop_assert_eq!(config.max_wait, Some(Duration::from_millis(wait_ms + extra_ms)));
    });
}

#[test]
fn test_missing_files_fall_back_to_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let settings = Settings::load_from_path(temp_dir.path()).unwrap();

    assert_eq!(settings.observability.log_level, "info");
    assert!(settings.observability.json_logs);
    assert!(settings.schedulers.is_empty());
    assert!(settings.validate().is_ok());
}

#[test]
fn test_local_file_overrides_default_file() {
    let temp_dir = TempDir::new().unwrap();
    write_config(
        &temp_dir,
        r#"
[schedulers.sync]
preset = "rate_limit"
wait_ms = 1000
"#,
    );
    fs::write(
        temp_dir.path().join("local.toml"),
        r#"
[schedulers.sync]
wait_ms = 250
"#,
    )
    .unwrap();

    let settings = Settings::load_from_path(temp_dir.path()).unwrap();
    let config = settings.scheduler("sync").unwrap().to_scheduler_config();

    assert_eq!(config.wait, Duration::from_millis(250));
    assert_eq!(config.max_wait, Some(Duration::from_millis(250)));
    assert!(config.leading && config.trailing);
}

#[test]
fn test_invalid_scheduler_fails_validation() {
    let temp_dir = TempDir::new().unwrap();
    write_config(
        &temp_dir,
        r#"
[schedulers.broken]
wait_ms = 500
max_wait_ms = 100
"#,
    );

    let settings = Settings::load_from_path(temp_dir.path()).unwrap();
    let err = settings.validate().unwrap_err();
    assert!(err.contains("max_wait (100ms) is shorter than wait (500ms)"));
}
