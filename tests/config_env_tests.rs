/// Environment-override tests for the configuration layer.
///
/// # Safety
///
/// `std::env::set_var` / `remove_var` are `unsafe` in Rust 2024 edition.
/// Every test here is `#[serial]`, so no other test in this binary touches
/// the environment while one runs.
use std::path::PathBuf;

use promptgreen::config::{self, PromptGreenConfig};
use serial_test::serial;

const VARS: &[&str] = &[
    "PROMPTGREEN_API_URL",
    "PROMPTGREEN_MODEL",
    "PROMPTGREEN_TIMEOUT_MS",
    "PROMPTGREEN_LONG_FORM_THRESHOLD",
    "PROMPTGREEN_STATS_PATH",
    "PROMPTGREEN_ENABLED",
];

/// Helper: set an env var (wraps the `unsafe` call).
///
/// # Safety
/// Callers must be `#[serial]`.
unsafe fn set_env(key: &str, val: &str) {
    unsafe { std::env::set_var(key, val) }
}

fn clear_env() {
    for var in VARS {
        unsafe { std::env::remove_var(var) };
    }
}

#[test]
#[serial]
fn no_variables_leaves_config_alone() {
    clear_env();
    let mut cfg = PromptGreenConfig::default();
    config::apply_env_overrides(&mut cfg);
    assert_eq!(cfg, PromptGreenConfig::default());
}

#[test]
#[serial]
fn variables_override_file_values() {
    clear_env();
    unsafe {
        set_env("PROMPTGREEN_API_URL", "https://optimizer.example.com");
        set_env("PROMPTGREEN_MODEL", "claude-3");
        set_env("PROMPTGREEN_TIMEOUT_MS", "1500");
        set_env("PROMPTGREEN_LONG_FORM_THRESHOLD", "100");
        set_env("PROMPTGREEN_STATS_PATH", "/tmp/pg-test/storage.json");
        set_env("PROMPTGREEN_ENABLED", "0");
    }

    let mut cfg = PromptGreenConfig::default();
    cfg.api.timeout_ms = 9_000;
    config::apply_env_overrides(&mut cfg);
    clear_env();

    assert_eq!(cfg.api.base_url, "https://optimizer.example.com");
    assert_eq!(cfg.api.model_name, "claude-3");
    assert_eq!(cfg.api.timeout_ms, 1500);
    assert_eq!(cfg.policy.long_form_threshold_chars, 100);
    assert_eq!(
        cfg.storage.path,
        Some(PathBuf::from("/tmp/pg-test/storage.json"))
    );
    assert!(!cfg.settings.enabled);
}

#[test]
#[serial]
fn unparseable_numbers_and_empty_strings_are_ignored() {
    clear_env();
    unsafe {
        set_env("PROMPTGREEN_TIMEOUT_MS", "soon");
        set_env("PROMPTGREEN_LONG_FORM_THRESHOLD", "-5");
        set_env("PROMPTGREEN_API_URL", "");
    }

    let mut cfg = PromptGreenConfig::default();
    config::apply_env_overrides(&mut cfg);
    clear_env();

    assert_eq!(cfg.api.timeout_ms, 30_000);
    assert_eq!(cfg.policy.long_form_threshold_chars, 350);
    assert_eq!(cfg.api.base_url, "http://127.0.0.1:8000");
}

#[test]
#[serial]
fn env_layer_sits_above_files() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("config.toml");
    std::fs::write(&file, "[api]\nmodel_name = \"from-file\"\ntimeout_ms = 2000\n").unwrap();

    unsafe { set_env("PROMPTGREEN_MODEL", "from-env") };
    let mut cfg = config::load_layers([file.as_path()]);
    config::apply_env_overrides(&mut cfg);
    clear_env();

    assert_eq!(cfg.api.model_name, "from-env");
    assert_eq!(cfg.api.timeout_ms, 2000);
}
