//! CLI integration tests
//!
//! Tests the command-line interface using assert_cmd

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use common::{invalid_config_fixture, valid_config_fixture};

/// Get a command for the eventlink binary
fn eventlink_cmd() -> Command {
    let mut cmd = Command::cargo_bin("eventlink").unwrap();
    cmd.env_remove("EVENTLINK_CONFIG").env_remove("EVENTLINK_URI");
    cmd
}

// ─────────────────────────────────────────────────────────────────
// Help and Version Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_help_flag() {
    eventlink_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("eventlink"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("send"))
        .stdout(predicate::str::contains("version"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_command() {
    eventlink_cmd()
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("eventlink"))
        .stdout(predicate::str::contains("Build Information"))
        .stdout(predicate::str::contains("Git Hash"))
        .stdout(predicate::str::contains("Target"));
}

#[test]
fn test_short_version_flag() {
    eventlink_cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("eventlink"));
}

// ─────────────────────────────────────────────────────────────────
// Config Command Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_config_show_fixture() {
    eventlink_cmd()
        .arg("config")
        .arg("show")
        .arg("--config")
        .arg(valid_config_fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("[client]"))
        .stdout(predicate::str::contains("[session]"))
        .stdout(predicate::str::contains("[logging]"))
        .stdout(predicate::str::contains("wss://events.example.com/stream"))
        .stdout(predicate::str::contains("fixture-token"));
}

#[test]
fn test_config_validate_fixture() {
    eventlink_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(valid_config_fixture())
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"));
}

#[test]
fn test_config_validate_invalid_fixture() {
    eventlink_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(invalid_config_fixture())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Session URI"));
}

#[test]
fn test_config_validate_nonexistent_file() {
    eventlink_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg("/nonexistent/path/config.toml")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found").or(predicate::str::contains("Error")));
}

#[test]
fn test_config_flag_before_subcommand() {
    eventlink_cmd()
        .arg("--config")
        .arg(valid_config_fixture())
        .arg("config")
        .arg("validate")
        .assert()
        .success();
}

#[test]
fn test_config_from_environment() {
    eventlink_cmd()
        .env("EVENTLINK_CONFIG", valid_config_fixture())
        .arg("config")
        .arg("show")
        .assert()
        .success()
        .stdout(predicate::str::contains("fixture-token"));
}

#[test]
fn test_config_init_writes_file() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("eventlink.toml");

    eventlink_cmd()
        .arg("config")
        .arg("init")
        .arg("--path")
        .arg(&target)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration file created"));

    assert!(target.exists());

    // The generated file must itself validate
    eventlink_cmd()
        .arg("config")
        .arg("validate")
        .arg("--config")
        .arg(&target)
        .assert()
        .success();
}

#[test]
fn test_config_init_refuses_overwrite() {
    let temp_dir = TempDir::new().unwrap();
    let target = temp_dir.path().join("eventlink.toml");
    std::fs::write(&target, "# keep me\n").unwrap();

    eventlink_cmd()
        .arg("config")
        .arg("init")
        .arg("--path")
        .arg(&target)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    eventlink_cmd()
        .arg("config")
        .arg("init")
        .arg("--path")
        .arg(&target)
        .arg("--force")
        .assert()
        .success();
}

#[test]
fn test_config_init_help() {
    eventlink_cmd()
        .arg("config")
        .arg("init")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialize"))
        .stdout(predicate::str::contains("--path"))
        .stdout(predicate::str::contains("--force"));
}

// ─────────────────────────────────────────────────────────────────
// Send and Watch Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_send_help() {
    eventlink_cmd()
        .arg("send")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--uri"))
        .stdout(predicate::str::contains("--expect"))
        .stdout(predicate::str::contains("--timeout-ms"));
}

#[test]
fn test_send_without_uri_fails() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("empty.toml");
    std::fs::write(&config, "").unwrap();

    eventlink_cmd()
        .arg("send")
        .arg("status")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No server URI"));
}

#[test]
fn test_send_rejects_http_uri() {
    let temp_dir = TempDir::new().unwrap();
    let config = temp_dir.path().join("empty.toml");
    std::fs::write(&config, "").unwrap();

    eventlink_cmd()
        .arg("send")
        .arg("status")
        .arg("--uri")
        .arg("http://localhost:1/events")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure();
}

#[test]
fn test_watch_help() {
    eventlink_cmd()
        .arg("watch")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("--heartbeat"))
        .stdout(predicate::str::contains("--config"));
}

#[test]
fn test_watch_with_missing_config() {
    eventlink_cmd()
        .arg("watch")
        .arg("--config")
        .arg("/nonexistent/config.toml")
        .assert()
        .failure();
}

// ─────────────────────────────────────────────────────────────────
// Verbosity Flag Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_verbose_flag() {
    eventlink_cmd().arg("-v").arg("version").assert().success();
}

#[test]
fn test_very_verbose_flag() {
    eventlink_cmd().arg("-vv").arg("version").assert().success();
}

#[test]
fn test_quiet_flag() {
    eventlink_cmd().arg("--quiet").arg("version").assert().success();
}

// ─────────────────────────────────────────────────────────────────
// Error Handling Tests
// ─────────────────────────────────────────────────────────────────

#[test]
fn test_unknown_command() {
    eventlink_cmd()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[test]
fn test_missing_subcommand() {
    eventlink_cmd().assert().failure();
}
