//! Integration tests for the fms CLI
//!
//! These tests run the actual binary against an isolated config directory.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Binary with its config dir pointed at a fresh temp dir
fn fms_cmd(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("fms").unwrap();
    cmd.env("FMS_CONFIG_DIR", config_dir.path())
        .env_remove("FMS_API_URL")
        .env_remove("FMS_PASSWORD")
        .env_remove("FMS_LOG");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let dir = TempDir::new().unwrap();
    fms_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("FMS Controller"))
        .stdout(predicate::str::contains("login"))
        .stdout(predicate::str::contains("watch"))
        .stdout(predicate::str::contains("upload"))
        .stdout(predicate::str::contains("assign"));
}

#[test]
fn test_assign_help_shows_worker_flag() {
    let dir = TempDir::new().unwrap();
    fms_cmd(&dir)
        .args(["assign", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--worker"));
}

#[test]
fn test_board_requires_login() {
    let dir = TempDir::new().unwrap();
    fms_cmd(&dir)
        .arg("board")
        .assert()
        .failure()
        .stderr(predicate::str::contains("FMS-001"))
        .stderr(predicate::str::contains("fms login"));
}

#[test]
fn test_watch_requires_login() {
    let dir = TempDir::new().unwrap();
    fms_cmd(&dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("FMS-001"));
}

#[test]
fn test_logout_is_idempotent() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("session.toml"),
        "username = \"ops\"\npassword = \"pw\"\n",
    )
    .unwrap();

    fms_cmd(&dir)
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out"));
    assert!(!dir.path().join("session.toml").exists());

    fms_cmd(&dir).arg("logout").assert().success();
}

#[test]
fn test_invalid_api_url_flag() {
    let dir = TempDir::new().unwrap();
    fms_cmd(&dir)
        .args(["--api-url", "not a url", "workers"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("FMS-004"));
}

#[test]
fn test_malformed_config_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.toml"), "api_url = [").unwrap();

    fms_cmd(&dir)
        .arg("workers")
        .assert()
        .failure()
        .stderr(predicate::str::contains("FMS-004"))
        .stderr(predicate::str::contains("config.toml"));
}

#[test]
fn test_upload_missing_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("session.toml"), "username = \"ops\"\n").unwrap();

    fms_cmd(&dir)
        .args(["upload", "C-100", "/definitely/not/here.pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("FMS-020"));
}
