//! CLI integration tests for the satchel command-line interface.
//!
//! These tests cover help output and the config subcommands; none of them
//! start a server.

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the satchel binary, isolated from the user's config.
fn satchel(config_dir: &TempDir, work_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("satchel").unwrap();
    cmd.arg("--config-dir")
        .arg(config_dir.path())
        .current_dir(work_dir.path());
    cmd
}

#[test]
fn test_help_lists_subcommands() {
    Command::cargo_bin("satchel")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("config"));
}

#[test]
fn test_version_displays() {
    Command::cargo_bin("satchel")
        .unwrap()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("satchel"));
}

#[test]
fn test_serve_help_lists_overrides() {
    Command::cargo_bin("satchel")
        .unwrap()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--port"))
        .stdout(predicate::str::contains("--store"))
        .stdout(predicate::str::contains("--db"));
}

#[test]
fn test_invalid_store_rejected() {
    let config_dir = TempDir::new().unwrap();
    let work_dir = TempDir::new().unwrap();

    satchel(&config_dir, &work_dir)
        .args(["serve", "--store", "redis"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("redis"));
}

#[test]
fn test_config_show_defaults() {
    let config_dir = TempDir::new().unwrap();
    let work_dir = TempDir::new().unwrap();

    satchel(&config_dir, &work_dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No config files loaded"))
        .stdout(predicate::str::contains("port = 8080"))
        .stdout(predicate::str::contains("backend = \"memory\""));
}

#[test]
fn test_config_show_merges_layers() {
    let config_dir = TempDir::new().unwrap();
    let work_dir = TempDir::new().unwrap();

    fs::write(
        config_dir.path().join("config.toml"),
        "[server]\nport = 9000\n\n[session]\nmax_age_secs = 120\n",
    )
    .unwrap();
    fs::write(work_dir.path().join("satchel.toml"), "[server]\nport = 9100\n").unwrap();

    satchel(&config_dir, &work_dir)
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("port = 9100"))
        .stdout(predicate::str::contains("max_age_secs = 120"));
}

#[test]
fn test_config_which_reports_sources() {
    let config_dir = TempDir::new().unwrap();
    let work_dir = TempDir::new().unwrap();
    fs::write(work_dir.path().join("satchel.toml"), "[server]\nport = 9100\n").unwrap();

    satchel(&config_dir, &work_dir)
        .args(["config", "which"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 config file(s) loaded."));
}

#[test]
fn test_config_init_local() {
    let config_dir = TempDir::new().unwrap();
    let work_dir = TempDir::new().unwrap();

    satchel(&config_dir, &work_dir)
        .args(["config", "init", "--local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));

    let written = fs::read_to_string(work_dir.path().join("satchel.toml")).unwrap();
    assert!(written.contains("[session]"));

    satchel(&config_dir, &work_dir)
        .args(["config", "init", "--local"])
        .assert()
        .success()
        .stdout(predicate::str::contains("already exists"));
}

#[test]
fn test_config_path_uses_config_dir() {
    let config_dir = TempDir::new().unwrap();
    let work_dir = TempDir::new().unwrap();

    satchel(&config_dir, &work_dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.toml"));
}
