//! CLI tests against a synthetic backup

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use crate::helpers::{sample_backup, FRIEND, OWNER};

/// Run the binary with an isolated home so no user config is picked up.
fn wxexport(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("wxexport").unwrap();
    cmd.env("HOME", home.path())
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_lists_commands() {
    let home = TempDir::new().unwrap();
    wxexport(&home)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("users"))
        .stdout(predicate::str::contains("sessions"))
        .stdout(predicate::str::contains("export"));
}

#[test]
fn users_lists_the_owner() {
    let home = TempDir::new().unwrap();
    let backup = sample_backup();
    backup.write_manifest();

    wxexport(&home)
        .arg("users")
        .arg(backup.root())
        .assert()
        .success()
        .stdout(predicate::str::contains("Owner"))
        .stdout(predicate::str::contains(OWNER));
}

#[test]
fn folder_without_manifest_is_rejected() {
    let home = TempDir::new().unwrap();
    let empty = TempDir::new().unwrap();

    wxexport(&home)
        .arg("users")
        .arg(empty.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Manifest.db"));
}

#[test]
fn sessions_json_reports_shard_counts() {
    let home = TempDir::new().unwrap();
    let backup = sample_backup();
    backup.write_manifest();

    let output = wxexport(&home)
        .arg("sessions")
        .arg(backup.root())
        .arg("--json")
        .output()
        .unwrap();
    assert!(output.status.success());
    let sessions: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let friend = sessions
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["user_id"] == FRIEND)
        .unwrap();
    assert_eq!(friend["record_count"], 5);
    assert_eq!(friend["cached_count"], 99);
}

#[test]
fn export_writes_selected_session() {
    let home = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let backup = sample_backup();
    backup.write_manifest();

    wxexport(&home)
        .arg("export")
        .arg(backup.root())
        .arg(out.path())
        .args(["--session", FRIEND, "--desc", "--workers", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Exported 5 messages"));

    let lines = fs::read_to_string(out.path().join(format!("{}.jsonl", FRIEND))).unwrap();
    let ids: Vec<i64> = lines
        .lines()
        .map(|l| serde_json::from_str::<serde_json::Value>(l).unwrap()["msg_id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![5, 4, 3, 2, 1]);
    assert!(out.path().join("export.json").is_file());
    assert!(!out.path().join("12345@chatroom.jsonl").exists());
}

#[test]
fn config_init_writes_explicit_file() {
    let home = TempDir::new().unwrap();
    let path = home.path().join("custom.toml");

    wxexport(&home)
        .args(["config", "init", "--config"])
        .arg(&path)
        .assert()
        .success();
    assert!(path.is_file());

    wxexport(&home)
        .args(["config", "show", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("[export]"));
}
