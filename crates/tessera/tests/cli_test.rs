#![allow(deprecated)] // TODO: cargo_bin → cargo_bin_cmd! migration

mod common;

use assert_cmd::Command;
use common::{BASIC_PROJECT, TestProject};
use predicates::prelude::*;
use std::fs;

/// CLI help lists the core commands
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("tessera").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("apply"))
        .stdout(predicate::str::contains("destroy"));
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("tessera").unwrap();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains("tessera"));
}

#[test]
fn test_plan_help_shows_flags() {
    let mut cmd = Command::cargo_bin("tessera").unwrap();
    cmd.args(["plan", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--destroy"))
        .stdout(predicate::str::contains("--out"))
        .stdout(predicate::str::contains("--no-refresh"))
        .stdout(predicate::str::contains("--detailed-exitcode"));
}

#[test]
fn test_init_scaffolds_and_validates() {
    let project = TestProject::new();

    project
        .cmd()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"))
        .stdout(predicate::str::contains("2 resources"));
    assert!(project.file("tessera.kdl").exists());
    assert!(project.file(".tessera").is_dir());
    // Nothing is provisioned by init
    assert!(!project.file("out").exists());

    project
        .cmd()
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("already initialized"));
}

#[test]
fn test_init_reports_invalid_configuration() {
    let project = TestProject::with_config(
        r#"
resource "local_file" "a" {
    path "a.txt"
    content "${local_file.missing.content}"
}
"#,
    );

    project
        .cmd()
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("local_file.missing"));
}

#[test]
fn test_no_project_is_an_error() {
    let project = TestProject::new();
    project.cmd().arg("plan").assert().failure();
}

#[test]
fn test_plan_is_read_only() {
    let project = TestProject::with_config(BASIC_PROJECT);

    project
        .cmd()
        .args(["plan", "--detailed-exitcode"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("local_directory.data"))
        .stdout(predicate::str::contains("local_file.motd"))
        .stdout(predicate::str::contains("2 to create"));

    assert!(!project.file("out").exists());
    assert!(!project.file(".tessera/state.json").exists());
    assert!(!project.file(".tessera/lock.json").exists());
}

#[test]
fn test_apply_requires_confirmation() {
    let project = TestProject::with_config(BASIC_PROJECT);

    project
        .cmd()
        .arg("apply")
        .assert()
        .success()
        .stdout(predicate::str::contains("--yes"));

    assert!(!project.file("out/data/motd.txt").exists());
    assert!(!project.file(".tessera/lock.json").exists());
}

#[test]
fn test_apply_then_plan_converges() {
    let project = TestProject::with_config(BASIC_PROJECT);

    project
        .cmd()
        .args(["apply", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Apply complete"));

    assert!(project.file("out/data").is_dir());
    assert_eq!(project.read("out/data/motd.txt"), "hello world");
    assert_eq!(project.state()["records"].as_object().unwrap().len(), 2);
    assert!(!project.file(".tessera/lock.json").exists());

    project
        .cmd()
        .args(["plan", "--detailed-exitcode"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes"));
}

#[test]
fn test_changed_content_is_updated_in_place() {
    let project = TestProject::with_config(BASIC_PROJECT);
    project.cmd().args(["apply", "--yes"]).assert().success();

    project.write_root_kdl(&BASIC_PROJECT.replace("\"hello\"", "\"hi\""));
    project
        .cmd()
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 to update"))
        .stdout(predicate::str::contains("content"));

    project.cmd().args(["apply", "--yes"]).assert().success();
    assert_eq!(project.read("out/data/motd.txt"), "hi world");
}

#[test]
fn test_variable_override_from_environment() {
    let project = TestProject::with_config(BASIC_PROJECT);

    project
        .cmd()
        .env("TESSERA_VAR_greeting", "bonjour")
        .args(["apply", "--yes"])
        .assert()
        .success();
    assert_eq!(project.read("out/data/motd.txt"), "bonjour world");
}

#[test]
fn test_drift_is_detected_on_refresh() {
    let project = TestProject::with_config(BASIC_PROJECT);
    project.cmd().args(["apply", "--yes"]).assert().success();

    fs::remove_file(project.file("out/data/motd.txt")).unwrap();

    project
        .cmd()
        .arg("plan")
        .assert()
        .success()
        .stdout(predicate::str::contains("1 to create"))
        .stdout(predicate::str::contains("1 unchanged"));

    project
        .cmd()
        .args(["plan", "--no-refresh"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No changes"));

    project.cmd().args(["apply", "--yes"]).assert().success();
    assert_eq!(project.read("out/data/motd.txt"), "hello world");
}

#[test]
fn test_destroy_removes_everything() {
    let project = TestProject::with_config(BASIC_PROJECT);
    project.cmd().args(["apply", "--yes"]).assert().success();

    project
        .cmd()
        .args(["plan", "--destroy"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2 to destroy"));

    // Without --yes nothing happens
    project.cmd().arg("destroy").assert().success();
    assert!(project.file("out/data/motd.txt").exists());

    project
        .cmd()
        .args(["destroy", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Apply complete"));
    assert!(!project.file("out/data").exists());

    project
        .cmd()
        .args(["state", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("State is empty"));
}

#[test]
fn test_removed_resource_is_destroyed_on_apply() {
    let project = TestProject::with_config(BASIC_PROJECT);
    project.write_resource_file(
        "extra",
        r#"
resource "local_file" "notes" {
    path "notes.txt"
    content "remember"
}
"#,
    );
    project
        .cmd()
        .args(["apply", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("3 succeeded"));
    assert!(project.file("notes.txt").exists());

    fs::remove_file(project.file("resources/extra.kdl")).unwrap();
    project
        .cmd()
        .args(["apply", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 to destroy"));
    assert!(!project.file("notes.txt").exists());
    assert!(project.file("out/data/motd.txt").exists());
}

#[test]
fn test_saved_plan_apply() {
    let project = TestProject::with_config(BASIC_PROJECT);

    project
        .cmd()
        .args(["plan", "--out", "tessera.plan.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Saved plan"));
    assert!(!project.file("out").exists());

    project
        .cmd()
        .args(["apply", "tessera.plan.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Apply complete"));
    assert_eq!(project.read("out/data/motd.txt"), "hello world");
}

#[test]
fn test_stale_saved_plan_is_rejected() {
    let project = TestProject::with_config(BASIC_PROJECT);

    project
        .cmd()
        .args(["plan", "--out", "tessera.plan.json"])
        .assert()
        .success();
    project.cmd().args(["apply", "--yes"]).assert().success();

    project
        .cmd()
        .args(["apply", "tessera.plan.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("stale"));
}

#[test]
fn test_failed_node_halts_dependents() {
    let project = TestProject::with_config(
        r#"
resource "local_file" "first" {
    path "blocker/first.txt"
    content "x"
}

resource "local_file" "second" {
    path "second.txt"
    content "${local_file.first.content}"
}
"#,
    );
    // A regular file where a directory is needed
    fs::write(project.file("blocker"), "not a directory").unwrap();

    project
        .cmd()
        .args(["apply", "--yes"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Apply failed"))
        .stdout(predicate::str::contains("local_file.second not attempted"));
    assert!(!project.file("second.txt").exists());
}

#[test]
fn test_cycle_is_a_configuration_error() {
    let project = TestProject::with_config(
        r#"
resource "local_file" "a" {
    path "a.txt"
    content "${local_file.b.content}"
}

resource "local_file" "b" {
    path "b.txt"
    content "${local_file.a.content}"
}
"#,
    );

    project
        .cmd()
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cycle"));
}

#[test]
fn test_state_show() {
    let project = TestProject::with_config(BASIC_PROJECT);
    project.cmd().args(["apply", "--yes"]).assert().success();

    project
        .cmd()
        .args(["state", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("local_directory.data"))
        .stdout(predicate::str::contains("local_file.motd"));

    project
        .cmd()
        .args(["state", "show", "local_file.motd"])
        .assert()
        .success()
        .stdout(predicate::str::contains("out/data/motd.txt"));

    project
        .cmd()
        .args(["state", "show", "local_file.nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("local_file.nope"));
}

#[test]
fn test_held_lock_blocks_apply_until_forced() {
    let project = TestProject::with_config(BASIC_PROJECT);
    fs::create_dir_all(project.file(".tessera")).unwrap();
    let lock = serde_json::json!({
        "id": "held-lock",
        "holder": "ci-runner",
        "pid": 1,
        "acquired_at": "2020-01-01T00:00:00Z",
        "expires_at": "2999-01-01T00:00:00Z",
    });
    fs::write(project.file(".tessera/lock.json"), lock.to_string()).unwrap();

    project
        .cmd()
        .args(["apply", "--yes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("locked by ci-runner"));
    assert!(!project.file("out").exists());

    project
        .cmd()
        .args(["force-unlock", "wrong-id"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("mismatch"));

    project
        .cmd()
        .args(["force-unlock", "held-lock"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Released lock"));

    project.cmd().args(["apply", "--yes"]).assert().success();
}

#[test]
fn test_force_unlock_without_lock() {
    let project = TestProject::with_config(BASIC_PROJECT);

    project
        .cmd()
        .args(["force-unlock", "anything"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not locked"));
}

#[test]
fn test_project_flag_from_another_directory() {
    let project = TestProject::with_config(BASIC_PROJECT);
    let elsewhere = tempfile::tempdir().unwrap();

    project
        .cmd()
        .current_dir(elsewhere.path())
        .arg("-C")
        .arg(project.path())
        .args(["apply", "--yes"])
        .assert()
        .success();
    assert_eq!(project.read("out/data/motd.txt"), "hello world");
}
