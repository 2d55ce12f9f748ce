//! CLI integration tests for boardtrack.
//!
//! Every test runs against an embedded store in a fresh temporary directory.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Get a command for the boardtrack binary with no database configured.
fn cmd() -> Command {
    let mut cmd = Command::cargo_bin("boardtrack").unwrap();
    cmd.env_remove("DATABASE_URL").env_remove("RUST_LOG");
    cmd
}

/// A command pointed at an embedded store inside `dir`.
fn db_cmd(dir: &TempDir) -> Command {
    let mut cmd = cmd();
    cmd.env("DATABASE_URL", dir.path().join("db"));
    cmd
}

fn status_json(dir: &TempDir) -> serde_json::Value {
    let output = db_cmd(dir)
        .args(["--format", "json", "migrate", "status"])
        .output()
        .unwrap();
    assert!(output.status.success());
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("schema"))
        .stdout(predicate::str::contains("--database-url"));
}

#[test]
fn test_down_help() {
    cmd()
        .args(["migrate", "down", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--to"))
        .stdout(predicate::str::contains("--all"))
        .stdout(predicate::str::contains("--dry-run"));
}

#[test]
fn test_schema_prints_ddl() {
    cmd()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "CREATE TYPE \"enum_users_role\" AS ENUM ('user', 'admin');",
        ))
        .stdout(predicate::str::contains("CREATE TABLE \"citySubscriptions\""))
        .stdout(predicate::str::contains("USING gist"));
}

#[test]
fn test_migrate_requires_database() {
    cmd()
        .args(["migrate", "status"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("DATABASE_URL"));
}

#[test]
fn test_up_then_status() {
    let dir = TempDir::new().unwrap();

    db_cmd(&dir)
        .args(["migrate", "up"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Applied 20180315090000-create-users"))
        .stdout(predicate::str::contains(
            "Applied 20190904160000-remove-deleted-at-from-city-subscriptions",
        ));

    let status = status_json(&dir);
    assert_eq!(status["pending"], 0);
    assert_eq!(status["currentVersion"], "20190904160000");
    assert_eq!(status["steps"].as_array().map(Vec::len), Some(25));

    db_cmd(&dir)
        .args(["migrate", "up"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Schema is up to date"));
}

#[test]
fn test_up_to_version_via_flag() {
    let dir = TempDir::new().unwrap();

    cmd()
        .arg("--database-url")
        .arg(dir.path().join("db"))
        .args(["migrate", "up", "--to", "20180516120000-boards-serial-unique"])
        .assert()
        .success();

    let status = status_json(&dir);
    assert_eq!(status["currentVersion"], "20180516120000");
    assert_eq!(status["pending"], 15);
}

#[test]
fn test_dry_run_changes_nothing() {
    let dir = TempDir::new().unwrap();

    db_cmd(&dir)
        .args(["migrate", "up", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("-- 20180315090000-create-users"))
        .stdout(predicate::str::contains("CREATE TABLE \"users\""));

    assert_eq!(status_json(&dir)["pending"], 25);
}

#[test]
fn test_down_reports_lossy_revert() {
    let dir = TempDir::new().unwrap();
    db_cmd(&dir).args(["migrate", "up"]).assert().success();

    db_cmd(&dir)
        .args(["migrate", "down"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reverted 20190904160000"))
        .stdout(predicate::str::contains("warning: irreversible step 20190904160000"));

    db_cmd(&dir)
        .args(["migrate", "down", "--all"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Reverted 20180315090000-create-users"));

    assert_eq!(status_json(&dir)["pending"], 25);
}

#[test]
fn test_down_to_unknown_version_fails() {
    let dir = TempDir::new().unwrap();

    db_cmd(&dir)
        .args(["migrate", "down", "--to", "20000101000000"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown target version 20000101000000"));
}

#[test]
fn test_down_to_and_all_conflict() {
    let dir = TempDir::new().unwrap();

    db_cmd(&dir)
        .args(["migrate", "down", "--to", "20180315090000", "--all"])
        .assert()
        .failure();
}

#[cfg(not(feature = "postgres"))]
#[test]
fn test_postgres_url_needs_feature() {
    cmd()
        .args(["--database-url", "postgres://localhost/boardtrack", "migrate", "status"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("postgres"));
}
