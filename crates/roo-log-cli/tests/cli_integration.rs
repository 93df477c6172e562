use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::Value;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|err| panic!("clock should be >= UNIX_EPOCH: {err}"))
        .as_nanos();
    let dir = std::env::temp_dir().join(format!("{prefix}-{now}"));
    fs::create_dir_all(&dir)
        .unwrap_or_else(|err| panic!("failed to create temp dir {}: {err}", dir.display()));
    dir
}

fn run_roolog<I, S>(args: I) -> Output
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    Command::new(env!("CARGO_BIN_EXE_roolog"))
        .args(args)
        .output()
        .unwrap_or_else(|err| panic!("failed to execute roolog binary: {err}"))
}

fn run_json<I, S>(args: I) -> Value
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let output = run_roolog(args);
    if !output.status.success() {
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        panic!(
            "roolog command failed (status={}):\nstdout:\n{}\nstderr:\n{}",
            output.status, stdout, stderr
        );
    }

    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("stdout is not valid JSON: {err}\nstdout:\n{stdout}"))
}

fn as_i64(value: &Value, key: &str) -> i64 {
    value
        .get(key)
        .and_then(Value::as_i64)
        .unwrap_or_else(|| panic!("missing integer field `{key}` in payload: {value}"))
}

fn as_str<'a>(value: &'a Value, key: &str) -> &'a str {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_else(|| panic!("missing string field `{key}` in payload: {value}"))
}

fn path_str(path: &Path) -> &str {
    path.to_str().unwrap_or_else(|| panic!("path should be valid UTF-8: {}", path.display()))
}

// Test IDs: TCLI-001
#[test]
fn migrate_then_schema_version_reports_up_to_date() {
    let dir = unique_temp_dir("roolog-cli-migrate");
    let db = dir.join("log.sqlite3");

    let migrated = run_json(["--db", path_str(&db), "db", "migrate"]);
    assert_eq!(migrated.get("dry_run"), Some(&Value::Bool(false)));
    assert_eq!(as_i64(&migrated, "after_version"), 1);

    let status = run_json(["--db", path_str(&db), "db", "schema-version"]);
    assert_eq!(as_i64(&status, "current_version"), 1);
    assert_eq!(status.get("up_to_date"), Some(&Value::Bool(true)));
    assert_eq!(as_str(&status, "contract_version"), "cli.v1");

    let _ = fs::remove_dir_all(&dir);
}

// Test IDs: TCLI-002
#[test]
fn add_then_show_reports_both_lane_heads() {
    let dir = unique_temp_dir("roolog-cli-add");
    let db = dir.join("log.sqlite3");

    let added = run_json([
        "--db",
        path_str(&db),
        "log",
        "add-good",
        "--thread-id",
        "threadA",
        "--comment-id",
        "commentA",
        "--comment-url",
        "https://example.com/comments/threadA/commentA",
        "--submission-url",
        "https://example.com/comments/subA",
        "--submission-id",
        "subA",
    ]);
    assert_eq!(as_str(&added, "submission_id"), "subA");

    run_json([
        "--db",
        path_str(&db),
        "log",
        "add-last",
        "--submission-url",
        "https://example.com/comments/subA",
    ]);

    let shown = run_json(["--db", path_str(&db), "log", "show"]);
    assert_eq!(as_i64(&shown, "good_len"), 1);
    assert_eq!(as_i64(&shown, "raw_len"), 1);
    let good = shown
        .get("good")
        .unwrap_or_else(|| panic!("missing good entry in payload: {shown}"));
    assert_eq!(as_str(good, "submission_id"), "subA");
    assert_eq!(as_str(&shown, "submitted"), "https://example.com/comments/subA");

    let _ = fs::remove_dir_all(&dir);
}

// Test IDs: TCLI-003
#[test]
fn export_then_import_moves_the_snapshot_between_databases() {
    let dir = unique_temp_dir("roolog-cli-export");
    let source_db = dir.join("source.sqlite3");
    let target_db = dir.join("target.sqlite3");
    let snapshot = dir.join("snapshot.json");

    run_json([
        "--db",
        path_str(&source_db),
        "log",
        "add-good",
        "--thread-id",
        "threadB",
        "--comment-id",
        "commentB",
        "--comment-url",
        "https://example.com/comments/threadB/commentB",
        "--submission-url",
        "https://example.com/comments/subB",
        "--submission-id",
        "subB",
    ]);

    let exported =
        run_json(["--db", path_str(&source_db), "log", "export", "--out", path_str(&snapshot)]);
    assert_eq!(as_i64(&exported, "good"), 1);
    assert!(as_str(&exported, "digest").starts_with("sha256:"));

    let imported =
        run_json(["--db", path_str(&target_db), "log", "import", "--in", path_str(&snapshot)]);
    assert_eq!(as_i64(&imported, "good"), 1);
    assert_eq!(as_i64(&imported, "evicted"), 0);

    let shown = run_json(["--db", path_str(&target_db), "log", "show"]);
    let good = shown
        .get("good")
        .unwrap_or_else(|| panic!("missing good entry in payload: {shown}"));
    assert_eq!(as_str(good, "submission_id"), "subB");

    let _ = fs::remove_dir_all(&dir);
}

// Test IDs: TCLI-004
#[test]
fn show_with_out_of_range_index_fails() {
    let dir = unique_temp_dir("roolog-cli-range");
    let db = dir.join("log.sqlite3");

    run_json([
        "--db",
        path_str(&db),
        "log",
        "add-last",
        "--submission-url",
        "https://example.com/comments/subC",
    ]);

    let output = run_roolog(["--db", path_str(&db), "log", "show", "--index", "5"]);
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("out of range"), "unexpected stderr: {stderr}");

    let _ = fs::remove_dir_all(&dir);
}

// Test IDs: TCLI-005
#[test]
fn backup_then_restore_preserves_the_log() {
    let dir = unique_temp_dir("roolog-cli-backup");
    let db = dir.join("log.sqlite3");
    let backup = dir.join("backup.sqlite3");
    let restored_db = dir.join("restored.sqlite3");

    run_json([
        "--db",
        path_str(&db),
        "log",
        "add-last",
        "--submission-url",
        "https://example.com/comments/subD",
    ]);

    run_json(["--db", path_str(&db), "db", "backup", "--out", path_str(&backup)]);
    run_json(["--db", path_str(&restored_db), "db", "restore", "--in", path_str(&backup)]);

    let shown = run_json(["--db", path_str(&restored_db), "log", "show"]);
    assert_eq!(as_str(&shown, "submitted"), "https://example.com/comments/subD");

    let _ = fs::remove_dir_all(&dir);
}
