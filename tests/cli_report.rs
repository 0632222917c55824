//! Integration tests for `testbed-report`.

use assert_cmd::Command;
use chrono::{Duration, Utc};
use mcp_testbed::mcp::results::ResultPersistence;
use mcp_testbed::mcp::{FileResultPersistence, Outcome, TestResult};
use predicates::prelude::*;
use serde_json::Value;
use tempfile::TempDir;

fn report_cmd() -> Command {
    Command::cargo_bin("testbed-report").expect("testbed-report binary not found")
}

fn seed(dir: &TempDir) {
    let store = FileResultPersistence::new(dir.path().join("results"));
    let now = Utc::now();
    for (i, (id, outcome)) in [
        ("login", Outcome::Pass),
        ("logout", Outcome::Fail),
        ("profile", Outcome::Partial),
    ]
    .into_iter()
    .enumerate()
    {
        store
            .persist(&TestResult {
                test_id: id.to_string(),
                result: outcome,
                details: Value::Null,
                notes: String::new(),
                timestamp: now + Duration::seconds(i as i64 * 30),
                session_id: None,
            })
            .unwrap();
    }
}

#[test]
fn test_summary_over_all_results() {
    let dir = TempDir::new().unwrap();
    seed(&dir);

    let output = report_cmd()
        .arg("--data-dir")
        .arg(dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["format"], "summary");
    assert_eq!(report["counts"]["total"], 3);
    assert_eq!(report["counts"]["pass"], 1);
}

#[test]
fn test_selected_ids_with_metrics() {
    let dir = TempDir::new().unwrap();
    seed(&dir);

    let output = report_cmd()
        .arg("--data-dir")
        .arg(dir.path())
        .args(["--format", "technical", "--test-id", "login", "--test-id", "profile", "--test-id", "ghost", "--metrics"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["counts"]["total"], 2);
    assert_eq!(report["missing_test_ids"][0], "ghost");
    assert_eq!(report["metrics"]["span_seconds"], 60.0);
}

#[test]
fn test_empty_data_dir_reports_zero() {
    let dir = TempDir::new().unwrap();
    let output = report_cmd()
        .arg("--data-dir")
        .arg(dir.path())
        .args(["--format", "executive"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["status"], "gray");
    assert_eq!(report["success_rate"], 0.0);
}

#[test]
fn test_unknown_format_is_rejected() {
    report_cmd()
        .args(["--format", "poem"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("poem"));
}
