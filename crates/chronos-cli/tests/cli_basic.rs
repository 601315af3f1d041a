//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary against a throwaway data directory and
//! verify its outputs.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(data_dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_chronos"))
        .args(args)
        .env("CHRONOS_DATA_DIR", data_dir)
        .env("CHRONOS_LOG", "warn")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_json(data_dir: &Path, args: &[&str]) -> serde_json::Value {
    let (stdout, stderr, code) = run_cli(data_dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("{args:?} printed non-JSON ({e}): {stdout}"))
}

#[test]
fn test_config_list_and_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let config = run_json(dir.path(), &["config", "list"]);
    assert_eq!(config["timer"]["checkpoint_interval_secs"], 10);
    assert!(dir.path().join("config.toml").exists());

    let (_, _, code) = run_cli(dir.path(), &["config", "set", "progress.grace_minutes", "2"]);
    assert_eq!(code, 0);
    let (stdout, _, code) = run_cli(dir.path(), &["config", "get", "progress.grace_minutes"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "2");
}

#[test]
fn test_config_get_unknown_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["config", "get", "timer.nope"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("unknown key"));
}

#[test]
fn test_plan_reports_aggregates_and_reserve() {
    let dir = tempfile::tempdir().unwrap();
    let plan = run_json(
        dir.path(),
        &["plan", "--window", "120", "--session", "25/5", "--session", "50/10"],
    );
    assert_eq!(plan["aggregateFocusMinutes"], 75);
    assert_eq!(plan["aggregateRestMinutes"], 15);
    assert_eq!(plan["strategicReserveMinutes"], 30);
    assert_eq!(plan["sessions"].as_array().unwrap().len(), 2);
}

#[test]
fn test_plan_clamps_out_of_range_pairs() {
    let dir = tempfile::tempdir().unwrap();
    let plan = run_json(dir.path(), &["plan", "--window", "120", "--session", "90/0"]);
    assert_eq!(plan["sessions"][0]["focusDurationMinutes"], 60);
    assert_eq!(plan["sessions"][0]["restDurationMinutes"], 1);
}

#[test]
fn test_plan_disabled_collapses() {
    let dir = tempfile::tempdir().unwrap();
    let plan = run_json(dir.path(), &["plan", "--window", "60", "--disabled"]);
    assert_eq!(plan, serde_json::json!({ "enabled": false }));
}

#[test]
fn test_cycle_status_without_record_is_idle() {
    let dir = tempfile::tempdir().unwrap();
    let status = run_json(dir.path(), &["cycle", "status", "nothing-here"]);
    assert_eq!(status["state"], "idle");
}

#[test]
fn test_cycle_lifecycle() {
    let dir = tempfile::tempdir().unwrap();
    run_json(
        dir.path(),
        &["plan", "--window", "60", "--session", "25/5", "--activity", "act-1"],
    );

    let status = run_json(dir.path(), &["cycle", "status", "act-1"]);
    assert_eq!(status["type"], "StateSnapshot");
    assert_eq!(status["state"], "idle");
    assert_eq!(status["remaining_secs"], 1500);
    assert_eq!(status["target_cycles"], 1);

    let (stdout, stderr, code) = run_cli(dir.path(), &["cycle", "start", "act-1"]);
    assert_eq!(code, 0, "start failed: {stderr}");
    assert!(stdout.contains("TimerStarted"));

    let status = run_json(dir.path(), &["cycle", "status", "act-1"]);
    assert_eq!(status["state"], "running");

    let (_, stderr, code) = run_cli(dir.path(), &["cycle", "pause", "act-1"]);
    assert_eq!(code, 0, "pause failed: {stderr}");
    let status = run_json(dir.path(), &["cycle", "status", "act-1"]);
    assert_eq!(status["state"], "idle");
    assert_eq!(status["phase"], "focus");

    let (_, _, code) = run_cli(dir.path(), &["cycle", "cancel", "act-1"]);
    assert_eq!(code, 0);
    let status = run_json(dir.path(), &["cycle", "status", "act-1"]);
    assert_eq!(status["state"], "idle");
    assert!(status.get("type").is_none());
}

#[test]
fn test_cycle_cleanup_on_empty_store() {
    let dir = tempfile::tempdir().unwrap();
    let (stdout, _, code) = run_cli(dir.path(), &["cycle", "cleanup"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("removed 0"));
}

#[test]
fn test_progress_in_window() {
    let dir = tempfile::tempdir().unwrap();
    let status = run_json(
        dir.path(),
        &[
            "progress", "--date", "2026-03-02", "--start", "09:00", "--end", "10:00", "--at",
            "2026-03-02T09:20",
        ],
    );
    assert_eq!(status["status"], "in_progress");
    let percent = status["percent"].as_f64().unwrap();
    assert!((percent - 33.333).abs() < 0.01);
}

#[test]
fn test_progress_past_grace_awaits_completion() {
    let dir = tempfile::tempdir().unwrap();
    let status = run_json(
        dir.path(),
        &[
            "progress", "--date", "2026-03-02", "--start", "09:00", "--end", "10:00", "--at",
            "2026-03-02T10:10",
        ],
    );
    assert_eq!(status["status"], "awaiting_completion");
}

#[test]
fn test_progress_rejects_inverted_window() {
    let dir = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(
        dir.path(),
        &["progress", "--date", "2026-03-02", "--start", "10:00", "--end", "09:00"],
    );
    assert_ne!(code, 0);
}
