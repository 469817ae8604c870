//! Basic CLI E2E tests.
//!
//! Tests invoke CLI commands via cargo run against an isolated data
//! directory and verify the JSON they print.

use std::path::Path;
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

fn run_cli(data_dir: &Path, args: &[&str]) -> (i32, String, String) {
    let output = Command::new("cargo")
        .args(["run", "--quiet", "-p", "stride-cli", "--"])
        .args(args)
        .env("STRIDE_DATA_DIR", data_dir)
        .output()
        .expect("failed to execute CLI command");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

fn add_habit(dir: &Path, args: &[&str]) -> String {
    let mut full = vec!["habit", "add"];
    full.extend_from_slice(args);
    let (code, stdout, stderr) = run_cli(dir, &full);
    assert_eq!(code, 0, "habit add failed: {stderr}");
    let habit: Value = serde_json::from_str(&stdout).expect("habit add prints JSON");
    habit["id"].as_str().expect("habit has an id").to_string()
}

#[test]
fn test_habit_add_and_list() {
    let dir = TempDir::new().unwrap();
    let id = add_habit(dir.path(), &["Reading", "--timer", "--goal", "15"]);

    let (code, stdout, _) = run_cli(dir.path(), &["habit", "list"]);
    assert_eq!(code, 0);
    let habits: Value = serde_json::from_str(&stdout).unwrap();
    let list = habits.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["id"].as_str().unwrap(), id);
    assert_eq!(list[0]["kind"].as_str().unwrap(), "timer");
    assert_eq!(list[0]["goal_value"].as_u64().unwrap(), 15);
}

#[test]
fn test_timer_start_status_pause() {
    let dir = TempDir::new().unwrap();
    let id = add_habit(dir.path(), &["Reading", "--timer", "--goal", "15"]);

    let (code, stdout, stderr) = run_cli(dir.path(), &["timer", "start", &id]);
    assert_eq!(code, 0, "timer start failed: {stderr}");
    let event: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(event["type"].as_str().unwrap(), "TimerStarted");

    let (code, stdout, _) = run_cli(dir.path(), &["timer", "status", &id]);
    assert_eq!(code, 0);
    let status: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["phase"]["phase"].as_str().unwrap(), "running");

    // A second start in a fresh process is still a no-op: the running
    // session was recovered from the store.
    let (code, stdout, _) = run_cli(dir.path(), &["timer", "start", &id]);
    assert_eq!(code, 0);
    assert!(stdout.trim().is_empty(), "duplicate start must stay silent");

    let (code, stdout, _) = run_cli(dir.path(), &["timer", "pause", &id]);
    assert_eq!(code, 0);
    let event: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(event["type"].as_str().unwrap(), "TimerPaused");

    let (code, stdout, _) = run_cli(dir.path(), &["timer", "status", &id]);
    assert_eq!(code, 0);
    let status: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(status["phase"]["phase"].as_str().unwrap(), "idle");
}

#[test]
fn test_malformed_and_unknown_ids_are_silent() {
    let dir = TempDir::new().unwrap();

    let (code, stdout, _) = run_cli(dir.path(), &["timer", "start", "not-a-uuid"]);
    assert_eq!(code, 0);
    assert!(stdout.trim().is_empty());

    let (code, stdout, _) = run_cli(
        dir.path(),
        &["timer", "pause", "00000000-0000-0000-0000-000000000000"],
    );
    assert_eq!(code, 0);
    assert!(stdout.trim().is_empty());
}

#[test]
fn test_increment_count_habit() {
    let dir = TempDir::new().unwrap();
    let id = add_habit(dir.path(), &["Push-ups"]);

    let (code, stdout, stderr) = run_cli(dir.path(), &["habit", "increment", &id]);
    assert_eq!(code, 0, "increment failed: {stderr}");
    let event: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(event["type"].as_str().unwrap(), "HabitIncremented");
    assert_eq!(event["total_completions"].as_u64().unwrap(), 1);
    assert_eq!(event["current_streak"].as_u64().unwrap(), 1);

    // Incrementing a timer habit is a silent no-op.
    let timer_id = add_habit(dir.path(), &["Reading", "--timer"]);
    let (code, stdout, _) = run_cli(dir.path(), &["habit", "increment", &timer_id]);
    assert_eq!(code, 0);
    assert!(stdout.trim().is_empty());
}

#[test]
fn test_export_bootstrap_writes_snapshot() {
    let dir = TempDir::new().unwrap();
    add_habit(dir.path(), &["Reading", "--timer"]);

    let (code, stdout, stderr) = run_cli(dir.path(), &["export", "bootstrap"]);
    assert_eq!(code, 0, "export bootstrap failed: {stderr}");
    let path = stdout.trim();
    assert!(Path::new(path).exists());

    let snapshot: Value =
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(snapshot["habits"].as_array().unwrap().len(), 1);
}

#[test]
fn test_config_get_and_set() {
    let dir = TempDir::new().unwrap();

    let (code, stdout, _) = run_cli(dir.path(), &["config", "get", "timer.default_goal_minutes"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "15");

    let (code, _, _) = run_cli(
        dir.path(),
        &["config", "set", "timer.default_goal_minutes", "25"],
    );
    assert_eq!(code, 0);

    let (code, stdout, _) = run_cli(dir.path(), &["config", "get", "timer.default_goal_minutes"]);
    assert_eq!(code, 0);
    assert_eq!(stdout.trim(), "25");

    // New timer habits pick the default up.
    let (code, stdout, _) = run_cli(dir.path(), &["habit", "add", "Writing", "--timer"]);
    assert_eq!(code, 0);
    let habit: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(habit["goal_value"].as_u64().unwrap(), 25);

    let (code, _, _) = run_cli(dir.path(), &["config", "get", "unknown.key"]);
    assert_eq!(code, 1);
}
