//! Integration tests for the `parley` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Command isolated from the caller's credentials and config files.
fn parley(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("parley").unwrap();
    cmd.current_dir(temp_dir.path()).env_clear().env("HOME", temp_dir.path());
    cmd
}

#[test]
fn test_mock_preset_prints_answer() {
    let temp_dir = TempDir::new().unwrap();
    parley(&temp_dir)
        .args(["--preset", "mock", "--round-limit", "2", "--task", "Say hello"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Answer: No answer produced within the round limit."))
        .stdout(predicate::str::contains("Rounds: 2"));
}

#[test]
fn test_json_output() {
    let temp_dir = TempDir::new().unwrap();
    let output = parley(&temp_dir)
        .args(["--preset", "mock", "--round-limit", "1", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["answer"], "No answer produced within the round limit.");
    assert_eq!(value["history"].as_array().unwrap().len(), 1);
    assert!(value["usage"]["roles"].is_object());
}

#[test]
fn test_missing_credential_fails() {
    let temp_dir = TempDir::new().unwrap();
    parley(&temp_dir)
        .args(["--preset", "deepseek"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("DEEPSEEK_API_KEY"));
}

#[test]
fn test_unknown_preset_fails() {
    let temp_dir = TempDir::new().unwrap();
    parley(&temp_dir)
        .args(["--preset", "gemini"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown preset 'gemini'"));
}

#[test]
fn test_local_config_file_is_used() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join(".parleyrc"), "preset = \"mock\"\nround_limit = 1\n").unwrap();

    parley(&temp_dir)
        .assert()
        .success()
        .stdout(predicate::str::contains("Rounds: 1"));
}

#[test]
fn test_blank_env_file_value_counts_as_missing() {
    let temp_dir = TempDir::new().unwrap();
    let env_file = temp_dir.path().join("keys.env");
    fs::write(&env_file, "DEEPSEEK_API_KEY=\n").unwrap();

    parley(&temp_dir)
        .args(["--preset", "deepseek", "--env-file"])
        .arg(&env_file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("DEEPSEEK_API_KEY"));
}

#[test]
fn test_env_file_supplies_credentials() {
    let temp_dir = TempDir::new().unwrap();
    let env_file = temp_dir.path().join("keys.env");
    fs::write(&env_file, "DEEPSEEK_API_KEY=sk-from-file\n").unwrap();
    fs::write(temp_dir.path().join(".parleyrc"), "round_limit = 1\n[retry]\nmax_attempts = 1\n").unwrap();

    // the session is built; the first model call fails on the unreachable proxy
    parley(&temp_dir)
        .env("HTTPS_PROXY", "http://127.0.0.1:9")
        .args(["--preset", "deepseek", "--task", "Add 2 and 2", "--env-file"])
        .arg(&env_file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Session aborted after 0 turn(s)"))
        .stderr(predicate::str::contains("Missing credential").not());
}

#[test]
fn test_missing_env_file_fails() {
    let temp_dir = TempDir::new().unwrap();
    parley(&temp_dir)
        .args(["--preset", "mock", "--env-file", "absent.env"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Environment file not found"));
}
