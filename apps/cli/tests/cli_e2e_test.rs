//! End-to-end tests for the `lathe` binary.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Writes a config with zero delays and two datasets, returning its path.
fn write_config(temp: &TempDir) -> PathBuf {
    let dir = temp.path();
    let config = format!(
        r#"database_path = "{db}"
log_dir = "{logs}"
model_dir = "{models}"
epoch_delay_ms = 0
runner_start_delay_ms = 0

[[datasets]]
id = 1
owner_id = 1
file_reference = "reviews.csv"

[[datasets]]
id = 2
owner_id = 2
file_reference = "tweets.csv"
"#,
        db = dir.join("lathe.db").display(),
        logs = dir.join("logs").display(),
        models = dir.join("models").display(),
    );
    let path = dir.join("lathe.toml");
    std::fs::write(&path, config).unwrap();
    path
}

fn lathe(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("lathe").unwrap();
    cmd.env_remove("LATHE_DATABASE")
        .env_remove("LATHE_LOG_DIR")
        .env_remove("LATHE_MODEL_DIR")
        .arg("--config")
        .arg(config)
        .arg("--log-level")
        .arg("error");
    cmd
}

fn json_stdout(cmd: &mut Command) -> serde_json::Value {
    let assert = cmd.assert().success();
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    serde_json::from_str(&stdout).expect("stdout should be valid JSON")
}

fn train_job(config: &Path) -> serde_json::Value {
    json_stdout(lathe(config).args(["train", "--dataset", "1", "--epochs", "2", "--json"]))
}

#[test]
fn test_no_command_prints_help() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);
    lathe(&config).assert().success().stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_train_runs_to_completion() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);

    let status = train_job(&config);
    assert_eq!(status["status"], "completed");
    assert_eq!(status["progress"], 100.0);
    assert_eq!(status["epochs"], 2);
    assert!(status["model_name"].as_str().unwrap().starts_with("model_1_"));
}

#[test]
fn test_status_logs_and_list_after_training() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);
    let job_id = train_job(&config)["job_id"].as_i64().unwrap().to_string();

    let status = json_stdout(lathe(&config).args(["status", &job_id, "--json"]));
    assert_eq!(status["status"], "completed");
    assert!(!status["logs"].as_array().unwrap().is_empty());

    lathe(&config)
        .args(["logs", &job_id, "--lines", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Training completed. Model saved as model_1_"));

    let jobs = json_stdout(lathe(&config).args(["list", "--json"]));
    assert_eq!(jobs.as_array().unwrap().len(), 1);

    let completed = json_stdout(lathe(&config).args(["list", "--status", "completed", "--json"]));
    assert_eq!(completed.as_array().unwrap().len(), 1);
    let failed = json_stdout(lathe(&config).args(["list", "--status", "failed", "--json"]));
    assert!(failed.as_array().unwrap().is_empty());

    lathe(&config)
        .args(["stop", &job_id])
        .assert()
        .success()
        .stdout(predicate::str::contains("already finished"));
}

#[test]
fn test_jobs_hidden_from_other_users() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);
    let job_id = train_job(&config)["job_id"].as_i64().unwrap().to_string();

    lathe(&config)
        .args(["--user", "2", "status", &job_id])
        .assert()
        .failure()
        .stderr(predicate::str::contains("30002"));

    let jobs = json_stdout(lathe(&config).args(["--user", "2", "list", "--json"]));
    assert!(jobs.as_array().unwrap().is_empty());

    let jobs = json_stdout(lathe(&config).args(["--user", "9", "--admin", "list", "--json"]));
    assert_eq!(jobs.as_array().unwrap().len(), 1);
}

#[test]
fn test_predict_with_trained_and_default_model() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);
    let status = train_job(&config);
    let job_id = status["job_id"].as_i64().unwrap();

    let result = json_stdout(lathe(&config).args([
        "predict",
        "hello",
        "--model",
        &job_id.to_string(),
        "--json",
    ]));
    assert_eq!(result["predicted_class"], "short");
    assert_eq!(result["model_job_id"], job_id);
    assert_eq!(result["model_name"], status["model_name"]);

    let fallback = json_stdout(lathe(&config).args(["predict", "hello", "--model", "77", "--json"]));
    assert!(fallback["model_job_id"].is_null());

    lathe(&config)
        .args(["predict", "   "])
        .assert()
        .failure()
        .stderr(predicate::str::contains("10001"));
}

#[test]
fn test_error_codes_reach_the_user() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);

    lathe(&config)
        .args(["train", "--dataset", "999"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[20001] dataset 999 not found"));

    lathe(&config)
        .args(["train", "--dataset", "1", "--epochs", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("10001"));

    lathe(&config)
        .args(["status", "42"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("[30002]"));

    lathe(&config).args(["list", "--status", "bogus"]).assert().failure();

    // Nothing was created by the rejected requests.
    let jobs = json_stdout(lathe(&config).args(["list", "--json"]));
    assert!(jobs.as_array().unwrap().is_empty());
}

#[test]
fn test_datasets_filtered_by_user() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);

    let mine = json_stdout(lathe(&config).args(["datasets", "--json"]));
    let mine = mine.as_array().unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0]["file_reference"], "reviews.csv");

    let all = json_stdout(lathe(&config).args(["--admin", "datasets", "--json"]));
    assert_eq!(all.as_array().unwrap().len(), 2);
}

#[test]
fn test_recover_with_nothing_to_do() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);
    lathe(&config)
        .arg("recover")
        .assert()
        .success()
        .stdout(predicate::str::contains("Nothing to recover"));
}

#[test]
fn test_missing_config_file() {
    let temp = TempDir::new().unwrap();
    lathe(&temp.path().join("absent.toml"))
        .arg("list")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
}
