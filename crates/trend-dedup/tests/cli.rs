use assert_cmd::prelude::*;
use predicates::prelude::*;
use predicates::str::contains;
use serial_test::serial;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

const FEED_DATE: &str = "2025-06-15";

/// Command for the binary, isolated from the caller's environment and working directory
fn dedup_cmd(dir: &Path) -> Command {
  let mut cmd = Command::cargo_bin("trend-dedup").expect("binary exists");
  cmd
    .current_dir(dir)
    .env_remove("TREND_DEDUP_CONFIG")
    .env_remove("RUST_LOG")
    .env_remove("OPENAI_API_KEY");
  cmd
}

fn write_config(dir: &Path, base_url: &str) -> std::path::PathBuf {
  let root = dir.display();
  let config = format!(
    r#"
deduplication:
  history-keywords: {root}/history
  collection-name: tech_trends
  dedup-analysis-report: {root}/dedup
  similarity-threshold: 0.85
  lookback-days: 30
  target-count: 3
  log: {root}/logs
  embedding-provider: openai
  embedding-model: text-embedding-3-small
  history-backend: json
  embedding-base-url: {base_url}
  max-retries: 1
tech-trend-analysis:
  analysis-report: {root}/analysis
  org-analysis-report: {root}/org
"#
  );
  let path = dir.join("config.yaml");
  fs::write(&path, config).unwrap();
  path
}

fn write_input(dir: &Path) {
  let date_dir = dir.join("analysis").join(FEED_DATE);
  fs::create_dir_all(&date_dir).unwrap();
  let document = serde_json::json!({
    "feed_date": FEED_DATE,
    "category": "ai",
    "trends": [
      {"topic": "Agents", "reason": "", "score": 9, "links": [], "search_keywords": ["llm"]},
      {"topic": "AI agents", "reason": "", "score": 8, "links": [], "search_keywords": []},
      {"topic": "Agentic AI", "reason": "", "score": 7, "links": [], "search_keywords": []}
    ]
  });
  fs::write(date_dir.join("ai.json"), serde_json::to_vec_pretty(&document).unwrap()).unwrap();
}

#[test]
fn test_help_lists_subcommands() {
  let temp = TempDir::new().unwrap();
  dedup_cmd(temp.path())
    .arg("--help")
    .assert()
    .success()
    .stdout(contains("run").and(contains("history")));
}

#[test]
#[serial]
fn test_missing_config_fails() {
  let temp = TempDir::new().unwrap();
  dedup_cmd(temp.path())
    .args(["run", "--config", "nowhere.yaml"])
    .assert()
    .failure()
    .stderr(contains("Configuration file not found"));
}

#[test]
#[serial]
fn test_missing_credential_fails() {
  let temp = TempDir::new().unwrap();
  let config = write_config(temp.path(), "http://127.0.0.1:9");

  dedup_cmd(temp.path())
    .arg("run")
    .arg("--config")
    .arg(&config)
    .assert()
    .failure()
    .stderr(contains("OPENAI_API_KEY"));
}

#[test]
fn test_bad_feed_date_is_rejected() {
  let temp = TempDir::new().unwrap();
  dedup_cmd(temp.path())
    .args(["run", "--feed-date", "15/06/2025"])
    .assert()
    .failure()
    .stderr(contains("YYYY-MM-DD"));
}

#[test]
#[serial]
fn test_unlistable_date_directory_still_exits_zero() {
  let temp = TempDir::new().unwrap();
  let config = write_config(temp.path(), "http://127.0.0.1:9");
  // A file where the date directory should be
  fs::create_dir_all(temp.path().join("analysis")).unwrap();
  fs::write(temp.path().join("analysis").join(FEED_DATE), "not a directory").unwrap();

  dedup_cmd(temp.path())
    .env("OPENAI_API_KEY", "sk-test")
    .args(["run", "--feed-date", FEED_DATE, "--config"])
    .arg(&config)
    .assert()
    .success()
    .stdout(contains("processed=0").and(contains("failed=0")));
}

#[test]
#[serial]
fn test_full_run_then_rerun() {
  let temp = TempDir::new().unwrap();
  let mut server = mockito::Server::new();
  // Every topic embeds to the same vector, so only the first can survive
  let mock = server
    .mock("POST", "/embeddings")
    .with_status(200)
    .with_header("content-type", "application/json")
    .with_body(r#"{"data": [{"embedding": [0.6, 0.8], "index": 0}]}"#)
    .expect(3)
    .create();

  let config = write_config(temp.path(), &server.url());
  write_input(temp.path());

  dedup_cmd(temp.path())
    .env("OPENAI_API_KEY", "sk-test")
    .args(["run", "--feed-date", FEED_DATE, "--config"])
    .arg(&config)
    .assert()
    .success()
    .stdout(contains("processed=1").and(contains("duplicate_rejected=2")));
  mock.assert();

  let live_path = temp.path().join("analysis").join(FEED_DATE).join("ai.json");
  let live: serde_json::Value = serde_json::from_slice(&fs::read(live_path).unwrap()).unwrap();
  assert_eq!(live["trends"].as_array().unwrap().len(), 1);
  assert!(temp.path().join("org").join(FEED_DATE).join("ai.json").exists());
  assert!(temp.path().join("logs").join("deduplication.log").exists());

  dedup_cmd(temp.path())
    .env("OPENAI_API_KEY", "sk-test")
    .args(["run", "--feed-date", FEED_DATE, "--config"])
    .arg(&config)
    .assert()
    .success()
    .stdout(contains("skipped=1"));

  dedup_cmd(temp.path())
    .args(["history", "--config"])
    .arg(&config)
    .assert()
    .success()
    .stdout(contains("records:    1").and(contains("json")));
}
