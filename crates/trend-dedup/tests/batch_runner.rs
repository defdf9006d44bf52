mod common;

use std::fs;
use std::sync::Arc;

use common::{feed_date, StubEmbedder, Workspace};
use trend_dedup::history::{HistoryRecord, HistoryStore, JsonHistoryStore};
use trend_dedup::io::write_document;
use trend_dedup::{
  BatchRunner, CategoryOutcome, DedupSettings, Deduplicator, Trend, TrendCandidate, TrendDocument,
};

const SETTINGS: DedupSettings =
  DedupSettings { target_count: 2, similarity_threshold: 0.85, lookback_days: 30 };

fn history(workspace: &Workspace) -> Arc<JsonHistoryStore> {
  Arc::new(JsonHistoryStore::open(&workspace.history_dir(), "tech_trends").unwrap())
}

fn runner(workspace: &Workspace, embedder: StubEmbedder) -> (BatchRunner, Arc<JsonHistoryStore>) {
  let history = history(workspace);
  let deduplicator = Deduplicator::new(Arc::new(embedder), history.clone(), SETTINGS);
  (BatchRunner::new(workspace.layout.clone(), deduplicator), history)
}

fn ai_trends() -> Vec<Trend> {
  vec![
    Trend::new("Agents", 9).with_keywords(["llm", "tools"]),
    Trend::new("LLM agents", 8),
    Trend::new("Rust in the kernel", 7),
    Trend::new("Quantum", 2),
  ]
}

#[tokio::test]
async fn run_filters_archives_and_installs() {
  let workspace = Workspace::new();
  let original = workspace.write_input("ai", ai_trends());
  let (runner, history) = runner(&workspace, StubEmbedder::new().alias("LLM agents", "Agents"));

  let summary = runner.run(feed_date(), None).await.unwrap();

  assert_eq!(summary.processed(), 1);
  assert_eq!(summary.duplicate_rejected(), 1);
  assert_eq!(workspace.output_topics("ai"), vec!["Agents", "Rust in the kernel"]);
  assert_eq!(workspace.archive("ai").unwrap(), original);

  let output_bytes = fs::read(workspace.layout.output_path(feed_date(), "ai")).unwrap();
  assert_eq!(workspace.live("ai"), output_bytes);
  assert_eq!(history.count().await.unwrap(), 2);
}

#[tokio::test]
async fn second_run_is_a_no_op() {
  let workspace = Workspace::new();
  workspace.write_input("ai", ai_trends());

  let (first, _) = runner(&workspace, StubEmbedder::new());
  first.run(feed_date(), None).await.unwrap();
  let output_after_first = workspace.output("ai");
  let live_after_first = workspace.live("ai");

  let embedder = StubEmbedder::new();
  let (second, history) = runner(&workspace, embedder);
  let summary = second.run(feed_date(), None).await.unwrap();

  assert_eq!(summary.skipped(), 1);
  assert_eq!(summary.processed(), 0);
  assert_eq!(workspace.output("ai"), output_after_first);
  assert_eq!(workspace.live("ai"), live_after_first);
  assert_eq!(history.count().await.unwrap(), 2);
}

#[tokio::test]
async fn malformed_category_does_not_stop_siblings() {
  let workspace = Workspace::new();
  workspace.write_raw_input("broken", b"{ this is not json");
  workspace.write_input("web", vec![Trend::new("HTMX", 6)]);
  workspace.write_input("ai", ai_trends());
  let (runner, _) = runner(&workspace, StubEmbedder::new());

  let summary = runner.run(feed_date(), None).await.unwrap();

  assert_eq!(summary.failed(), 1);
  assert_eq!(summary.processed(), 2);
  assert!(matches!(summary.outcome("broken"), Some(CategoryOutcome::Failed { .. })));
  assert_eq!(workspace.live("broken"), b"{ this is not json");
  assert!(workspace.archive("broken").is_none());
  assert_eq!(workspace.output_topics("web"), vec!["HTMX"]);
}

#[tokio::test]
async fn category_mismatch_is_a_validation_failure() {
  let workspace = Workspace::new();
  let document = TrendDocument::new(feed_date(), "web", vec![Trend::new("HTMX", 6)]);
  write_document(&workspace.layout.input_path(feed_date(), "ai"), &document).unwrap();
  let (runner, _) = runner(&workspace, StubEmbedder::new());

  let summary = runner.run(feed_date(), None).await.unwrap();

  assert_eq!(summary.failed(), 1);
  assert!(workspace.output("ai").is_none());
}

#[tokio::test]
async fn empty_input_still_produces_output() {
  let workspace = Workspace::new();
  let original = workspace.write_input("ai", Vec::new());
  let embedder = StubEmbedder::new();
  let (runner, history) = runner(&workspace, embedder);

  let summary = runner.run(feed_date(), None).await.unwrap();

  assert_eq!(summary.processed(), 1);
  let output = workspace.output("ai").unwrap();
  assert!(output.trends.is_empty());
  assert_eq!(output.category, "ai");
  assert_eq!(workspace.archive("ai").unwrap(), original);
  assert_eq!(history.count().await.unwrap(), 0);
}

#[tokio::test]
async fn interrupted_rotation_is_resumed_without_dedup() {
  let workspace = Workspace::new();
  let original = workspace.write_input("ai", ai_trends());
  let filtered = TrendDocument::new(feed_date(), "ai", vec![Trend::new("Agents", 9)]);
  write_document(&workspace.layout.output_path(feed_date(), "ai"), &filtered).unwrap();

  let embedder = Arc::new(StubEmbedder::new());
  let deduplicator = Deduplicator::new(embedder.clone(), history(&workspace), SETTINGS);
  let runner = BatchRunner::new(workspace.layout.clone(), deduplicator);

  let summary = runner.run(feed_date(), None).await.unwrap();

  assert_eq!(summary.outcome("ai"), Some(&CategoryOutcome::Resumed));
  assert_eq!(embedder.calls(), 0);
  assert_eq!(workspace.archive("ai").unwrap(), original);
  assert_eq!(workspace.output_topics("ai"), vec!["Agents"]);
}

#[tokio::test]
async fn conflicting_archive_fails_only_that_category() {
  let workspace = Workspace::new();
  let original = workspace.write_input("ai", ai_trends());
  workspace.write_input("web", vec![Trend::new("HTMX", 6)]);
  let archive = workspace.layout.archive_path(feed_date(), "ai");
  fs::create_dir_all(archive.parent().unwrap()).unwrap();
  fs::write(&archive, b"{\"older\": true}").unwrap();
  let (runner, _) = runner(&workspace, StubEmbedder::new());

  let summary = runner.run(feed_date(), None).await.unwrap();

  assert!(matches!(summary.outcome("ai"), Some(CategoryOutcome::Failed { .. })));
  assert!(matches!(summary.outcome("web"), Some(CategoryOutcome::Processed { .. })));
  assert_eq!(workspace.live("ai"), original);
  assert_eq!(fs::read(&archive).unwrap(), b"{\"older\": true}");
}

#[tokio::test]
async fn category_filter_restricts_the_run() {
  let workspace = Workspace::new();
  workspace.write_input("ai", ai_trends());
  workspace.write_input("web", vec![Trend::new("HTMX", 6)]);
  let (runner, _) = runner(&workspace, StubEmbedder::new());

  let summary = runner.run(feed_date(), Some("web")).await.unwrap();

  assert_eq!(summary.categories.len(), 1);
  assert!(workspace.output("ai").is_none());
  assert_eq!(workspace.output_topics("web"), vec!["HTMX"]);
}

#[tokio::test]
async fn unknown_fields_survive_filtering() {
  let workspace = Workspace::new();
  let input = serde_json::json!({
    "feed_date": "2025-06-15",
    "category": "ai",
    "generated_by": "analyzer-7",
    "trends": [
      {"topic": "Agents", "reason": "everywhere", "score": 9, "links": ["https://a.example"],
       "search_keywords": ["llm"], "sentiment": "positive"},
      {"topic": "Quantum", "reason": "hype", "score": 4, "links": [], "search_keywords": []}
    ]
  });
  workspace.write_raw_input("ai", serde_json::to_vec_pretty(&input).unwrap().as_slice());
  let (runner, _) = runner(&workspace, StubEmbedder::new());

  runner.run(feed_date(), None).await.unwrap();

  let output: serde_json::Value =
    serde_json::from_slice(&fs::read(workspace.layout.output_path(feed_date(), "ai")).unwrap())
      .unwrap();
  assert_eq!(output["generated_by"], "analyzer-7");
  assert_eq!(output["trends"][0]["sentiment"], "positive");
  assert_eq!(output["trends"][0]["links"][0], "https://a.example");
  assert_eq!(output["trends"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn missing_date_directory_is_an_empty_run() {
  let workspace = Workspace::new();
  let (runner, _) = runner(&workspace, StubEmbedder::new());

  let summary = runner.run(feed_date(), None).await.unwrap();

  assert!(summary.categories.is_empty());
  assert_eq!(summary.processed(), 0);
}

#[tokio::test]
async fn embedding_outage_fails_category_and_keeps_it_retryable() {
  let workspace = Workspace::new();
  let original = workspace.write_input("ai", vec![Trend::new("Agents", 9), Trend::new("WASM", 7)]);
  let down = StubEmbedder::new().failing("Agents").failing("WASM");
  let (first, history) = runner(&workspace, down);

  let summary = first.run(feed_date(), None).await.unwrap();

  assert!(matches!(summary.outcome("ai"), Some(CategoryOutcome::Failed { .. })));
  assert_eq!(workspace.live("ai"), original);
  assert!(workspace.output("ai").is_none());
  assert!(workspace.archive("ai").is_none());
  assert_eq!(history.count().await.unwrap(), 0);

  let (retry, _) = runner(&workspace, StubEmbedder::new());
  let summary = retry.run(feed_date(), None).await.unwrap();

  assert!(matches!(summary.outcome("ai"), Some(CategoryOutcome::Processed { selected: 2, .. })));
  assert_eq!(workspace.output_topics("ai"), vec!["Agents", "WASM"]);
}

#[tokio::test]
async fn partial_embedding_failure_still_processes() {
  let workspace = Workspace::new();
  workspace.write_input("ai", vec![Trend::new("Agents", 9), Trend::new("WASM", 7)]);
  let (runner, _) = runner(&workspace, StubEmbedder::new().failing("Agents"));

  let summary = runner.run(feed_date(), None).await.unwrap();

  assert_eq!(summary.embedding_failed(), 1);
  assert_eq!(workspace.output_topics("ai"), vec!["WASM"]);
}

#[tokio::test]
async fn downstream_edit_of_installed_report_is_still_skipped() {
  let workspace = Workspace::new();
  workspace.write_input("ai", ai_trends());
  let (first, _) = runner(&workspace, StubEmbedder::new());
  first.run(feed_date(), None).await.unwrap();

  let live_path = workspace.layout.input_path(feed_date(), "ai");
  let mut edited = workspace.live("ai");
  edited.push(b'\n');
  fs::write(&live_path, &edited).unwrap();

  let embedder = Arc::new(StubEmbedder::new());
  let deduplicator = Deduplicator::new(embedder.clone(), history(&workspace), SETTINGS);
  let second = BatchRunner::new(workspace.layout.clone(), deduplicator);
  let summary = second.run(feed_date(), None).await.unwrap();

  assert_eq!(summary.outcome("ai"), Some(&CategoryOutcome::Skipped));
  assert_eq!(embedder.calls(), 0);
  assert_eq!(workspace.live("ai"), edited);
}

#[tokio::test]
async fn rerun_after_crash_before_output_matches_clean_run() {
  let clean = Workspace::new();
  clean.write_input("ai", ai_trends());
  let clean_embedder = StubEmbedder::new().alias("LLM agents", "Agents");
  let (clean_runner, clean_history) = runner(&clean, clean_embedder);
  clean_runner.run(feed_date(), None).await.unwrap();

  // History already holds the top candidate, but no output was written
  let crashed = Workspace::new();
  crashed.write_input("ai", ai_trends());
  let embedder = StubEmbedder::new().alias("LLM agents", "Agents");
  let top = TrendCandidate {
    trend: Trend::new("Agents", 9).with_keywords(["llm", "tools"]),
    category: "ai".to_string(),
    feed_date: feed_date(),
  };
  let seeded = history(&crashed);
  let record = HistoryRecord::from_candidate(&top, embedder.vector_for("Agents"));
  seeded.insert(&record).await.unwrap();
  drop(seeded);

  let (rerun, history) = runner(&crashed, embedder);
  let summary = rerun.run(feed_date(), None).await.unwrap();

  assert!(matches!(summary.outcome("ai"), Some(CategoryOutcome::Processed { .. })));
  assert_eq!(crashed.output_topics("ai"), clean.output_topics("ai"));
  assert_eq!(crashed.output_topics("ai"), vec!["Agents", "Rust in the kernel"]);
  assert_eq!(history.count().await.unwrap(), clean_history.count().await.unwrap());
}
