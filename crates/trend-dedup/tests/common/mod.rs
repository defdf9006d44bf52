#![allow(dead_code)]

use async_trait::async_trait;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::TempDir;

use trend_dedup::error::EmbeddingError;
use trend_dedup::io::{render_document, ReportLayout};
use trend_dedup::{Embedder, Trend, TrendCandidate, TrendDocument};

pub const DIMENSION: usize = 32;

pub fn feed_date() -> NaiveDate {
  NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
}

pub fn days_before(days: u64) -> NaiveDate {
  feed_date() - chrono::Days::new(days)
}

/// Deterministic embedder keyed on the topic inside the document text.
/// Unrelated topics get pseudo-random directions; aliases land next to their base topic.
#[derive(Default)]
pub struct StubEmbedder {
  aliases: HashMap<String, String>,
  failing: HashSet<String>,
  calls: AtomicUsize,
}

impl StubEmbedder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Embed `topic` almost exactly like `base`
  pub fn alias(mut self, topic: &str, base: &str) -> Self {
    self.aliases.insert(topic.to_string(), base.to_string());
    self
  }

  /// Fail `topic` the way an exhausted retry schedule does
  pub fn failing(mut self, topic: &str) -> Self {
    self.failing.insert(topic.to_string());
    self
  }

  pub fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }

  pub fn vector_for(&self, topic: &str) -> Vec<f32> {
    match self.aliases.get(topic) {
      Some(base) => {
        let mut vector = hashed_vector(base);
        vector[0] += 0.05;
        vector
      }
      None => hashed_vector(topic),
    }
  }
}

#[async_trait]
impl Embedder for StubEmbedder {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    self.calls.fetch_add(1, Ordering::SeqCst);
    let topic = topic_of(text);
    if self.failing.contains(topic) {
      return Err(EmbeddingError::RetriesExhausted { attempts: 3, last: "HTTP 503".to_string() });
    }
    Ok(self.vector_for(topic))
  }
}

fn topic_of(text: &str) -> &str {
  let text = text.strip_prefix("Topic: ").unwrap_or(text);
  text.split(". Keywords: ").next().unwrap_or(text)
}

/// Unit-free vector with centered components, so unrelated topics are far from similar
pub fn hashed_vector(topic: &str) -> Vec<f32> {
  let digest = Sha256::digest(topic.as_bytes());
  digest.iter().take(DIMENSION).map(|b| f32::from(*b) - 127.5).collect()
}

pub fn candidate(topic: &str, score: i64) -> TrendCandidate {
  TrendCandidate {
    trend: Trend::new(topic, score),
    category: "ai".to_string(),
    feed_date: feed_date(),
  }
}

pub fn topics(candidates: &[TrendCandidate]) -> Vec<String> {
  candidates.iter().map(|c| c.topic().to_string()).collect()
}

/// Temporary report tree laid out like the real pipeline
pub struct Workspace {
  pub temp: TempDir,
  pub layout: ReportLayout,
}

impl Workspace {
  pub fn new() -> Self {
    let temp = TempDir::new().unwrap();
    let layout = ReportLayout::new(
      temp.path().join("analysis"),
      temp.path().join("dedup"),
      temp.path().join("org"),
    );
    Self { temp, layout }
  }

  pub fn history_dir(&self) -> PathBuf {
    self.temp.path().join("history")
  }

  pub fn write_input(&self, category: &str, trends: Vec<Trend>) -> Vec<u8> {
    let document = TrendDocument::new(feed_date(), category, trends);
    let bytes = render_document(&document).unwrap();
    self.write_raw_input(category, &bytes);
    bytes
  }

  pub fn write_raw_input(&self, category: &str, bytes: &[u8]) {
    let path = self.layout.input_path(feed_date(), category);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, bytes).unwrap();
  }

  pub fn live(&self, category: &str) -> Vec<u8> {
    fs::read(self.layout.input_path(feed_date(), category)).unwrap()
  }

  pub fn archive(&self, category: &str) -> Option<Vec<u8>> {
    fs::read(self.layout.archive_path(feed_date(), category)).ok()
  }

  pub fn output(&self, category: &str) -> Option<TrendDocument> {
    let bytes = fs::read(self.layout.output_path(feed_date(), category)).ok()?;
    Some(serde_json::from_slice(&bytes).unwrap())
  }

  pub fn output_topics(&self, category: &str) -> Vec<String> {
    self
      .output(category)
      .map(|d| d.trends.into_iter().map(|t| t.topic).collect())
      .unwrap_or_default()
  }
}
