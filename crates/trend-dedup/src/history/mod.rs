//! History of accepted topics, searchable by vector similarity
//!
//! The store is injected wherever it is used; there is no process-wide
//! instance. Records are never deleted: the lookback window is applied at
//! query time through [`HistoryFilter`].

mod json;
#[cfg(feature = "lance-store")]
pub mod lance;
mod memory;
pub mod similarity;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use crate::error::{ConfigError, HistoryError};
use crate::models::TrendCandidate;

pub use json::JsonHistoryStore;
pub use memory::MemoryHistoryStore;

const TOPIC_HASH_CHARS: usize = 16;

/// Descriptive fields stored next to each vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryMetadata {
  pub topic: String,
  pub date: NaiveDate,
  pub keywords: String,
  pub category: String,
}

/// A previously accepted topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
  pub id: String,
  pub document: String,
  pub vector: Vec<f32>,
  pub metadata: HistoryMetadata,
}

impl HistoryRecord {
  /// Record for an accepted candidate and its embedding
  pub fn from_candidate(candidate: &TrendCandidate, vector: Vec<f32>) -> Self {
    Self {
      id: record_id(&candidate.category, candidate.feed_date, candidate.topic()),
      document: candidate.document_text(),
      vector,
      metadata: HistoryMetadata {
        topic: candidate.topic().to_string(),
        date: candidate.feed_date,
        keywords: candidate.keywords(),
        category: candidate.category.clone(),
      },
    }
  }
}

/// Deterministic id: the same topic accepted twice for a category/date maps to one record
pub fn record_id(category: &str, date: NaiveDate, topic: &str) -> String {
  let digest = Sha256::digest(topic.as_bytes());
  let hash: String = digest.iter().map(|b| format!("{b:02x}")).collect();
  format!("{}|{category}|{}", date.format("%Y-%m-%d"), &hash[..TOPIC_HASH_CHARS])
}

/// Scope of a similarity query
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryFilter {
  pub category: String,
  /// Oldest record date still considered
  pub since: NaiveDate,
}

impl HistoryFilter {
  pub fn matches(&self, metadata: &HistoryMetadata) -> bool {
    metadata.category == self.category && metadata.date >= self.since
  }
}

/// A stored record close to the query vector
#[derive(Debug, Clone, PartialEq)]
pub struct SimilarityMatch {
  pub id: String,
  pub metadata: HistoryMetadata,
  /// Cosine similarity in [-1, 1]
  pub similarity: f32,
}

/// Durable vector index of accepted topics
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryStore: Send + Sync {
  /// Upsert by id; inserting an existing id leaves the store unchanged
  async fn insert(&self, record: &HistoryRecord) -> Result<(), HistoryError>;

  /// Up to `top_k` records inside `filter`, most similar first
  async fn query(
    &self,
    vector: &[f32],
    filter: &HistoryFilter,
    top_k: usize,
  ) -> Result<Vec<SimilarityMatch>, HistoryError>;

  async fn count(&self) -> Result<usize, HistoryError>;
}

/// Durable storage engines
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryBackend {
  /// LanceDB table with the filter pushed into the vector query
  Lance,
  /// JSON document with application-side filtering, for small collections
  Json,
}

impl Default for HistoryBackend {
  fn default() -> Self {
    if cfg!(feature = "lance-store") {
      Self::Lance
    } else {
      Self::Json
    }
  }
}

impl fmt::Display for HistoryBackend {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Lance => f.write_str("lancedb"),
      Self::Json => f.write_str("json"),
    }
  }
}

impl FromStr for HistoryBackend {
  type Err = ConfigError;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    match value.trim().to_lowercase().as_str() {
      "lancedb" | "lance" if cfg!(feature = "lance-store") => Ok(Self::Lance),
      "lancedb" | "lance" => Err(ConfigError::feature_disabled(value, "lance-store")),
      "json" => Ok(Self::Json),
      _ => Err(ConfigError::unsupported("history backend", value, "lancedb, json")),
    }
  }
}

#[derive(Debug, Clone)]
pub struct HistorySettings {
  pub backend: HistoryBackend,
  pub directory: PathBuf,
  pub collection: String,
}

/// Open the configured store; failure here aborts the run
pub async fn open_store(settings: &HistorySettings) -> Result<Arc<dyn HistoryStore>, ConfigError> {
  let init_error = |e: HistoryError| ConfigError::initialization("history store", e.to_string());

  let store: Arc<dyn HistoryStore> = match settings.backend {
    #[cfg(feature = "lance-store")]
    HistoryBackend::Lance => Arc::new(
      lance::LanceHistoryStore::open(&settings.directory, &settings.collection)
        .await
        .map_err(init_error)?,
    ),
    #[cfg(not(feature = "lance-store"))]
    HistoryBackend::Lance => return Err(ConfigError::feature_disabled("lancedb", "lance-store")),
    HistoryBackend::Json => Arc::new(
      JsonHistoryStore::open(&settings.directory, &settings.collection).map_err(init_error)?,
    ),
  };

  tracing::info!(
    backend = %settings.backend,
    directory = %settings.directory.display(),
    collection = %settings.collection,
    "History store opened"
  );
  Ok(store)
}
