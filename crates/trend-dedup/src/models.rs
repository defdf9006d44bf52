//! Trend documents exchanged with the rest of the pipeline

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const MIN_SCORE: i64 = 1;
pub const MAX_SCORE: i64 = 10;

/// A single scored trend as it appears in an analysis report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
  pub topic: String,
  pub reason: String,
  pub score: i64,
  pub links: Vec<String>,
  pub search_keywords: Vec<String>,
  /// Fields added by upstream producers, carried through untouched
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl Trend {
  pub fn new(topic: impl Into<String>, score: i64) -> Self {
    Self {
      topic: topic.into(),
      reason: String::new(),
      score,
      links: Vec::new(),
      search_keywords: Vec::new(),
      extra: Map::new(),
    }
  }

  pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.search_keywords = keywords.into_iter().map(Into::into).collect();
    self
  }
}

/// One category's analysis report for one feed date
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendDocument {
  pub feed_date: NaiveDate,
  pub category: String,
  pub trends: Vec<Trend>,
  #[serde(flatten)]
  pub extra: Map<String, Value>,
}

impl TrendDocument {
  pub fn new(feed_date: NaiveDate, category: impl Into<String>, trends: Vec<Trend>) -> Self {
    Self { feed_date, category: category.into(), trends, extra: Map::new() }
  }

  /// Candidates in document order, each tagged with this document's category and date
  pub fn candidates(&self) -> Vec<TrendCandidate> {
    self
      .trends
      .iter()
      .map(|trend| TrendCandidate {
        trend: trend.clone(),
        category: self.category.clone(),
        feed_date: self.feed_date,
      })
      .collect()
  }

  /// Same document with the trend list replaced, preserving any extra fields
  pub fn with_trends(&self, trends: Vec<Trend>) -> Self {
    Self {
      feed_date: self.feed_date,
      category: self.category.clone(),
      trends,
      extra: self.extra.clone(),
    }
  }

  /// Check scores, returning the first offending topic
  pub fn invalid_score(&self) -> Option<&Trend> {
    self.trends.iter().find(|t| !(MIN_SCORE..=MAX_SCORE).contains(&t.score))
  }
}

/// A trend proposed for publication, not yet checked for novelty
#[derive(Debug, Clone, PartialEq)]
pub struct TrendCandidate {
  pub trend: Trend,
  pub category: String,
  pub feed_date: NaiveDate,
}

impl TrendCandidate {
  pub fn topic(&self) -> &str {
    &self.trend.topic
  }

  pub fn score(&self) -> i64 {
    self.trend.score
  }

  pub fn keywords(&self) -> String {
    self.trend.search_keywords.join(", ")
  }

  /// Text handed to the embedding backend
  pub fn document_text(&self) -> String {
    if self.trend.search_keywords.is_empty() {
      return format!("Topic: {}", self.trend.topic);
    }
    format!("Topic: {}. Keywords: {}", self.trend.topic, self.keywords())
  }
}
