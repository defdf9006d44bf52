//! Novelty selection for one category's candidates
//!
//! Candidates are evaluated highest score first. Each accepted candidate is
//! written to history before the next one is looked at, so near-duplicates
//! inside one batch see each other.

use chrono::{Days, NaiveDate};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use crate::embeddings::Embedder;
use crate::history::{record_id, HistoryFilter, HistoryRecord, HistoryStore, SimilarityMatch};
use crate::models::{Trend, TrendCandidate};

/// Own record plus the best competing match
const QUERY_TOP_K: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupSettings {
  /// Upper bound on selected topics per category
  pub target_count: usize,
  /// Similarity strictly above this marks a duplicate
  pub similarity_threshold: f32,
  pub lookback_days: u32,
}

impl DedupSettings {
  /// Oldest history date considered for a feed date
  pub fn window_start(&self, feed_date: NaiveDate) -> NaiveDate {
    feed_date.checked_sub_days(Days::new(u64::from(self.lookback_days))).unwrap_or(NaiveDate::MIN)
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RejectionReason {
  Duplicate { matched_id: String, matched_topic: String, similarity: f32 },
  EmbeddingFailed { message: String },
  HistoryUnavailable { message: String },
}

impl fmt::Display for RejectionReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Duplicate { .. } => f.write_str("duplicate"),
      Self::EmbeddingFailed { .. } => f.write_str("embedding-failed"),
      Self::HistoryUnavailable { .. } => f.write_str("history-unavailable"),
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
  pub candidate: TrendCandidate,
  pub reason: RejectionReason,
}

/// Outcome of one selection pass. Candidates never evaluated, because the
/// target was reached first, appear in neither list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionResult {
  pub selected: Vec<TrendCandidate>,
  pub rejected: Vec<Rejection>,
}

impl SelectionResult {
  pub fn selected_trends(&self) -> Vec<Trend> {
    self.selected.iter().map(|c| c.trend.clone()).collect()
  }

  pub fn selected_topics(&self) -> Vec<&str> {
    self.selected.iter().map(|c| c.topic()).collect()
  }

  pub fn duplicates(&self) -> usize {
    self.count(|r| matches!(r, RejectionReason::Duplicate { .. }))
  }

  pub fn embedding_failures(&self) -> usize {
    self.count(|r| matches!(r, RejectionReason::EmbeddingFailed { .. }))
  }

  pub fn history_failures(&self) -> usize {
    self.count(|r| matches!(r, RejectionReason::HistoryUnavailable { .. }))
  }

  fn count(&self, predicate: impl Fn(&RejectionReason) -> bool) -> usize {
    self.rejected.iter().filter(|r| predicate(&r.reason)).count()
  }
}

enum Verdict {
  Accept,
  Reject(RejectionReason),
}

pub struct Deduplicator {
  embedder: Arc<dyn Embedder>,
  history: Arc<dyn HistoryStore>,
  settings: DedupSettings,
}

impl Deduplicator {
  pub fn new(
    embedder: Arc<dyn Embedder>,
    history: Arc<dyn HistoryStore>,
    settings: DedupSettings,
  ) -> Self {
    Self { embedder, history, settings }
  }

  /// Pick up to `target_count` candidates that are not near-duplicates of history
  pub async fn select(&self, candidates: &[TrendCandidate]) -> SelectionResult {
    let mut result = SelectionResult::default();
    if self.settings.target_count == 0 || candidates.is_empty() {
      tracing::info!(
        candidates = candidates.len(),
        target_count = self.settings.target_count,
        "Nothing to select"
      );
      return result;
    }

    let mut ordered: Vec<&TrendCandidate> = candidates.iter().collect();
    ordered.sort_by(|a, b| b.score().cmp(&a.score()));

    let mut accepted_ids = HashSet::new();
    for candidate in ordered {
      if result.selected.len() >= self.settings.target_count {
        break;
      }

      match self.evaluate(candidate, &mut accepted_ids).await {
        Verdict::Accept => result.selected.push(candidate.clone()),
        Verdict::Reject(reason) => {
          result.rejected.push(Rejection { candidate: candidate.clone(), reason })
        }
      }
    }

    tracing::info!(
      selected = result.selected.len(),
      duplicates = result.duplicates(),
      embedding_failed = result.embedding_failures(),
      history_unavailable = result.history_failures(),
      target_count = self.settings.target_count,
      "Selection finished"
    );
    result
  }

  async fn evaluate(
    &self,
    candidate: &TrendCandidate,
    accepted_ids: &mut HashSet<String>,
  ) -> Verdict {
    let topic = candidate.topic();
    let score = candidate.score();
    let category = candidate.category.as_str();

    let vector = match self.embedder.embed(&candidate.document_text()).await {
      Ok(vector) => vector,
      Err(e) => {
        tracing::error!(
          topic,
          score,
          category,
          error = %e,
          "Embedding failed, skipping candidate"
        );
        return Verdict::Reject(RejectionReason::EmbeddingFailed { message: e.to_string() });
      }
    };

    let own_id = record_id(category, candidate.feed_date, topic);
    let filter = HistoryFilter {
      category: category.to_string(),
      since: self.settings.window_start(candidate.feed_date),
    };

    let matches = match self.history.query(&vector, &filter, QUERY_TOP_K).await {
      Ok(matches) => matches,
      Err(e) => {
        tracing::error!(
          topic,
          score,
          category,
          error = %e,
          "History query failed, skipping candidate"
        );
        return Verdict::Reject(RejectionReason::HistoryUnavailable { message: e.to_string() });
      }
    };

    if let Some(found) = self.competing_match(matches, &own_id, accepted_ids) {
      if found.similarity > self.settings.similarity_threshold {
        tracing::info!(
          topic,
          score,
          category,
          matched_topic = %found.metadata.topic,
          matched_date = %found.metadata.date,
          similarity = found.similarity,
          threshold = self.settings.similarity_threshold,
          "Rejected duplicate"
        );
        return Verdict::Reject(RejectionReason::Duplicate {
          matched_id: found.id,
          matched_topic: found.metadata.topic,
          similarity: found.similarity,
        });
      }
    }

    let record = HistoryRecord::from_candidate(candidate, vector);
    if let Err(e) = self.history.insert(&record).await {
      tracing::error!(
        topic,
        score,
        category,
        error = %e,
        "History insert failed, skipping candidate"
      );
      return Verdict::Reject(RejectionReason::HistoryUnavailable { message: e.to_string() });
    }

    accepted_ids.insert(own_id);
    tracing::info!(topic, score, category, "Accepted");
    Verdict::Accept
  }

  /// Best match other than the candidate's own record from an earlier run.
  /// A record accepted earlier in this batch is a real competitor.
  fn competing_match(
    &self,
    matches: Vec<SimilarityMatch>,
    own_id: &str,
    accepted_ids: &HashSet<String>,
  ) -> Option<SimilarityMatch> {
    matches.into_iter().find(|m| {
      let previous_run = m.id == own_id && !accepted_ids.contains(own_id);
      if previous_run {
        tracing::debug!(id = %m.id, "Candidate already recorded by an earlier run");
      }
      !previous_run
    })
  }
}
