//! Per-date batch over every category report
//!
//! Failures stop at the category boundary; sibling categories still run.

use chrono::NaiveDate;
use std::fmt;
use tracing::Instrument;

use crate::dedup::{Deduplicator, RejectionReason, SelectionResult};
use crate::error::{CategoryError, RotationError, RotationFailure, ValidationError};
use crate::io::{read_document, write_document, ReportLayout};
use crate::rotation::{FileRotator, RotationPlan, RotationState};

#[derive(Debug, Clone, PartialEq)]
pub enum CategoryOutcome {
  Processed { selected: usize, duplicates: usize, embedding_failed: usize, history_failed: usize },
  /// Filtered output existed but installing it had not finished
  Resumed,
  /// Already fully processed by an earlier run
  Skipped,
  Failed { error: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryReport {
  pub category: String,
  pub outcome: CategoryOutcome,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
  pub feed_date: NaiveDate,
  pub categories: Vec<CategoryReport>,
}

impl RunSummary {
  pub fn processed(&self) -> usize {
    self.count(|o| matches!(o, CategoryOutcome::Processed { .. } | CategoryOutcome::Resumed))
  }

  pub fn skipped(&self) -> usize {
    self.count(|o| matches!(o, CategoryOutcome::Skipped))
  }

  pub fn failed(&self) -> usize {
    self.count(|o| matches!(o, CategoryOutcome::Failed { .. }))
  }

  pub fn selected(&self) -> usize {
    self.sum(|o| match o {
      CategoryOutcome::Processed { selected, .. } => *selected,
      _ => 0,
    })
  }

  pub fn duplicate_rejected(&self) -> usize {
    self.sum(|o| match o {
      CategoryOutcome::Processed { duplicates, .. } => *duplicates,
      _ => 0,
    })
  }

  pub fn embedding_failed(&self) -> usize {
    self.sum(|o| match o {
      CategoryOutcome::Processed { embedding_failed, .. } => *embedding_failed,
      _ => 0,
    })
  }

  pub fn history_failed(&self) -> usize {
    self.sum(|o| match o {
      CategoryOutcome::Processed { history_failed, .. } => *history_failed,
      _ => 0,
    })
  }

  pub fn outcome(&self, category: &str) -> Option<&CategoryOutcome> {
    self.categories.iter().find(|r| r.category == category).map(|r| &r.outcome)
  }

  fn count(&self, predicate: impl Fn(&CategoryOutcome) -> bool) -> usize {
    self.categories.iter().filter(|r| predicate(&r.outcome)).count()
  }

  fn sum(&self, value: impl Fn(&CategoryOutcome) -> usize) -> usize {
    self.categories.iter().map(|r| value(&r.outcome)).sum()
  }
}

impl fmt::Display for RunSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    writeln!(f, "Deduplication summary for {}", self.feed_date)?;
    for report in &self.categories {
      match &report.outcome {
        CategoryOutcome::Processed { selected, duplicates, embedding_failed, history_failed } => {
          writeln!(
            f,
            "  {:<24} processed: {selected} selected, {duplicates} duplicate, \
             {embedding_failed} embedding-failed, {history_failed} history-unavailable",
            report.category
          )?;
        }
        CategoryOutcome::Resumed => writeln!(f, "  {:<24} rotation resumed", report.category)?,
        CategoryOutcome::Skipped => writeln!(f, "  {:<24} skipped", report.category)?,
        CategoryOutcome::Failed { error } => {
          writeln!(f, "  {:<24} FAILED: {error}", report.category)?
        }
      }
    }
    write!(
      f,
      "processed={} skipped={} duplicate_rejected={} embedding_failed={} failed={}",
      self.processed(),
      self.skipped(),
      self.duplicate_rejected(),
      self.embedding_failed(),
      self.failed()
    )
  }
}

pub struct BatchRunner {
  layout: ReportLayout,
  deduplicator: Deduplicator,
  rotator: FileRotator,
}

impl BatchRunner {
  pub fn new(layout: ReportLayout, deduplicator: Deduplicator) -> Self {
    Self { layout, deduplicator, rotator: FileRotator::new() }
  }

  /// Process every category for `feed_date`, or only `only` when given.
  /// Errors only when the date's input directory cannot be listed.
  pub async fn run(
    &self,
    feed_date: NaiveDate,
    only: Option<&str>,
  ) -> Result<RunSummary, ValidationError> {
    let categories = match only {
      Some(category) => vec![category.to_string()],
      None => self.layout.discover_categories(feed_date).map_err(|source| {
        ValidationError::Read { path: self.layout.analysis_dir.clone(), source }
      })?,
    };

    let mut reports = Vec::with_capacity(categories.len());
    for category in categories {
      let span = tracing::info_span!("category", %category, %feed_date);
      let outcome = match self.process_category(feed_date, &category).instrument(span).await {
        Ok(outcome) => outcome,
        Err(e) => {
          tracing::error!(%category, error = %e, "Category failed");
          CategoryOutcome::Failed { error: e.to_string() }
        }
      };
      reports.push(CategoryReport { category, outcome });
    }

    let summary = RunSummary { feed_date, categories: reports };
    tracing::info!(
      %feed_date,
      processed = summary.processed(),
      skipped = summary.skipped(),
      selected = summary.selected(),
      duplicate_rejected = summary.duplicate_rejected(),
      embedding_failed = summary.embedding_failed(),
      history_unavailable = summary.history_failed(),
      failed = summary.failed(),
      "Run complete"
    );
    Ok(summary)
  }

  async fn process_category(
    &self,
    feed_date: NaiveDate,
    category: &str,
  ) -> Result<CategoryOutcome, CategoryError> {
    let plan = RotationPlan::for_category(&self.layout, feed_date, category);

    if self.layout.output_exists(feed_date, category) {
      return match self.rotator.status(&plan) {
        RotationState::Done => {
          tracing::info!(output = %plan.filtered.display(), "Already deduplicated, skipping");
          Ok(CategoryOutcome::Skipped)
        }
        RotationState::Failed => Err(CategoryError::Rotation(RotationFailure {
          reached: RotationState::Archived,
          source: RotationError::LiveInvalid {
            path: plan.original.clone(),
            message: "cannot tell whether the filtered report was installed".to_string(),
          },
        })),
        state => {
          tracing::info!(%state, "Filtered output exists, resuming rotation");
          self.rotator.rotate(&plan)?;
          Ok(CategoryOutcome::Resumed)
        }
      };
    }

    let document = read_document(&plan.original, feed_date, category)?;
    let candidates = document.candidates();
    let result = self.deduplicator.select(&candidates).await;
    // Nothing was embedded: keep the live report so a later run can retry
    if let Some(error) = backend_outage(candidates.len(), &result) {
      return Err(error);
    }

    let filtered = document.with_trends(result.selected_trends());
    write_document(&plan.filtered, &filtered)?;
    self.rotator.rotate(&plan)?;

    Ok(CategoryOutcome::Processed {
      selected: result.selected.len(),
      duplicates: result.duplicates(),
      embedding_failed: result.embedding_failures(),
      history_failed: result.history_failures(),
    })
  }
}

fn backend_outage(candidates: usize, result: &SelectionResult) -> Option<CategoryError> {
  if candidates == 0 || result.embedding_failures() < candidates {
    return None;
  }
  let last = result
    .rejected
    .iter()
    .rev()
    .find_map(|r| match &r.reason {
      RejectionReason::EmbeddingFailed { message } => Some(message.clone()),
      _ => None,
    })
    .unwrap_or_default();
  Some(CategoryError::Embedding { attempted: candidates, last })
}
