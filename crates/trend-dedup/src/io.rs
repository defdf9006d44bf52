//! Report file layout and document persistence

use chrono::NaiveDate;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::error::ValidationError;
use crate::models::TrendDocument;

/// Directory layout shared with the upstream analysis and downstream publishing steps
#[derive(Debug, Clone)]
pub struct ReportLayout {
  /// Live analysis reports, consumed downstream
  pub analysis_dir: PathBuf,
  /// Filtered reports written by this tool; doubles as the idempotency marker
  pub dedup_dir: PathBuf,
  /// Untouched copies of the original analysis reports
  pub archive_dir: PathBuf,
}

impl ReportLayout {
  pub fn new(
    analysis_dir: impl Into<PathBuf>,
    dedup_dir: impl Into<PathBuf>,
    archive_dir: impl Into<PathBuf>,
  ) -> Self {
    Self {
      analysis_dir: analysis_dir.into(),
      dedup_dir: dedup_dir.into(),
      archive_dir: archive_dir.into(),
    }
  }

  pub fn input_path(&self, feed_date: NaiveDate, category: &str) -> PathBuf {
    category_path(&self.analysis_dir, feed_date, category)
  }

  pub fn output_path(&self, feed_date: NaiveDate, category: &str) -> PathBuf {
    category_path(&self.dedup_dir, feed_date, category)
  }

  pub fn archive_path(&self, feed_date: NaiveDate, category: &str) -> PathBuf {
    category_path(&self.archive_dir, feed_date, category)
  }

  pub fn output_exists(&self, feed_date: NaiveDate, category: &str) -> bool {
    self.output_path(feed_date, category).exists()
  }

  /// Category names with an analysis report for the given date, sorted
  pub fn discover_categories(&self, feed_date: NaiveDate) -> std::io::Result<Vec<String>> {
    let date_dir = self.analysis_dir.join(date_dir_name(feed_date));
    if !date_dir.exists() {
      tracing::warn!(dir = %date_dir.display(), "No analysis directory for feed date");
      return Ok(Vec::new());
    }

    let mut categories = Vec::new();
    for entry in fs::read_dir(&date_dir)? {
      let path = entry?.path();
      if path.extension().and_then(|s| s.to_str()) != Some("json") {
        continue;
      }
      if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
        categories.push(stem.to_string());
      }
    }

    categories.sort();
    tracing::info!(count = categories.len(), %feed_date, "Discovered categories");
    Ok(categories)
  }
}

fn date_dir_name(feed_date: NaiveDate) -> String {
  feed_date.format("%Y-%m-%d").to_string()
}

fn category_path(base: &Path, feed_date: NaiveDate, category: &str) -> PathBuf {
  base.join(date_dir_name(feed_date)).join(format!("{category}.json"))
}

/// Parse a report without checking it against its location
pub fn parse_document(path: &Path, bytes: &[u8]) -> Result<TrendDocument, ValidationError> {
  let document: TrendDocument = serde_json::from_slice(bytes)
    .map_err(|source| ValidationError::Parse { path: path.to_path_buf(), source })?;

  if let Some(trend) = document.invalid_score() {
    return Err(ValidationError::invalid(
      path,
      format!("score {} for '{}' is outside 1..=10", trend.score, trend.topic),
    ));
  }

  Ok(document)
}

/// Load and validate the analysis report for a category
pub fn read_document(
  path: &Path,
  feed_date: NaiveDate,
  category: &str,
) -> Result<TrendDocument, ValidationError> {
  if !path.exists() {
    return Err(ValidationError::NotFound { path: path.to_path_buf() });
  }

  let bytes =
    fs::read(path).map_err(|source| ValidationError::Read { path: path.to_path_buf(), source })?;
  let document = parse_document(path, &bytes)?;

  if document.category != category {
    return Err(ValidationError::invalid(
      path,
      format!("category '{}' does not match file name '{category}'", document.category),
    ));
  }
  if document.feed_date != feed_date {
    return Err(ValidationError::invalid(
      path,
      format!("feed_date {} does not match directory {feed_date}", document.feed_date),
    ));
  }

  tracing::info!(
    category,
    %feed_date,
    trends = document.trends.len(),
    "Read analysis report"
  );
  Ok(document)
}

/// Serialize a report the way downstream consumers expect it
pub fn render_document(document: &TrendDocument) -> Result<Vec<u8>, serde_json::Error> {
  let mut json = serde_json::to_vec_pretty(document)?;
  json.push(b'\n');
  Ok(json)
}

/// Write the filtered report; readers never observe a partial file
pub fn write_document(path: &Path, document: &TrendDocument) -> Result<(), ValidationError> {
  let json = render_document(document).map_err(|e| ValidationError::write(path, e.to_string()))?;
  write_atomic(path, &json).map_err(|e| ValidationError::write(path, e.to_string()))?;

  tracing::info!(path = %path.display(), trends = document.trends.len(), "Wrote filtered report");
  Ok(())
}

/// Replace `path` with `bytes` via a synced temp file renamed over the target
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
  let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
  fs::create_dir_all(parent)?;

  let mut temp = NamedTempFile::new_in(parent)?;
  temp.write_all(bytes)?;
  temp.as_file().sync_all()?;
  temp.persist(path).map_err(|e| e.error)?;
  Ok(())
}
