//! Vector search and result decoding

use arrow::array::{Array, Float32Array, StringArray};
use arrow::record_batch::RecordBatch;
use chrono::NaiveDate;
use futures::stream::StreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::{DistanceType, Table};

use super::records::{
  CATEGORY_COLUMN, DATE_COLUMN, ID_COLUMN, KEYWORDS_COLUMN, TOPIC_COLUMN, VECTOR_COLUMN,
};
use crate::error::HistoryError;
use crate::history::{HistoryFilter, HistoryMetadata, SimilarityMatch};

const DISTANCE_COLUMN: &str = "_distance";

/// Nearest records under cosine distance, filtered inside the query
pub async fn search(
  table: &Table,
  vector: &[f32],
  filter: &HistoryFilter,
  top_k: usize,
) -> Result<Vec<SimilarityMatch>, HistoryError> {
  let predicate = filter_predicate(filter);
  tracing::debug!(%predicate, top_k, "Running vector search");

  let mut stream = table
    .vector_search(vector)
    .map_err(|e| HistoryError::query(format!("invalid query vector: {e}")))?
    .column(VECTOR_COLUMN)
    .distance_type(DistanceType::Cosine)
    .only_if(predicate)
    .limit(top_k)
    .execute()
    .await
    .map_err(|e| HistoryError::query(format!("vector search failed: {e}")))?;

  let mut matches = Vec::new();
  while let Some(batch) = stream.next().await {
    let batch = batch.map_err(|e| HistoryError::query(format!("error reading batch: {e}")))?;
    matches.extend(decode_batch(&batch)?);
  }

  matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
  matches.truncate(top_k);
  Ok(matches)
}

/// SQL predicate for the category and lookback window
fn filter_predicate(filter: &HistoryFilter) -> String {
  format!(
    "{CATEGORY_COLUMN} = '{}' AND {DATE_COLUMN} >= '{}'",
    escape_literal(&filter.category),
    filter.since.format("%Y-%m-%d")
  )
}

fn escape_literal(value: &str) -> String {
  value.replace('\'', "''")
}

/// Cosine distance is `1 - cos`, so similarity is recovered directly
fn distance_to_similarity(distance: f32) -> f32 {
  (1.0 - distance).clamp(-1.0, 1.0)
}

fn decode_batch(batch: &RecordBatch) -> Result<Vec<SimilarityMatch>, HistoryError> {
  let ids = string_column(batch, ID_COLUMN)?;
  let topics = string_column(batch, TOPIC_COLUMN)?;
  let dates = string_column(batch, DATE_COLUMN)?;
  let keywords = string_column(batch, KEYWORDS_COLUMN)?;
  let categories = string_column(batch, CATEGORY_COLUMN)?;
  let distances = batch
    .column_by_name(DISTANCE_COLUMN)
    .and_then(|col| col.as_any().downcast_ref::<Float32Array>())
    .ok_or_else(|| HistoryError::query(format!("missing '{DISTANCE_COLUMN}' column")))?;

  let mut matches = Vec::with_capacity(batch.num_rows());
  for row in 0..batch.num_rows() {
    if distances.is_null(row) {
      continue;
    }
    let date = NaiveDate::parse_from_str(dates.value(row), "%Y-%m-%d")
      .map_err(|e| HistoryError::query(format!("bad stored date '{}': {e}", dates.value(row))))?;

    matches.push(SimilarityMatch {
      id: ids.value(row).to_string(),
      metadata: HistoryMetadata {
        topic: topics.value(row).to_string(),
        date,
        keywords: keywords.value(row).to_string(),
        category: categories.value(row).to_string(),
      },
      similarity: distance_to_similarity(distances.value(row)),
    });
  }
  Ok(matches)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray, HistoryError> {
  batch
    .column_by_name(name)
    .ok_or_else(|| HistoryError::query(format!("missing '{name}' column")))?
    .as_any()
    .downcast_ref::<StringArray>()
    .ok_or_else(|| HistoryError::query(format!("column '{name}' is not a string column")))
}
