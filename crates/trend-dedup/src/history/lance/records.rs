//! Arrow RecordBatch conversion for history records

use arrow::array::{ArrayRef, FixedSizeListBuilder, Float32Builder, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use std::sync::Arc;

use crate::error::HistoryError;
use crate::history::HistoryRecord;

pub const ID_COLUMN: &str = "id";
pub const DOCUMENT_COLUMN: &str = "document";
pub const TOPIC_COLUMN: &str = "topic";
pub const DATE_COLUMN: &str = "feed_date";
pub const KEYWORDS_COLUMN: &str = "keywords";
pub const CATEGORY_COLUMN: &str = "category";
pub const VECTOR_COLUMN: &str = "vector";

/// Table schema; the vector width is fixed by the first record ever stored
pub fn history_schema(dimension: usize) -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new(ID_COLUMN, DataType::Utf8, false),
    Field::new(DOCUMENT_COLUMN, DataType::Utf8, false),
    Field::new(TOPIC_COLUMN, DataType::Utf8, false),
    Field::new(DATE_COLUMN, DataType::Utf8, false),
    Field::new(KEYWORDS_COLUMN, DataType::Utf8, false),
    Field::new(CATEGORY_COLUMN, DataType::Utf8, false),
    Field::new(
      VECTOR_COLUMN,
      DataType::FixedSizeList(
        Arc::new(Field::new("item", DataType::Float32, true)),
        dimension as i32,
      ),
      false,
    ),
  ]))
}

/// Single-row batch for one record
pub fn record_to_batch(record: &HistoryRecord) -> Result<RecordBatch, HistoryError> {
  let dimension = record.vector.len();
  if dimension == 0 {
    return Err(HistoryError::insert(&record.id, "cannot store an empty vector"));
  }

  let date = record.metadata.date.format("%Y-%m-%d").to_string();
  let string_column = |value: &str| -> ArrayRef { Arc::new(StringArray::from(vec![value])) };

  let mut vectors =
    FixedSizeListBuilder::new(Float32Builder::with_capacity(dimension), dimension as i32);
  vectors.values().append_slice(&record.vector);
  vectors.append(true);

  let columns: Vec<ArrayRef> = vec![
    string_column(&record.id),
    string_column(&record.document),
    string_column(&record.metadata.topic),
    string_column(&date),
    string_column(&record.metadata.keywords),
    string_column(&record.metadata.category),
    Arc::new(vectors.finish()),
  ];

  RecordBatch::try_new(history_schema(dimension), columns)
    .map_err(|e| HistoryError::insert(&record.id, format!("failed to build record batch: {e}")))
}
