//! LanceDB-backed history
//!
//! The table is created lazily by the first insert, since its vector width
//! is only known once an embedding exists. Until then queries return nothing.

mod records;
mod search;

use arrow::record_batch::RecordBatchIterator;
use async_trait::async_trait;
use lancedb::{Connection, Table};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::{HistoryFilter, HistoryRecord, HistoryStore, SimilarityMatch};
use crate::error::HistoryError;

pub struct LanceHistoryStore {
  connection: Connection,
  path: PathBuf,
  table_name: String,
  table: Mutex<Option<Table>>,
}

impl LanceHistoryStore {
  /// Connect to the database directory, creating it if needed
  pub async fn open(directory: &Path, table_name: &str) -> Result<Self, HistoryError> {
    std::fs::create_dir_all(directory).map_err(|e| HistoryError::open(directory, e.to_string()))?;

    let connection = lancedb::connect(&directory.to_string_lossy())
      .execute()
      .await
      .map_err(|e| HistoryError::open(directory, format!("failed to connect to LanceDB: {e}")))?;

    let store = Self {
      connection,
      path: directory.to_path_buf(),
      table_name: table_name.to_string(),
      table: Mutex::new(None),
    };
    store.table().await?;
    Ok(store)
  }

  /// The table, if it has been created yet
  async fn table(&self) -> Result<Option<Table>, HistoryError> {
    let mut cached = self.table.lock().await;
    if cached.is_none() {
      let names = self
        .connection
        .table_names()
        .execute()
        .await
        .map_err(|e| HistoryError::open(&self.path, format!("failed to list tables: {e}")))?;

      if names.contains(&self.table_name) {
        let table =
          self.connection.open_table(&self.table_name).execute().await.map_err(|e| {
            HistoryError::open(&self.path, format!("failed to open '{}': {e}", self.table_name))
          })?;
        *cached = Some(table);
      }
    }
    Ok(cached.clone())
  }

  async fn create_table(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
    let batch = records::record_to_batch(record)?;
    let schema = batch.schema();
    let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

    let table = self
      .connection
      .create_table(&self.table_name, batches)
      .execute()
      .await
      .map_err(|e| HistoryError::insert(&record.id, format!("failed to create table: {e}")))?;

    tracing::info!(
      table = %self.table_name,
      dimension = record.vector.len(),
      "Created history table"
    );
    *self.table.lock().await = Some(table);
    Ok(())
  }
}

#[async_trait]
impl HistoryStore for LanceHistoryStore {
  async fn insert(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
    let Some(table) = self.table().await? else {
      return self.create_table(record).await;
    };

    let batch = records::record_to_batch(record)?;
    let schema = batch.schema();
    let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

    let mut merge = table.merge_insert(&[records::ID_COLUMN]);
    merge.when_not_matched_insert_all();
    merge
      .execute(Box::new(batches))
      .await
      .map_err(|e| HistoryError::insert(&record.id, e.to_string()))?;

    tracing::debug!(id = %record.id, "Stored history record");
    Ok(())
  }

  async fn query(
    &self,
    vector: &[f32],
    filter: &HistoryFilter,
    top_k: usize,
  ) -> Result<Vec<SimilarityMatch>, HistoryError> {
    match self.table().await? {
      Some(table) if top_k > 0 => search::search(&table, vector, filter, top_k).await,
      _ => Ok(Vec::new()),
    }
  }

  async fn count(&self) -> Result<usize, HistoryError> {
    match self.table().await? {
      Some(table) => table
        .count_rows(None)
        .await
        .map_err(|e| HistoryError::query(format!("failed to count rows: {e}"))),
      None => Ok(0),
    }
  }
}
