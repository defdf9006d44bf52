use async_trait::async_trait;
use std::sync::Mutex;

use super::similarity::rank;
use super::{HistoryFilter, HistoryRecord, HistoryStore, SimilarityMatch};
use crate::error::HistoryError;

/// Process-local store. Nothing survives a restart, so it is only suitable for tests.
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
  records: Mutex<Vec<HistoryRecord>>,
}

impl MemoryHistoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_records(records: Vec<HistoryRecord>) -> Self {
    let store = Self::new();
    for record in records {
      let _ = store.upsert(record);
    }
    store
  }

  pub fn records(&self) -> Vec<HistoryRecord> {
    self.records.lock().map(|r| r.clone()).unwrap_or_default()
  }

  fn upsert(&self, record: HistoryRecord) -> Result<bool, HistoryError> {
    let mut records =
      self.records.lock().map_err(|_| HistoryError::insert(&record.id, "store lock poisoned"))?;
    if records.iter().any(|existing| existing.id == record.id) {
      return Ok(false);
    }
    records.push(record);
    Ok(true)
  }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
  async fn insert(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
    self.upsert(record.clone()).map(|_| ())
  }

  async fn query(
    &self,
    vector: &[f32],
    filter: &HistoryFilter,
    top_k: usize,
  ) -> Result<Vec<SimilarityMatch>, HistoryError> {
    let records = self.records.lock().map_err(|_| HistoryError::query("store lock poisoned"))?;
    Ok(rank(records.iter(), vector, filter, top_k))
  }

  async fn count(&self) -> Result<usize, HistoryError> {
    let records = self.records.lock().map_err(|_| HistoryError::query("store lock poisoned"))?;
    Ok(records.len())
  }
}
