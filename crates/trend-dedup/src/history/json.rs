use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::similarity::rank;
use super::{HistoryFilter, HistoryRecord, HistoryStore, SimilarityMatch};
use crate::error::HistoryError;
use crate::io::write_atomic;

/// Single-file store at `<directory>/<collection>.json`, rewritten whole on every insert
#[derive(Debug)]
pub struct JsonHistoryStore {
  path: PathBuf,
  records: Mutex<Vec<HistoryRecord>>,
}

impl JsonHistoryStore {
  pub fn open(directory: &Path, collection: &str) -> Result<Self, HistoryError> {
    fs::create_dir_all(directory).map_err(|e| HistoryError::open(directory, e.to_string()))?;
    let path = directory.join(format!("{collection}.json"));

    let records = if path.exists() {
      let bytes = fs::read(&path).map_err(|e| HistoryError::open(&path, e.to_string()))?;
      serde_json::from_slice::<Vec<HistoryRecord>>(&bytes)
        .map_err(|e| HistoryError::Corrupt { path: path.clone(), message: e.to_string() })?
    } else {
      Vec::new()
    };

    tracing::debug!(path = %path.display(), records = records.len(), "Loaded JSON history");
    Ok(Self { path, records: Mutex::new(records) })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

#[async_trait]
impl HistoryStore for JsonHistoryStore {
  async fn insert(&self, record: &HistoryRecord) -> Result<(), HistoryError> {
    let mut records =
      self.records.lock().map_err(|_| HistoryError::insert(&record.id, "store lock poisoned"))?;
    if records.iter().any(|existing| existing.id == record.id) {
      tracing::debug!(id = %record.id, "Record already in history");
      return Ok(());
    }

    records.push(record.clone());
    let persisted = serde_json::to_vec(&*records)
      .map_err(|e| HistoryError::insert(&record.id, e.to_string()))
      .and_then(|bytes| {
        write_atomic(&self.path, &bytes)
          .map_err(|e| HistoryError::insert(&record.id, e.to_string()))
      });

    if let Err(e) = persisted {
      records.pop();
      return Err(e);
    }
    Ok(())
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
