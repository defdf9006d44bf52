//! Error taxonomy for the deduplication pipeline
//!
//! Each enum matches one failure boundary: configuration errors abort the run,
//! validation and rotation errors fail a single category, embedding and
//! history errors fail a single candidate.

use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::rotation::RotationState;

/// Fatal configuration problems. The only errors that reach process exit.
#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("Configuration file not found: {path}")]
  NotFound { path: PathBuf },

  #[error("Configuration file is empty: {path}")]
  Empty { path: PathBuf },

  #[error("Invalid configuration in {path}: {message}")]
  Invalid { path: PathBuf, message: String },

  #[error("Invalid value for {key}: {message}")]
  InvalidValue { key: String, message: String },

  #[error("{variable} not found in environment (required by the {provider} embedding provider)")]
  MissingCredential { provider: String, variable: String },

  #[error("Unsupported {kind}: '{value}'. Supported: {supported}")]
  Unsupported { kind: String, value: String, supported: String },

  #[error("'{value}' requires the '{feature}' feature, which this build does not include")]
  FeatureDisabled { value: String, feature: String },

  #[error("Failed to initialize {component}: {message}")]
  Initialization { component: String, message: String },
}

impl ConfigError {
  pub fn invalid(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
    Self::Invalid { path: path.into(), message: message.into() }
  }

  pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
    Self::InvalidValue { key: key.into(), message: message.into() }
  }

  pub fn missing_credential(provider: impl Into<String>, variable: impl Into<String>) -> Self {
    Self::MissingCredential { provider: provider.into(), variable: variable.into() }
  }

  pub fn unsupported(
    kind: impl Into<String>,
    value: impl Into<String>,
    supported: impl Into<String>,
  ) -> Self {
    Self::Unsupported { kind: kind.into(), value: value.into(), supported: supported.into() }
  }

  pub fn feature_disabled(value: impl Into<String>, feature: impl Into<String>) -> Self {
    Self::FeatureDisabled { value: value.into(), feature: feature.into() }
  }

  pub fn initialization(component: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Initialization { component: component.into(), message: message.into() }
  }
}

/// A malformed or unreadable input document
#[derive(Error, Debug)]
pub enum ValidationError {
  #[error("Input file not found: {path}")]
  NotFound { path: PathBuf },

  #[error("Failed to read {path}: {source}")]
  Read { path: PathBuf, source: std::io::Error },

  #[error("Invalid JSON in {path}: {source}")]
  Parse { path: PathBuf, source: serde_json::Error },

  #[error("Invalid document {path}: {message}")]
  Invalid { path: PathBuf, message: String },

  #[error("Failed to write {path}: {message}")]
  Write { path: PathBuf, message: String },
}

impl ValidationError {
  pub fn invalid(path: &Path, message: impl Into<String>) -> Self {
    Self::Invalid { path: path.to_path_buf(), message: message.into() }
  }

  pub fn write(path: &Path, message: impl Into<String>) -> Self {
    Self::Write { path: path.to_path_buf(), message: message.into() }
  }
}

/// Embedding backend failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
  /// Timeouts, connection failures, rate limiting and server errors
  #[error("Transient embedding failure: {message}")]
  Transient { message: String },

  #[error("Embedding request rejected with status {status}: {message}")]
  Rejected { status: u16, message: String },

  #[error("Invalid embedding response: {message}")]
  InvalidResponse { message: String },

  #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
  DimensionMismatch { expected: usize, actual: usize },

  #[error("Embedding failed after {attempts} attempts: {last}")]
  RetriesExhausted { attempts: usize, last: String },

  #[error("Failed to load embedding model: {message}")]
  ModelLoad { message: String },

  #[error("Embedding inference failed: {message}")]
  Inference { message: String },
}

impl EmbeddingError {
  pub fn transient(message: impl Into<String>) -> Self {
    Self::Transient { message: message.into() }
  }

  pub fn rejected(status: u16, message: impl Into<String>) -> Self {
    Self::Rejected { status, message: message.into() }
  }

  pub fn invalid_response(message: impl Into<String>) -> Self {
    Self::InvalidResponse { message: message.into() }
  }

  pub fn model_load(message: impl Into<String>) -> Self {
    Self::ModelLoad { message: message.into() }
  }

  pub fn inference(message: impl Into<String>) -> Self {
    Self::Inference { message: message.into() }
  }

  /// Whether the fixed retry schedule applies to this failure
  pub fn is_transient(&self) -> bool {
    matches!(self, Self::Transient { .. })
  }
}

/// History store failures
#[derive(Error, Debug)]
pub enum HistoryError {
  #[error("Failed to open history store at {path}: {message}")]
  Open { path: PathBuf, message: String },

  #[error("History query failed: {message}")]
  Query { message: String },

  #[error("History insert failed for {id}: {message}")]
  Insert { id: String, message: String },

  #[error("Corrupt history store {path}: {message}")]
  Corrupt { path: PathBuf, message: String },
}

impl HistoryError {
  pub fn open(path: &Path, message: impl Into<String>) -> Self {
    Self::Open { path: path.to_path_buf(), message: message.into() }
  }

  pub fn query(message: impl Into<String>) -> Self {
    Self::Query { message: message.into() }
  }

  pub fn insert(id: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Insert { id: id.into(), message: message.into() }
  }
}

/// Archive/install lifecycle failures
#[derive(Error, Debug)]
pub enum RotationError {
  #[error("Filtered output {path} is missing or invalid: {message}")]
  InvalidFiltered { path: PathBuf, message: String },

  #[error("Original input {path} is missing")]
  OriginalMissing { path: PathBuf },

  #[error(
    "Archive {archive} already exists with content different from {original}; refusing to overwrite"
  )]
  ArchiveConflict { archive: PathBuf, original: PathBuf },

  #[error("Live report {path} is unreadable or invalid after archiving: {message}")]
  LiveInvalid { path: PathBuf, message: String },

  #[error("I/O failure on {path}: {source}")]
  Io { path: PathBuf, source: std::io::Error },
}

impl RotationError {
  pub fn io(path: &Path, source: std::io::Error) -> Self {
    Self::Io { path: path.to_path_buf(), source }
  }
}

/// A rotation that stopped early, with the last state it reached
#[derive(Error, Debug)]
#[error("{source} (rotation stopped at '{reached}')")]
pub struct RotationFailure {
  pub reached: RotationState,
  pub source: RotationError,
}

/// Everything that can fail a single category
#[derive(Error, Debug)]
pub enum CategoryError {
  #[error(transparent)]
  Validation(#[from] ValidationError),

  #[error(transparent)]
  Rotation(#[from] RotationFailure),

  #[error("Embedding backend unavailable: all {attempted} candidates failed to embed ({last})")]
  Embedding { attempted: usize, last: String },
}
