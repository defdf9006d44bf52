//! Trend Dedup - semantic novelty filter for daily trend reports
//!
//! Reads each category's scored trend candidates, drops the ones that are
//! near-duplicates of topics published within the lookback window, records
//! the survivors in a vector history and swaps the filtered report into place.

pub mod config;
pub mod dedup;
pub mod embeddings;
pub mod error;
pub mod history;
pub mod io;
pub mod logging;
pub mod models;
pub mod rotation;
pub mod runner;

pub use config::Config;
pub use dedup::{DedupSettings, Deduplicator, Rejection, RejectionReason, SelectionResult};
pub use embeddings::{Embedder, EmbeddingProvider};
pub use history::{HistoryStore, MemoryHistoryStore};
pub use models::{Trend, TrendCandidate, TrendDocument};
pub use rotation::{FileRotator, RotationPlan, RotationState};
pub use runner::{BatchRunner, CategoryOutcome, RunSummary};
