//! YAML configuration shared with the other pipeline stages
//!
//! The file carries a `deduplication` section owned by this tool and reads the
//! report locations from the `tech-trend-analysis` section.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::dedup::DedupSettings;
use crate::embeddings::{EmbeddingBackend, EmbeddingSettings, RetryPolicy};
use crate::error::ConfigError;
use crate::history::{HistoryBackend, HistorySettings};
use crate::io::ReportLayout;

pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";
const APP_DIR: &str = "trend-dedup";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_MAX_RETRIES: usize = 3;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub deduplication: DeduplicationSection,
  #[serde(rename = "tech-trend-analysis")]
  pub analysis: AnalysisSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DeduplicationSection {
  /// Directory holding the history store
  pub history_keywords: PathBuf,
  pub collection_name: String,
  pub dedup_analysis_report: PathBuf,
  pub similarity_threshold: f32,
  pub lookback_days: u32,
  pub target_count: usize,
  pub log: PathBuf,
  pub embedding_provider: String,
  pub embedding_model: String,
  #[serde(default = "default_timeout")]
  pub timeout: u64,
  /// Total embedding calls per candidate, first attempt included
  #[serde(default = "default_max_retries")]
  pub max_retries: usize,
  #[serde(default)]
  pub history_backend: Option<String>,
  #[serde(default)]
  pub embedding_base_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct AnalysisSection {
  pub analysis_report: PathBuf,
  pub org_analysis_report: PathBuf,
}

fn default_timeout() -> u64 {
  DEFAULT_TIMEOUT_SECS
}

fn default_max_retries() -> usize {
  DEFAULT_MAX_RETRIES
}

impl Config {
  /// Load and validate configuration from a YAML file
  pub fn load(path: &Path) -> Result<Self, ConfigError> {
    if !path.exists() {
      return Err(ConfigError::NotFound { path: path.to_path_buf() });
    }

    let content = fs::read_to_string(path).map_err(|e| ConfigError::invalid(path, e.to_string()))?;
    Self::parse(path, &content)
  }

  /// Parse configuration text; `path` is only used for error messages
  pub fn parse(path: &Path, content: &str) -> Result<Self, ConfigError> {
    if content.trim().is_empty() {
      return Err(ConfigError::Empty { path: path.to_path_buf() });
    }

    let config: Config =
      serde_yaml::from_str(content).map_err(|e| ConfigError::invalid(path, e.to_string()))?;
    config.validate()?;
    Ok(config)
  }

  fn validate(&self) -> Result<(), ConfigError> {
    let dedup = &self.deduplication;

    let threshold = dedup.similarity_threshold;
    if !(0.0..=1.0).contains(&threshold) || threshold.is_nan() {
      return Err(ConfigError::invalid_value(
        "deduplication.similarity-threshold",
        format!("{threshold} is outside [0, 1]"),
      ));
    }
    if dedup.collection_name.trim().is_empty() {
      return Err(ConfigError::invalid_value("deduplication.collection-name", "must not be empty"));
    }
    if dedup.max_retries == 0 {
      return Err(ConfigError::invalid_value("deduplication.max-retries", "must be at least 1"));
    }
    if dedup.timeout == 0 {
      return Err(ConfigError::invalid_value("deduplication.timeout", "must be at least 1 second"));
    }

    self.embedding_backend()?;
    self.history_backend()?;
    Ok(())
  }

  pub fn embedding_backend(&self) -> Result<EmbeddingBackend, ConfigError> {
    EmbeddingBackend::from_str(&self.deduplication.embedding_provider)
  }

  pub fn history_backend(&self) -> Result<HistoryBackend, ConfigError> {
    match &self.deduplication.history_backend {
      Some(name) => HistoryBackend::from_str(name),
      None => Ok(HistoryBackend::default()),
    }
  }

  pub fn layout(&self) -> ReportLayout {
    ReportLayout::new(
      &self.analysis.analysis_report,
      &self.deduplication.dedup_analysis_report,
      &self.analysis.org_analysis_report,
    )
  }

  pub fn dedup_settings(&self) -> DedupSettings {
    DedupSettings {
      target_count: self.deduplication.target_count,
      similarity_threshold: self.deduplication.similarity_threshold,
      lookback_days: self.deduplication.lookback_days,
    }
  }

  pub fn history_settings(&self) -> Result<HistorySettings, ConfigError> {
    Ok(HistorySettings {
      backend: self.history_backend()?,
      directory: self.deduplication.history_keywords.clone(),
      collection: self.deduplication.collection_name.clone(),
    })
  }

  /// Embedding settings with credentials resolved through `lookup`
  pub fn embedding_settings_with<F>(&self, lookup: F) -> Result<EmbeddingSettings, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let backend = self.embedding_backend()?;
    let api_key = match backend.credential_variable() {
      Some(variable) => {
        let key = lookup(variable).filter(|k| !k.trim().is_empty());
        Some(key.ok_or_else(|| ConfigError::missing_credential(backend.name(), variable))?)
      }
      None => None,
    };

    Ok(EmbeddingSettings {
      backend,
      model: self.deduplication.embedding_model.clone(),
      api_key,
      base_url: self.deduplication.embedding_base_url.clone(),
      timeout: Duration::from_secs(self.deduplication.timeout),
      retry: RetryPolicy::fixed(self.deduplication.max_retries),
    })
  }

  /// Embedding settings with credentials from the process environment
  pub fn embedding_settings(&self) -> Result<EmbeddingSettings, ConfigError> {
    self.embedding_settings_with(|variable| std::env::var(variable).ok())
  }
}

/// Pick the config file: explicit path, then `./config.yaml`, then the user config dir
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
  if let Some(path) = explicit {
    return path.to_path_buf();
  }

  let local = PathBuf::from(DEFAULT_CONFIG_FILE);
  if local.exists() {
    return local;
  }

  dirs::config_dir()
    .map(|dir| dir.join(APP_DIR).join(DEFAULT_CONFIG_FILE))
    .filter(|path| path.exists())
    .unwrap_or(local)
}

/// Load `.env` credentials from the working directory or the user config dir
pub fn load_dotenv() {
  if dotenvy::dotenv().is_ok() {
    return;
  }

  if let Some(config_dir) = dirs::config_dir() {
    let env_path = config_dir.join(APP_DIR).join(".env");
    if env_path.exists() && dotenvy::from_path(&env_path).is_ok() {
      return;
    }
  }

  // Variables may also be set system-wide
}
