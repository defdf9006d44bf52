//! Tracing setup: readable output on stderr plus a JSON audit log on disk

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::error::ConfigError;

pub const LOG_FILE_NAME: &str = "deduplication.log";
const DEFAULT_FILTER: &str = "trend_dedup=info,lance=warn,lance_datafusion=warn,datafusion=warn";
const VERBOSE_FILTER: &str = "trend_dedup=debug,lance=warn,lance_datafusion=warn,datafusion=warn";

/// Filter directives: `RUST_LOG` wins, then `--verbose`, then the default
pub fn filter_directives(verbose: bool, env_override: Option<&str>) -> String {
  match env_override.filter(|d| !d.trim().is_empty()) {
    Some(directives) => directives.to_string(),
    None if verbose => VERBOSE_FILTER.to_string(),
    None => DEFAULT_FILTER.to_string(),
  }
}

/// Install the global subscriber. With `log_dir`, every event is also appended
/// as a JSON line to `<log_dir>/deduplication.log`.
pub fn init(log_dir: Option<&Path>, verbose: bool) -> Result<Option<PathBuf>, ConfigError> {
  let env_override = std::env::var(EnvFilter::DEFAULT_ENV).ok();
  let filter = EnvFilter::try_new(filter_directives(verbose, env_override.as_deref()))
    .map_err(|e| ConfigError::invalid_value(EnvFilter::DEFAULT_ENV, e.to_string()))?;

  let (json_layer, log_path) = match log_dir {
    Some(dir) => {
      let (file, path) = open_log_file(dir)?;
      let layer = fmt::layer().json().with_ansi(false).with_writer(Mutex::new(file));
      (Some(layer), Some(path))
    }
    None => (None, None),
  };

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
    .with(json_layer)
    .try_init()
    .map_err(|e| ConfigError::initialization("logging", e.to_string()))?;

  Ok(log_path)
}

fn open_log_file(dir: &Path) -> Result<(File, PathBuf), ConfigError> {
  fs::create_dir_all(dir)
    .map_err(|e| ConfigError::initialization("log directory", e.to_string()))?;
  let path = dir.join(LOG_FILE_NAME);
  let file = OpenOptions::new()
    .create(true)
    .append(true)
    .open(&path)
    .map_err(|e| ConfigError::initialization("log file", format!("{}: {e}", path.display())))?;
  Ok((file, path))
}
