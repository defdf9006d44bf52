use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use trend_dedup::config::{load_dotenv, resolve_config_path};
use trend_dedup::embeddings::Embedder;
use trend_dedup::history::open_store;
use trend_dedup::{logging, BatchRunner, Config, Deduplicator, EmbeddingProvider, RunSummary};

#[derive(Parser)]
#[command(name = "trend-dedup")]
#[command(about = "Drop trend topics that were already published recently")]
#[command(version)]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
  /// Path to the pipeline configuration file
  #[arg(long, short = 'c', env = "TREND_DEDUP_CONFIG")]
  config: Option<PathBuf>,

  /// Enable debug logging
  #[arg(short, long)]
  verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
  /// Deduplicate every category report for a feed date
  Run {
    /// Feed date to process (defaults to today)
    #[arg(long, value_parser = parse_feed_date)]
    feed_date: Option<NaiveDate>,

    /// Only process this category
    #[arg(long)]
    category: Option<String>,

    #[command(flatten)]
    config: ConfigArgs,
  },
  /// Show history store statistics
  History {
    #[command(flatten)]
    config: ConfigArgs,
  },
}

fn parse_feed_date(value: &str) -> Result<NaiveDate, String> {
  NaiveDate::parse_from_str(value, "%Y-%m-%d")
    .map_err(|e| format!("expected YYYY-MM-DD, got '{value}': {e}"))
}

#[tokio::main]
async fn main() -> Result<()> {
  let cli = Cli::parse();

  match cli.command {
    Commands::Run { feed_date, category, config } => {
      let feed_date = feed_date.unwrap_or_else(|| Local::now().date_naive());
      run(feed_date, category.as_deref(), &config).await
    }
    Commands::History { config } => history(&config).await,
  }
}

/// Load configuration and install logging; failures here are fatal
fn setup(args: &ConfigArgs) -> Result<Config> {
  load_dotenv();
  let path = resolve_config_path(args.config.as_deref());

  let config = match Config::load(&path) {
    Ok(config) => config,
    Err(e) => {
      let _ = logging::init(None, args.verbose);
      tracing::error!(path = %path.display(), error = %e, "Configuration error");
      return Err(e).context("Cannot start without a valid configuration");
    }
  };

  let log_path = logging::init(Some(&config.deduplication.log), args.verbose)?;
  tracing::info!(
    config = %path.display(),
    log = ?log_path,
    version = env!("CARGO_PKG_VERSION"),
    "Configuration loaded"
  );
  Ok(config)
}

async fn run(feed_date: NaiveDate, category: Option<&str>, args: &ConfigArgs) -> Result<()> {
  let config = setup(args)?;

  let embedding_settings = config.embedding_settings()?;
  let provider = EmbeddingProvider::from_settings(&embedding_settings).await?;
  let embedder: Arc<dyn Embedder> = Arc::new(provider);
  let history = open_store(&config.history_settings()?).await?;

  let deduplicator = Deduplicator::new(embedder, history, config.dedup_settings());
  let runner = BatchRunner::new(config.layout(), deduplicator);

  tracing::info!(%feed_date, category = category.unwrap_or("all"), "Starting deduplication");
  let summary = match runner.run(feed_date, category).await {
    Ok(summary) => summary,
    Err(e) => {
      tracing::error!(%feed_date, error = %e, "Cannot list category reports");
      RunSummary { feed_date, categories: Vec::new() }
    }
  };

  // Isolated category failures are reported, not turned into a failing exit code
  println!("{summary}");
  Ok(())
}

async fn history(args: &ConfigArgs) -> Result<()> {
  let config = setup(args)?;
  let settings = config.history_settings()?;
  let store = open_store(&settings).await?;
  let records = store.count().await?;

  println!("History store");
  println!("  backend:    {}", settings.backend);
  println!("  directory:  {}", settings.directory.display());
  println!("  collection: {}", settings.collection);
  println!("  records:    {records}");
  Ok(())
}
