//! Embedding backends
//!
//! The backend is chosen once per run from configuration and wrapped in the
//! closed [`EmbeddingProvider`] enum. Consumers only see the [`Embedder`]
//! trait, so tests can hand the deduplicator a deterministic stand-in.

mod gemini;
mod http;
#[cfg(feature = "local-embeddings")]
mod local;
mod openai;
mod retry;

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use std::time::Duration;

use crate::error::{ConfigError, EmbeddingError};

pub use gemini::GeminiEmbedder;
#[cfg(feature = "local-embeddings")]
pub use local::LocalEmbedder;
pub use openai::{OpenAiEmbedder, VoyageEmbedder};
pub use retry::RetryPolicy;

/// Converts text into a fixed-dimension vector
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

/// Supported embedding backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
  OpenAi,
  Voyage,
  Gemini,
  Local,
}

impl EmbeddingBackend {
  const SUPPORTED: &'static str = "openai, voyageai, gemini, sentence-transformers";

  pub fn name(&self) -> &'static str {
    match self {
      Self::OpenAi => "openai",
      Self::Voyage => "voyageai",
      Self::Gemini => "gemini",
      Self::Local => "sentence-transformers",
    }
  }

  /// Environment variable holding the API key, if the backend needs one
  pub fn credential_variable(&self) -> Option<&'static str> {
    match self {
      Self::OpenAi => Some("OPENAI_API_KEY"),
      Self::Voyage => Some("VOYAGEAI_API_KEY"),
      Self::Gemini => Some("GEMINI_API_KEY"),
      Self::Local => None,
    }
  }
}

impl fmt::Display for EmbeddingBackend {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

impl FromStr for EmbeddingBackend {
  type Err = ConfigError;

  fn from_str(value: &str) -> Result<Self, Self::Err> {
    let backend = match value.trim().to_lowercase().as_str() {
      "openai" => Self::OpenAi,
      "voyageai" | "voyage" => Self::Voyage,
      "gemini" => Self::Gemini,
      "sentence-transformers" | "local" => Self::Local,
      _ => return Err(ConfigError::unsupported("embedding provider", value, Self::SUPPORTED)),
    };

    if backend == Self::Local && !cfg!(feature = "local-embeddings") {
      return Err(ConfigError::feature_disabled(value, "local-embeddings"));
    }
    Ok(backend)
  }
}

/// Everything needed to construct a provider
#[derive(Debug, Clone)]
pub struct EmbeddingSettings {
  pub backend: EmbeddingBackend,
  pub model: String,
  pub api_key: Option<String>,
  /// Override for the hosted API endpoint
  pub base_url: Option<String>,
  pub timeout: Duration,
  pub retry: RetryPolicy,
}

/// The embedding backend selected for this run
pub enum EmbeddingProvider {
  OpenAi(OpenAiEmbedder),
  Voyage(VoyageEmbedder),
  Gemini(GeminiEmbedder),
  #[cfg(feature = "local-embeddings")]
  Local(LocalEmbedder),
}

impl EmbeddingProvider {
  pub async fn from_settings(settings: &EmbeddingSettings) -> Result<Self, ConfigError> {
    let api_key = || {
      let variable = settings.backend.credential_variable().unwrap_or("API key");
      settings
        .api_key
        .clone()
        .ok_or_else(|| ConfigError::missing_credential(settings.backend.name(), variable))
    };
    let init_error =
      |e: EmbeddingError| ConfigError::initialization(settings.backend.name(), e.to_string());

    let provider = match settings.backend {
      EmbeddingBackend::OpenAi => {
        Self::OpenAi(OpenAiEmbedder::new(settings, api_key()?).map_err(init_error)?)
      }
      EmbeddingBackend::Voyage => {
        Self::Voyage(VoyageEmbedder::new(settings, api_key()?).map_err(init_error)?)
      }
      EmbeddingBackend::Gemini => {
        Self::Gemini(GeminiEmbedder::new(settings, api_key()?).map_err(init_error)?)
      }
      #[cfg(feature = "local-embeddings")]
      EmbeddingBackend::Local => {
        Self::Local(LocalEmbedder::load(&settings.model).await.map_err(init_error)?)
      }
      #[cfg(not(feature = "local-embeddings"))]
      EmbeddingBackend::Local => {
        return Err(ConfigError::feature_disabled(settings.backend.name(), "local-embeddings"))
      }
    };

    tracing::info!(
      backend = %settings.backend,
      model = %settings.model,
      "Embedding provider ready"
    );
    Ok(provider)
  }

  pub fn backend(&self) -> EmbeddingBackend {
    match self {
      Self::OpenAi(_) => EmbeddingBackend::OpenAi,
      Self::Voyage(_) => EmbeddingBackend::Voyage,
      Self::Gemini(_) => EmbeddingBackend::Gemini,
      #[cfg(feature = "local-embeddings")]
      Self::Local(_) => EmbeddingBackend::Local,
    }
  }
}

#[async_trait]
impl Embedder for EmbeddingProvider {
  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    match self {
      Self::OpenAi(embedder) => embedder.embed(text).await,
      Self::Voyage(embedder) => embedder.embed(text).await,
      Self::Gemini(embedder) => embedder.embed(text).await,
      #[cfg(feature = "local-embeddings")]
      Self::Local(embedder) => embedder.embed(text).await,
    }
  }
}

/// Pins an instance to the dimension of the first vector it produced
#[derive(Debug, Default)]
pub struct DimensionGuard {
  dimension: OnceLock<usize>,
}

impl DimensionGuard {
  pub fn check(&self, vector: Vec<f32>) -> Result<Vec<f32>, EmbeddingError> {
    if vector.is_empty() {
      return Err(EmbeddingError::invalid_response("empty embedding vector"));
    }

    let expected = *self.dimension.get_or_init(|| vector.len());
    if expected != vector.len() {
      return Err(EmbeddingError::DimensionMismatch { expected, actual: vector.len() });
    }
    Ok(vector)
  }
}
