//! OpenAI and Voyage AI embedding clients
//!
//! Both services accept `{model, input: [..]}` and answer with
//! `{data: [{embedding: [..]}]}`, so they share one request path.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{build_client, send_json};
use super::{DimensionGuard, EmbeddingSettings, RetryPolicy};
use crate::error::EmbeddingError;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const VOYAGE_BASE_URL: &str = "https://api.voyageai.com/v1";

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  input: [&'a str; 1],
  #[serde(skip_serializing_if = "Option::is_none")]
  input_type: Option<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
  embedding: Vec<f32>,
}

/// Client for any endpoint speaking the `/embeddings` list format
struct ListEmbeddingClient {
  client: Client,
  endpoint: String,
  api_key: String,
  model: String,
  input_type: Option<&'static str>,
  retry: RetryPolicy,
  guard: DimensionGuard,
}

impl ListEmbeddingClient {
  fn new(
    settings: &EmbeddingSettings,
    api_key: String,
    default_base: &str,
    input_type: Option<&'static str>,
  ) -> Result<Self, EmbeddingError> {
    let base = settings.base_url.as_deref().unwrap_or(default_base).trim_end_matches('/');
    Ok(Self {
      client: build_client(settings.timeout)?,
      endpoint: format!("{base}/embeddings"),
      api_key,
      model: settings.model.clone(),
      input_type,
      retry: settings.retry.clone(),
      guard: DimensionGuard::default(),
    })
  }

  async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let vector = self.retry.run(|| self.request(text)).await?;
    self.guard.check(vector)
  }

  async fn request(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let body = EmbeddingRequest { model: &self.model, input: [text], input_type: self.input_type };
    let request = self.client.post(&self.endpoint).bearer_auth(&self.api_key).json(&body);

    let response: EmbeddingResponse = send_json(request).await?;
    response
      .data
      .into_iter()
      .next()
      .map(|d| d.embedding)
      .ok_or_else(|| EmbeddingError::invalid_response("no embedding in response"))
  }
}

/// OpenAI `text-embedding-*` models
pub struct OpenAiEmbedder {
  inner: ListEmbeddingClient,
}

impl OpenAiEmbedder {
  pub fn new(settings: &EmbeddingSettings, api_key: String) -> Result<Self, EmbeddingError> {
    Ok(Self { inner: ListEmbeddingClient::new(settings, api_key, OPENAI_BASE_URL, None)? })
  }

  pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    self.inner.embed(text).await
  }
}

/// Voyage AI models, embedded as documents
pub struct VoyageEmbedder {
  inner: ListEmbeddingClient,
}

impl VoyageEmbedder {
  pub fn new(settings: &EmbeddingSettings, api_key: String) -> Result<Self, EmbeddingError> {
    Ok(Self {
      inner: ListEmbeddingClient::new(settings, api_key, VOYAGE_BASE_URL, Some("document"))?,
    })
  }

  pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    self.inner.embed(text).await
  }
}
