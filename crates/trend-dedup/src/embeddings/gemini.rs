//! Google Gemini `embedContent` client

use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{build_client, send_json};
use super::{DimensionGuard, EmbeddingSettings, RetryPolicy};
use crate::error::EmbeddingError;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const TASK_TYPE: &str = "RETRIEVAL_DOCUMENT";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedContentRequest<'a> {
  model: &'a str,
  content: Content<'a>,
  task_type: &'a str,
}

#[derive(Serialize)]
struct Content<'a> {
  parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
  text: &'a str,
}

#[derive(Deserialize)]
struct EmbedContentResponse {
  embedding: ContentEmbedding,
}

#[derive(Deserialize)]
struct ContentEmbedding {
  values: Vec<f32>,
}

pub struct GeminiEmbedder {
  client: Client,
  endpoint: String,
  api_key: String,
  model: String,
  retry: RetryPolicy,
  guard: DimensionGuard,
}

impl GeminiEmbedder {
  pub fn new(settings: &EmbeddingSettings, api_key: String) -> Result<Self, EmbeddingError> {
    let model = qualified_model_name(&settings.model);
    let base = settings.base_url.as_deref().unwrap_or(GEMINI_BASE_URL).trim_end_matches('/');

    Ok(Self {
      client: build_client(settings.timeout)?,
      endpoint: format!("{base}/{model}:embedContent"),
      api_key,
      model,
      retry: settings.retry.clone(),
      guard: DimensionGuard::default(),
    })
  }

  pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let vector = self.retry.run(|| self.request(text)).await?;
    self.guard.check(vector)
  }

  async fn request(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let body = EmbedContentRequest {
      model: &self.model,
      content: Content { parts: [Part { text }] },
      task_type: TASK_TYPE,
    };
    let request =
      self.client.post(&self.endpoint).header("x-goog-api-key", &self.api_key).json(&body);

    let response: EmbedContentResponse = send_json(request).await?;
    Ok(response.embedding.values)
  }
}

/// Gemini addresses models as `models/<name>`
fn qualified_model_name(model: &str) -> String {
  if model.starts_with("models/") {
    model.to_string()
  } else {
    format!("models/{model}")
  }
}
