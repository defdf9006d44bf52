//! Shared request plumbing for hosted embedding APIs

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::EmbeddingError;

const MAX_ERROR_BODY: usize = 300;

pub fn build_client(timeout: Duration) -> Result<Client, EmbeddingError> {
  Client::builder()
    .timeout(timeout)
    .build()
    .map_err(|e| EmbeddingError::invalid_response(format!("HTTP client setup failed: {e}")))
}

/// Send a request and decode its JSON body, classifying failures for retry
pub async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, EmbeddingError> {
  let response = request.send().await.map_err(classify_transport_error)?;
  let status = response.status();

  if !status.is_success() {
    let body = response.text().await.unwrap_or_default();
    return Err(classify_status(status, truncate(&body)));
  }

  response
    .json::<T>()
    .await
    .map_err(|e| EmbeddingError::invalid_response(format!("undecodable body: {e}")))
}

fn classify_transport_error(error: reqwest::Error) -> EmbeddingError {
  if error.is_timeout() || error.is_connect() || error.is_request() {
    EmbeddingError::transient(error.to_string())
  } else {
    EmbeddingError::invalid_response(error.to_string())
  }
}

pub fn classify_status(status: StatusCode, body: String) -> EmbeddingError {
  if status == StatusCode::TOO_MANY_REQUESTS
    || status == StatusCode::REQUEST_TIMEOUT
    || status.is_server_error()
  {
    EmbeddingError::transient(format!("HTTP {status}: {body}"))
  } else {
    EmbeddingError::rejected(status.as_u16(), body)
  }
}

fn truncate(body: &str) -> String {
  body.chars().take(MAX_ERROR_BODY).collect()
}
