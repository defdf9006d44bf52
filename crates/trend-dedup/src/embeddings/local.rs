//! In-process sentence embeddings via ONNX Runtime
//!
//! Fetches the tokenizer and ONNX export of the configured model from the
//! Hugging Face hub, then mean-pools and L2-normalizes the last hidden state.
//! No network retries apply once the model is loaded.

use hf_hub::api::tokio::Api;
use ndarray::Array2;
use ort::session::Session;
use ort::value::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tokenizers::Tokenizer;

use super::DimensionGuard;
use crate::error::EmbeddingError;

const TOKENIZER_FILE: &str = "tokenizer.json";
const MODEL_FILE: &str = "onnx/model.onnx";
const MAX_SEQUENCE_LENGTH: usize = 512;

pub struct LocalEmbedder {
  session: Mutex<Session>,
  tokenizer: Tokenizer,
  guard: DimensionGuard,
}

struct ModelFiles {
  tokenizer_file: PathBuf,
  model_path: PathBuf,
}

#[cfg(not(tarpaulin_include))]
impl LocalEmbedder {
  /// Download (or reuse the cached copy of) `model` and build an inference session
  pub async fn load(model: &str) -> Result<Self, EmbeddingError> {
    tracing::info!(model, "Loading local embedding model");

    let files = download_model(model).await?;
    let mut tokenizer = Tokenizer::from_file(&files.tokenizer_file)
      .map_err(|e| EmbeddingError::model_load(format!("tokenizer: {e}")))?;
    tokenizer
      .with_truncation(Some(tokenizers::TruncationParams {
        max_length: MAX_SEQUENCE_LENGTH,
        ..Default::default()
      }))
      .map_err(|e| EmbeddingError::model_load(format!("tokenizer truncation: {e}")))?;

    let session = Session::builder()
      .and_then(|builder| builder.commit_from_file(&files.model_path))
      .map_err(|e| EmbeddingError::model_load(format!("onnx session: {e}")))?;

    Ok(Self { session: Mutex::new(session), tokenizer, guard: DimensionGuard::default() })
  }

  pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let encoding = self
      .tokenizer
      .encode(text, true)
      .map_err(|e| EmbeddingError::inference(format!("tokenization: {e}")))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| EmbeddingError::inference("embedding session poisoned by an earlier panic"))?;
    let inputs = prepare_inputs(&encoding, &session)?;
    let outputs = session.run(inputs).map_err(|e| EmbeddingError::inference(e.to_string()))?;

    let tensor = outputs
      .get("last_hidden_state")
      .or_else(|| outputs.get("0"))
      .ok_or_else(|| EmbeddingError::inference("model produced no 'last_hidden_state' output"))?;
    let (shape, data) =
      tensor.try_extract_tensor::<f32>().map_err(|e| EmbeddingError::inference(e.to_string()))?;

    let pooled = mean_pool(shape.as_ref(), data)?;
    self.guard.check(normalize(pooled))
  }
}

async fn download_model(model: &str) -> Result<ModelFiles, EmbeddingError> {
  let api = Api::new().map_err(|e| EmbeddingError::model_load(format!("hub client: {e}")))?;
  let repo = api.model(model.to_string());

  let tokenizer_file = repo
    .get(TOKENIZER_FILE)
    .await
    .map_err(|e| EmbeddingError::model_load(format!("download {TOKENIZER_FILE}: {e}")))?;
  let model_path = repo
    .get(MODEL_FILE)
    .await
    .map_err(|e| EmbeddingError::model_load(format!("download {MODEL_FILE}: {e}")))?;

  Ok(ModelFiles { tokenizer_file, model_path })
}

fn prepare_inputs(
  encoding: &tokenizers::Encoding,
  session: &Session,
) -> Result<HashMap<String, Value>, EmbeddingError> {
  let expects = |name: &str| session.inputs.iter().any(|input| input.name == name);

  let mut inputs = HashMap::new();
  inputs.insert("input_ids".to_string(), to_tensor(encoding.get_ids())?);
  inputs.insert("attention_mask".to_string(), to_tensor(encoding.get_attention_mask())?);
  if expects("token_type_ids") {
    inputs.insert("token_type_ids".to_string(), to_tensor(encoding.get_type_ids())?);
  }
  Ok(inputs)
}

fn to_tensor(values: &[u32]) -> Result<Value, EmbeddingError> {
  let data: Vec<i64> = values.iter().map(|&v| i64::from(v)).collect();
  let array = Array2::from_shape_vec((1, data.len()), data)
    .map_err(|e| EmbeddingError::inference(e.to_string()))?;
  let tensor = Value::from_array(array).map_err(|e| EmbeddingError::inference(e.to_string()))?;
  Ok(tensor.into())
}

/// Average token vectors of a `[1, seq, hidden]` tensor
fn mean_pool(shape: &[i64], data: &[f32]) -> Result<Vec<f32>, EmbeddingError> {
  if shape.len() != 3 || shape[1] <= 0 || shape[2] <= 0 {
    return Err(EmbeddingError::inference(format!("unexpected output shape {shape:?}")));
  }

  let seq_length = shape[1] as usize;
  let hidden_size = shape[2] as usize;
  if data.len() < seq_length * hidden_size {
    return Err(EmbeddingError::inference("output tensor shorter than its shape"));
  }

  let mut pooled = vec![0.0f32; hidden_size];
  for token in data[..seq_length * hidden_size].chunks_exact(hidden_size) {
    for (sum, value) in pooled.iter_mut().zip(token) {
      *sum += value;
    }
  }
  for value in pooled.iter_mut() {
    *value /= seq_length as f32;
  }
  Ok(pooled)
}

/// Scale to unit length; zero vectors are returned unchanged
fn normalize(mut vector: Vec<f32>) -> Vec<f32> {
  let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
  if magnitude < f32::EPSILON {
    tracing::warn!("Zero-magnitude embedding detected");
    return vector;
  }
  for value in vector.iter_mut() {
    *value /= magnitude;
  }
  vector
}
