//! Exact similarity ranking for stores that filter in application code

use super::{HistoryFilter, HistoryRecord, SimilarityMatch};

/// Cosine similarity between two vectors; mismatched or zero vectors score 0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
  if a.len() != b.len() {
    return 0.0;
  }

  let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
  let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
  let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

  if magnitude_a == 0.0 || magnitude_b == 0.0 {
    0.0
  } else {
    (dot_product / (magnitude_a * magnitude_b)).clamp(-1.0, 1.0)
  }
}

/// Best `top_k` records inside `filter`, most similar first
pub fn rank<'a, I>(
  records: I,
  vector: &[f32],
  filter: &HistoryFilter,
  top_k: usize,
) -> Vec<SimilarityMatch>
where
  I: IntoIterator<Item = &'a HistoryRecord>,
{
  let mut matches: Vec<SimilarityMatch> = records
    .into_iter()
    .filter(|record| filter.matches(&record.metadata))
    .map(|record| SimilarityMatch {
      id: record.id.clone(),
      metadata: record.metadata.clone(),
      similarity: cosine_similarity(vector, &record.vector),
    })
    .collect();

  matches.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
  matches.truncate(top_k);
  matches
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_identical_and_opposite() {
    assert!((cosine_similarity(&[1.0, 2.0], &[2.0, 4.0]) - 1.0).abs() < 1e-6);
    assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
    assert_eq!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
  }

  #[test]
  fn test_degenerate_inputs() {
    assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
  }
}
