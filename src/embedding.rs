//! Embedding generation against a remote embedding service.
//!
//! Defines the [`Embedder`] trait and the [`OpenAiEmbedder`] implementation,
//! which calls the OpenAI embeddings API in batches. Positional
//! correspondence is guaranteed: `output[i]` is the embedding of `input[i]`.
//!
//! There is no retry or backoff here. Any service error aborts the whole
//! call and no partial embedding list is returned — the scheduler retries
//! entire pipeline runs instead.
//!
//! Also provides vector utilities for BLOB storage:
//! - [`vec_to_blob`] — encode a `Vec<f32>` as little-endian bytes
//! - [`blob_to_vec`] — decode a BLOB back into a `Vec<f32>`
//! - [`cosine_similarity`] — similarity between two embedding vectors

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tracing::debug;

use crate::config::EmbeddingConfig;
use crate::config::Secrets;

/// Batch text-in / vector-out embedding capability.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, preserving input order.
    ///
    /// Implementations must either return one vector per input text or fail
    /// the whole call; callers never see a partial result.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
}

/// Embed a single query text.
///
/// Convenience wrapper around [`Embedder::embed`] with a one-element batch,
/// used for search queries.
pub async fn embed_query(embedder: &dyn Embedder, text: &str) -> Result<Vec<f32>> {
    let results = embedder.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Embedding provider backed by the OpenAI `POST /v1/embeddings` endpoint.
///
/// Splits input into batches of at most `batch_size` texts per API call and
/// concatenates the results in order.
pub struct OpenAiEmbedder {
    http: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    batch_size: usize,
}

impl OpenAiEmbedder {
    /// Create a provider from configuration and env-provided secrets.
    ///
    /// A missing API key is a construction-time failure; nothing is deferred
    /// to the first embed call.
    pub fn new(config: &EmbeddingConfig, secrets: &Secrets) -> Result<Self> {
        let api_key = secrets
            .openai_api_key
            .clone()
            .context("OPENAI_API_KEY environment variable not set")?;

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to build embedding HTTP client")?;

        Ok(Self {
            http,
            api_key,
            model: config.model.clone(),
            dims: config.dims,
            batch_size: config.batch_size.max(1),
        })
    }

    async fn embed_batch(&self, batch: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": batch,
            "encoding_format": "float",
        });

        let response = self
            .http
            .post("https://api.openai.com/v1/embeddings")
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("Embedding request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Embedding API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response
            .json()
            .await
            .context("Failed to decode embedding response")?;

        let embeddings = parse_embeddings_response(&json, batch.len())?;
        Ok(embeddings)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut all = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            debug!(
                batch = i + 1,
                batches = texts.len().div_ceil(self.batch_size),
                size = batch.len(),
                "embedding batch"
            );
            all.extend(self.embed_batch(batch).await?);
        }

        Ok(all)
    }

    fn dims(&self) -> usize {
        self.dims
    }
}

/// Parse the embeddings API response into input-ordered vectors.
///
/// The API tags each vector with its input index; place vectors by that
/// index so correspondence holds even if the array arrives out of order.
fn parse_embeddings_response(
    json: &serde_json::Value,
    expected: usize,
) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing data array"))?;

    if data.len() != expected {
        bail!(
            "Invalid embedding response: expected {} embeddings, got {}",
            expected,
            data.len()
        );
    }

    let mut embeddings: Vec<Option<Vec<f32>>> = vec![None; expected];

    for (pos, item) in data.iter().enumerate() {
        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(pos);

        let vector: Vec<f32> = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing embedding"))?
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        let slot = embeddings
            .get_mut(index)
            .ok_or_else(|| anyhow::anyhow!("Invalid embedding response: index {} out of range", index))?;
        *slot = Some(vector);
    }

    embeddings
        .into_iter()
        .enumerate()
        .map(|(i, e)| e.ok_or_else(|| anyhow::anyhow!("Invalid embedding response: missing index {}", i)))
        .collect()
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// Each `f32` is stored as 4 bytes in little-endian order, producing a BLOB
/// of `vec.len() × 4` bytes.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Reverses [`vec_to_blob`]: reads 4-byte little-endian `f32` values.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`. Returns `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_mismatched_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_parse_response_in_order() {
        let json = serde_json::json!({
            "data": [
                {"index": 0, "embedding": [1.0, 0.0]},
                {"index": 1, "embedding": [0.0, 1.0]},
            ]
        });
        let parsed = parse_embeddings_response(&json, 2).unwrap();
        assert_eq!(parsed, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_response_out_of_order() {
        let json = serde_json::json!({
            "data": [
                {"index": 1, "embedding": [0.0, 1.0]},
                {"index": 0, "embedding": [1.0, 0.0]},
            ]
        });
        let parsed = parse_embeddings_response(&json, 2).unwrap();
        assert_eq!(parsed, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[test]
    fn test_parse_response_count_mismatch() {
        let json = serde_json::json!({
            "data": [{"index": 0, "embedding": [1.0]}]
        });
        assert!(parse_embeddings_response(&json, 2).is_err());
    }

    #[test]
    fn test_parse_response_missing_data() {
        assert!(parse_embeddings_response(&serde_json::json!({}), 1).is_err());
    }
}
