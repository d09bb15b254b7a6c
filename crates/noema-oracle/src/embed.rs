//! Description embeddings
//!
//! Kind descriptions are embedded once at registration and compared by
//! cosine similarity. `HttpEmbedder` talks to an OpenAI-compatible
//! embeddings endpoint; `HashEmbedder` is a deterministic local fallback
//! used offline and in tests.

use crate::provider::{OracleError, OracleResult};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

pub use noema_core::cosine;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> OracleResult<Vec<f32>>;

    fn dim(&self) -> usize;
}

/// OpenAI-compatible `/v1/embeddings` client.
pub struct HttpEmbedder {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
    dim: usize,
}

impl HttpEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dim: usize) -> Self {
        Self {
            client: Client::new(),
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1/embeddings".to_string(),
            model: model.into(),
            dim,
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> OracleResult<Vec<f32>> {
        let body = EmbeddingRequest {
            model: self.model.clone(),
            input: text.to_string(),
        };
        let response = self
            .client
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 => OracleError::AuthFailed(error_text),
                429 => OracleError::RateLimited { retry_after_ms: 60_000 },
                _ => OracleError::RequestFailed(format!("{}: {}", status, error_text)),
            });
        }

        let parsed: EmbeddingResponse = response.json().await?;
        parsed
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| OracleError::InvalidResponse("empty embedding data".into()))
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

/// Deterministic feature-hashing embedder: character trigrams hashed into
/// `dim` signed buckets, L2-normalized. Identical text always embeds to
/// the identical vector, which is what registry and store tests rely on.
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let normalized = text.trim().to_lowercase();
        let chars: Vec<char> = normalized.chars().collect();
        let mut vec = vec![0.0f32; self.dim];
        if chars.is_empty() {
            return vec;
        }
        let grams = if chars.len() < 3 { 1 } else { chars.len() - 2 };
        for i in 0..grams {
            let end = (i + 3).min(chars.len());
            let gram: String = chars[i..end].iter().collect();
            let mut hasher = DefaultHasher::new();
            gram.hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % self.dim as u64) as usize;
            let sign = if (h >> 32) & 1 == 0 { 1.0 } else { -1.0 };
            vec[bucket] += sign;
        }
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vec {
                *x /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, text: &str) -> OracleResult<Vec<f32>> {
        Ok(self.embed_sync(text))
    }

    fn dim(&self) -> usize {
        self.dim
    }
}

#[derive(Serialize)]
struct EmbeddingRequest {
    model: String,
    input: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn hash_embedder_deterministic() {
        let e = HashEmbedder::new(64);
        let a = e.embed("solution of a system of linear equations").await.unwrap();
        let b = e.embed("solution of a system of linear equations").await.unwrap();
        assert_eq!(a, b);
        assert!((cosine(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn hash_embedder_distinguishes_texts() {
        let e = HashEmbedder::new(128);
        let a = e.embed("arithmetic question to be calculated").await.unwrap();
        let b = e.embed("a short passage about prices").await.unwrap();
        assert!(cosine(&a, &b) < 0.9);
    }

    #[tokio::test]
    async fn hash_embedder_normalized() {
        let e = HashEmbedder::new(32);
        let v = e.embed("hello world").await.unwrap();
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }
}
