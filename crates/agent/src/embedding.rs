use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use menuguard_core::config::{EmbeddingConfig, EmbeddingProvider};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Transport(String),
    #[error("embedding service returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("embedding response was malformed: {0}")]
    Malformed(String),
    #[error("expected a {expected}-dimensional embedding, got {actual}")]
    Dimension { expected: usize, actual: usize },
    #[error("topic classifier needs at least one prototype")]
    NoPrototypes,
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;
}

pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, EmbeddingError> {
    match config.provider {
        EmbeddingProvider::Hashing => Ok(Arc::new(HashingEmbedder::new(config.dimensions))),
        EmbeddingProvider::Ollama => Ok(Arc::new(OllamaEmbedder::new(
            &config.base_url,
            &config.model,
            Duration::from_secs(config.timeout_secs),
        )?)),
    }
}

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "can", "d", "do", "does", "for", "i", "is", "it", "ll", "m",
    "me", "my", "of", "on", "or", "s", "that", "the", "this", "to", "we", "what", "you",
];

const WORD_WEIGHT: f32 = 1.0;
const TRIGRAM_WEIGHT: f32 = 0.5;

/// Offline embedder: signed feature hashing of content words and their
/// character trigrams. Deterministic, so the same text always yields the same
/// vector.
#[derive(Clone, Debug)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions: dimensions.max(1) }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimensions];
        let lowered = text.to_lowercase();
        let words = lowered
            .split(|character: char| !character.is_alphanumeric())
            .filter(|word| !word.is_empty() && !STOPWORDS.contains(word));

        for word in words {
            self.add_feature(&mut vector, "w", word, WORD_WEIGHT);
            let padded: Vec<char> = format!("^{word}$").chars().collect();
            for trigram in padded.windows(3) {
                let trigram: String = trigram.iter().collect();
                self.add_feature(&mut vector, "t", &trigram, TRIGRAM_WEIGHT);
            }
        }

        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|value| *value /= norm);
        }
        vector
    }

    fn add_feature(&self, vector: &mut [f32], namespace: &str, feature: &str, weight: f32) {
        let mut hasher = blake3::Hasher::new();
        hasher.update(namespace.as_bytes());
        hasher.update(b":");
        hasher.update(feature.as_bytes());
        let digest = hasher.finalize();
        let bytes = digest.as_bytes();

        let mut bucket = [0_u8; 8];
        bucket.copy_from_slice(&bytes[..8]);
        let index = (u64::from_le_bytes(bucket) % self.dimensions as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        Ok(self.embed_sync(text))
    }
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    embedding: Vec<f32>,
}

/// Calls a local Ollama server's `/api/embeddings` endpoint.
pub struct OllamaEmbedder {
    client: Client,
    base_url: String,
    model: String,
}

impl OllamaEmbedder {
    pub fn new(base_url: &str, model: &str, timeout: Duration) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| EmbeddingError::Transport(error.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/api/embeddings", self.base_url);
        let request = OllamaEmbeddingRequest { model: &self.model, prompt: text };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|error| EmbeddingError::Transport(error.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Status { status: status.as_u16(), body });
        }

        let payload: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingError::Malformed(error.to_string()))?;
        if payload.embedding.is_empty() {
            return Err(EmbeddingError::Malformed("empty embedding vector".to_string()));
        }
        Ok(payload.embedding)
    }
}
