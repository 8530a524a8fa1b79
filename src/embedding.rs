//! Embedding client abstraction and the OpenAI-compatible implementation.
//!
//! The [`EmbeddingProvider`] trait is the seam between the engine and the
//! external embedding service: a batch call at ingestion and a query call at
//! retrieval time, both in the same embedding space. Ingestion and querying
//! must use the same provider instance (or an identically configured one) or
//! query vectors will not live in the session's index space.
//!
//! Retry strategy for the HTTP provider (retries belong to this client, not
//! the core engine):
//! - HTTP 429 and 5xx → retry with exponential backoff (1s, 2s, 4s, ...,
//!   capped at 32s)
//! - other 4xx → fail immediately
//! - network errors → retry

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::EmbeddingConfig;
use crate::error::{EngineError, Result};

/// An embedding-generation backend.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded in the session manifest.
    fn model_name(&self) -> &str;

    /// Output vector width; fixed per session.
    fn dims(&self) -> usize;

    /// Embed a batch of chunk texts, returning one vector per input text in
    /// input order. A mismatched count or width is an error, never padded or
    /// truncated.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single query string in the same space as the documents.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::EmbeddingService("empty embedding response".to_string()))
    }
}

/// Embedding provider for OpenAI-compatible `/embeddings` endpoints.
pub struct OpenAiEmbeddingProvider {
    client: reqwest::Client,
    config: EmbeddingConfig,
    api_key: String,
}

impl OpenAiEmbeddingProvider {
    /// Create a provider from configuration. The API key is read from the
    /// environment variable named by `config.api_key_env`.
    pub fn new(config: EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env).map_err(|_| {
            EngineError::EmbeddingService(format!(
                "{} environment variable not set",
                config.api_key_env
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EngineError::EmbeddingService(e.to_string()))?;

        Ok(Self {
            client,
            config,
            api_key,
        })
    }

    async fn request_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.config.base_url.trim_end_matches('/'));
        let body = serde_json::json!({
            "model": self.config.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                debug!(attempt, ?delay, "retrying embedding request");
                tokio::time::sleep(delay).await;
            }

            let resp = self
                .client
                .post(&url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response
                            .json()
                            .await
                            .map_err(|e| EngineError::EmbeddingService(e.to_string()))?;
                        return parse_embedding_response(&json);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        warn!(%status, "embedding request failed, will retry");
                        last_err = Some(EngineError::EmbeddingService(format!(
                            "embedding API error {}: {}",
                            status, body_text
                        )));
                        continue;
                    }

                    return Err(EngineError::EmbeddingService(format!(
                        "embedding API error {}: {}",
                        status, body_text
                    )));
                }
                Err(e) => {
                    warn!(error = %e, "embedding request network error, will retry");
                    last_err = Some(EngineError::EmbeddingService(e.to_string()));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| {
            EngineError::EmbeddingService("embedding failed after retries".to_string())
        }))
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddingProvider {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    fn dims(&self) -> usize {
        self.config.dims
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for batch in texts.chunks(self.config.batch_size.max(1)) {
            let batch_vectors = self.request_batch(batch).await?;

            if batch_vectors.len() != batch.len() {
                return Err(EngineError::EmbeddingService(format!(
                    "embedding count mismatch: sent {} texts, got {} vectors",
                    batch.len(),
                    batch_vectors.len()
                )));
            }
            for vector in &batch_vectors {
                if vector.len() != self.config.dims {
                    return Err(EngineError::EmbeddingService(format!(
                        "embedding dimensionality mismatch: expected {}, got {}",
                        self.config.dims,
                        vector.len()
                    )));
                }
            }

            vectors.extend(batch_vectors);
        }

        Ok(vectors)
    }
}

/// Parse an OpenAI-style embeddings response, re-ordering by the `index`
/// field so output order matches input order.
fn parse_embedding_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| {
            EngineError::EmbeddingService("invalid embedding response: missing data array".into())
        })?;

    let mut indexed: Vec<(usize, Vec<f32>)> = Vec::with_capacity(data.len());

    for (fallback_index, item) in data.iter().enumerate() {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| {
                EngineError::EmbeddingService(
                    "invalid embedding response: missing embedding".into(),
                )
            })?;

        let vector: Vec<f32> = embedding
            .iter()
            .map(|v| v.as_f64().unwrap_or(0.0) as f32)
            .collect();

        let index = item
            .get("index")
            .and_then(|i| i.as_u64())
            .map(|i| i as usize)
            .unwrap_or(fallback_index);

        indexed.push((index, vector));
    }

    indexed.sort_by_key(|(index, _)| *index);
    Ok(indexed.into_iter().map(|(_, vector)| vector).collect())
}

/// Build the embedding provider described by the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<std::sync::Arc<dyn EmbeddingProvider>> {
    Ok(std::sync::Arc::new(OpenAiEmbeddingProvider::new(
        config.clone(),
    )?))
}
