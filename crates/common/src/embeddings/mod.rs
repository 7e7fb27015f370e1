//! Embedding service abstraction
//!
//! Provides:
//! - The `Embedder` trait (the provider's observable contract)
//! - An OpenAI-compatible HTTP client
//! - A mock embedder for tests
//! - `EmbeddingClient`, the batching, latency-bounded wrapper used by the
//!   retrieval pipeline

use crate::config::EmbeddingConfig;
use crate::errors::{EngineError, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// Trait for embedding generation
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate embeddings for multiple texts, one vector per input, in
    /// input order. Vectors are L2-normalized later by the wrapper.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the model name
    fn model_name(&self) -> &str;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;
}

/// Identity of the provider configuration.
///
/// The triple must be stable across indexing and search; changing any part
/// logically invalidates persistent cache reads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    /// Model identifier
    pub model: String,
    /// Vector dimension
    pub dim: usize,
    /// Cache version key
    pub version_key: String,
}

impl ProviderIdentity {
    /// Build the identity from embedding configuration.
    pub fn from_config(config: &EmbeddingConfig) -> Self {
        Self {
            model: config.model.clone(),
            dim: config.dimension,
            version_key: config.version_key.clone(),
        }
    }
}

/// Divide a vector by its L2 norm plus 1e-9, in place.
pub fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm + 1e-9;
    for x in vector.iter_mut() {
        *x /= denom;
    }
}

/// Dot product of two vectors; cosine similarity for normalized inputs.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// OpenAI-compatible embedding client
pub struct OpenAIEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimension: usize,
    base_url: String,
}

#[derive(Serialize)]
struct OpenAIRequest {
    input: Vec<String>,
    model: String,
    dimensions: usize,
}

#[derive(Deserialize)]
struct OpenAIResponse {
    data: Vec<OpenAIEmbedding>,
}

#[derive(Deserialize)]
struct OpenAIEmbedding {
    embedding: Vec<f32>,
}

impl OpenAIEmbedder {
    /// Create a new OpenAI embedder
    pub fn new(
        api_key: String,
        model: String,
        dimension: usize,
        base_url: Option<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            api_key,
            model,
            dimension,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        })
    }

    async fn make_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = format!("{}/embeddings", self.base_url);

        let request = OpenAIRequest {
            input: texts.to_vec(),
            model: self.model.clone(),
            dimensions: self.dimension,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::embedding(format!("API error {status}: {body}")));
        }

        let result: OpenAIResponse = response
            .json()
            .await
            .map_err(|e| EngineError::embedding(format!("failed to parse response: {e}")))?;

        Ok(result.data.into_iter().map(|e| e.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.make_request(texts).await
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Mock embedder for testing
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        Ok(texts
            .iter()
            .map(|_| (0..self.dimension).map(|_| rng.gen::<f32>()).collect())
            .collect())
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Create an embedder based on configuration.
///
/// Fails when the configured provider requires credentials and none are set.
pub fn create_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>> {
    match config.provider.as_str() {
        "openai" => {
            let key = config
                .api_key
                .clone()
                .ok_or_else(|| EngineError::Configuration {
                    message: "embedding api_key is required for the openai provider".to_string(),
                })?;
            Ok(Arc::new(OpenAIEmbedder::new(
                key,
                config.model.clone(),
                config.dimension,
                config.api_base.clone(),
            )?))
        }
        "mock" => Ok(Arc::new(MockEmbedder::new(config.dimension))),
        other => {
            warn!(provider = other, "Unknown embedding provider, using mock");
            Ok(Arc::new(MockEmbedder::new(config.dimension)))
        }
    }
}

/// Batching, latency-bounded embedding wrapper.
///
/// Splits inputs into fixed-size batches, issues at most `max_concurrency`
/// batch requests at a time, and bounds each batch by `timeout` (with the
/// whole multi-batch call bounded by 1.5x). Any batch failure or deadline
/// miss fails the entire call; successful rows are L2-normalized and
/// returned in input order.
pub struct EmbeddingClient {
    embedder: Arc<dyn Embedder>,
    batch_size: usize,
    max_concurrency: usize,
    timeout: Duration,
    overall_timeout: Duration,
}

impl EmbeddingClient {
    /// Wrap an embedder with the batching parameters from configuration.
    pub fn new(embedder: Arc<dyn Embedder>, config: &EmbeddingConfig) -> Self {
        Self {
            embedder,
            batch_size: config.batch_size.max(1),
            max_concurrency: config.max_concurrency.max(1),
            timeout: config.timeout(),
            overall_timeout: config.overall_timeout(),
        }
    }

    /// Model identifier of the wrapped embedder.
    pub fn model_name(&self) -> &str {
        self.embedder.model_name()
    }

    /// Vector dimension of the wrapped embedder.
    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Embed all texts, returning one normalized vector per input.
    pub async fn embed_all(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let started = Instant::now();
        let result = if texts.len() <= self.batch_size {
            self.embed_batch_bounded(texts.to_vec()).await
        } else {
            let futures = texts
                .chunks(self.batch_size)
                .map(|chunk| self.embed_batch_bounded(chunk.to_vec()));
            let gather = stream::iter(futures)
                .buffered(self.max_concurrency)
                .try_collect::<Vec<Vec<Vec<f32>>>>();
            match tokio::time::timeout(self.overall_timeout, gather).await {
                Ok(Ok(parts)) => Ok(parts.into_iter().flatten().collect()),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(EngineError::EmbeddingTimeout {
                    timeout_ms: self.overall_timeout.as_millis() as u64,
                }),
            }
        };

        let success = result.is_ok();
        crate::metrics::record_embedding(
            started.elapsed().as_secs_f64(),
            self.embedder.model_name(),
            texts.len(),
            success,
        );

        let mut rows = result?;
        if rows.len() != texts.len() {
            return Err(EngineError::embedding(format!(
                "provider returned {} vectors for {} inputs",
                rows.len(),
                texts.len()
            )));
        }
        for row in rows.iter_mut() {
            l2_normalize(row);
        }
        Ok(rows)
    }

    async fn embed_batch_bounded(&self, batch: Vec<String>) -> Result<Vec<Vec<f32>>> {
        match tokio::time::timeout(self.timeout, self.embedder.embed_batch(&batch)).await {
            Ok(Ok(rows)) if rows.len() == batch.len() => Ok(rows),
            Ok(Ok(rows)) => Err(EngineError::embedding(format!(
                "provider returned {} vectors for a batch of {}",
                rows.len(),
                batch.len()
            ))),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(EngineError::EmbeddingTimeout {
                timeout_ms: self.timeout.as_millis() as u64,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(batch_size: usize) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "mock".to_string(),
            batch_size,
            ..EmbeddingConfig::default()
        }
    }

    #[test]
    fn test_l2_normalize_unit_norm() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_dot_product() {
        assert_eq!(dot(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
        assert!((dot(&[0.6, 0.8], &[0.6, 0.8]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_mock_embedder_shapes() {
        let embedder = MockEmbedder::new(64);
        let texts = vec!["text1".to_string(), "text2".to_string()];
        let rows = embedder.embed_batch(&texts).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].len(), 64);
    }

    #[tokio::test]
    async fn test_client_normalizes_and_preserves_order() {
        let config = test_config(32);
        let client = EmbeddingClient::new(Arc::new(MockEmbedder::new(16)), &config);
        let texts: Vec<String> = (0..5).map(|i| format!("text {i}")).collect();
        let rows = client.embed_all(&texts).await.unwrap();
        assert_eq!(rows.len(), 5);
        for row in rows {
            let norm = row.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-6);
        }
    }

    #[tokio::test]
    async fn test_client_splits_large_inputs() {
        let config = test_config(8);
        let client = EmbeddingClient::new(Arc::new(MockEmbedder::new(16)), &config);
        let texts: Vec<String> = (0..20).map(|i| format!("text {i}")).collect();
        let rows = client.embed_all(&texts).await.unwrap();
        assert_eq!(rows.len(), 20);
    }

    #[tokio::test]
    async fn test_missing_openai_key_is_fatal() {
        let config = EmbeddingConfig {
            provider: "openai".to_string(),
            api_key: None,
            ..EmbeddingConfig::default()
        };
        let err = create_embedder(&config).err().expect("must fail");
        assert!(matches!(err, EngineError::Configuration { .. }));
    }
}
