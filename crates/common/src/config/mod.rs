//! Configuration management for the KBFuse engine
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with KBFUSE__)
//! - Configuration files (config/*.toml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Store configuration
    #[serde(default)]
    pub store: StoreConfig,

    /// Embedding service configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Retrieval pipeline configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Path to the single-file SQLite database
    #[serde(default = "default_db_path")]
    pub path: String,

    /// Busy-wait timeout for contended store access, in seconds
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: openai, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for the embedding service
    pub api_key: Option<String>,

    /// API base URL (for custom endpoints)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Version key; changing it logically invalidates all cached vectors
    #[serde(default = "default_version_key")]
    pub version_key: String,

    /// Per-batch request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: f64,

    /// Texts per provider request
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Maximum concurrent batch requests
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Words per indexed span
    #[serde(default = "default_span_words")]
    pub span_words: usize,

    /// Stride between span starts, in words
    #[serde(default = "default_span_stride")]
    pub span_stride: usize,

    /// Words per sentence-level span
    #[serde(default = "default_sent_words")]
    pub sent_words: usize,

    /// BM25 candidate rows fetched per query
    #[serde(default = "default_k_sql")]
    pub k_sql: usize,

    /// Results returned per query
    #[serde(default = "default_k_final")]
    pub k_final: usize,

    /// Candidates considered for embedding rerank
    #[serde(default = "default_top_oai")]
    pub top_oai: usize,

    /// Near-duplicate suppression threshold
    #[serde(default = "default_jaccard_threshold")]
    pub jaccard_threshold: f64,

    /// Reciprocal-rank-fusion constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: usize,

    /// Feedback docs examined during expansion
    #[serde(default = "default_prf_k")]
    pub prf_k: usize,

    /// Expansion terms kept
    #[serde(default = "default_prf_m")]
    pub prf_m: usize,

    /// Original-query weight; retained for parity with the indexer's
    /// configuration surface, not read by the ranking path
    #[serde(default = "default_prf_alpha")]
    pub prf_alpha: f64,

    /// Snippet length cap in characters
    #[serde(default = "default_snippet_max_chars")]
    pub snippet_max_chars: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_db_path() -> String { "kbfuse.db".to_string() }
fn default_busy_timeout() -> u64 { 30 }
fn default_embedding_provider() -> String { "openai".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_version_key() -> String { "v1".to_string() }
fn default_embedding_timeout() -> f64 { 2.0 }
fn default_batch_size() -> usize { 32 }
fn default_max_concurrency() -> usize { 4 }
fn default_span_words() -> usize { 220 }
fn default_span_stride() -> usize { 200 }
fn default_sent_words() -> usize { 60 }
fn default_k_sql() -> usize { 600 }
fn default_k_final() -> usize { 20 }
fn default_top_oai() -> usize { 28 }
fn default_jaccard_threshold() -> f64 { 0.83 }
fn default_rrf_k() -> usize { 60 }
fn default_prf_k() -> usize { 10 }
fn default_prf_m() -> usize { 20 }
fn default_prf_alpha() -> f64 { 0.7 }
fn default_snippet_max_chars() -> usize { 280 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { false }
fn default_service_name() -> String { "kbfuse".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        // .env is optional; ignore a missing file
        let _ = dotenvy::dotenv();

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))
            // Load local overrides
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables with KBFUSE__ prefix
            // e.g., KBFUSE__SEARCH__K_FINAL=10
            .add_source(
                Environment::with_prefix("KBFUSE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

impl SearchConfig {
    /// Second-pass candidate limit used by expanded queries.
    pub fn k_sql2(&self) -> usize {
        self.k_sql + 300
    }
}

impl EmbeddingConfig {
    /// Per-batch deadline as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs)
    }

    /// Deadline for a whole multi-batch call.
    pub fn overall_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.timeout_secs * 1.5)
    }
}

impl StoreConfig {
    /// Busy-wait timeout as a Duration.
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_secs(self.busy_timeout_secs)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_secs: default_busy_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            api_key: None,
            api_base: None,
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            version_key: default_version_key(),
            timeout_secs: default_embedding_timeout(),
            batch_size: default_batch_size(),
            max_concurrency: default_max_concurrency(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            span_words: default_span_words(),
            span_stride: default_span_stride(),
            sent_words: default_sent_words(),
            k_sql: default_k_sql(),
            k_final: default_k_final(),
            top_oai: default_top_oai(),
            jaccard_threshold: default_jaccard_threshold(),
            rrf_k: default_rrf_k(),
            prf_k: default_prf_k(),
            prf_m: default_prf_m(),
            prf_alpha: default_prf_alpha(),
            snippet_max_chars: default_snippet_max_chars(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            embedding: EmbeddingConfig::default(),
            search: SearchConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Initialize tracing from the observability configuration.
pub fn init_tracing(config: &ObservabilityConfig) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    if config.json_logging {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.search.k_sql, 600);
        assert_eq!(config.search.k_final, 20);
        assert_eq!(config.search.top_oai, 28);
        assert_eq!(config.embedding.batch_size, 32);
    }

    #[test]
    fn test_second_pass_limit() {
        let config = SearchConfig::default();
        assert_eq!(config.k_sql2(), 900);
    }

    #[test]
    fn test_embedding_timeouts() {
        let config = EmbeddingConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(2000));
        assert_eq!(config.overall_timeout(), Duration::from_millis(3000));
    }
}
