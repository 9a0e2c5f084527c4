/// Configuration system for impact-ingest
///
/// Supports loading from multiple sources with priority:
/// CLI args > Environment variables > Config file > Defaults
use crate::error::{ConfigError, IngestError};
use crate::types::DistanceMetric;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix shared by every environment override
pub const ENV_PREFIX: &str = "IMPACT_INGEST_";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Vector index (Qdrant) configuration
    #[serde(default)]
    pub vector_db: VectorDbConfig,

    /// Graph store (Neo4j) configuration
    #[serde(default)]
    pub graph_db: GraphDbConfig,

    /// Embedding provider and batching configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Working-tree extraction configuration
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Clone/update configuration
    #[serde(default)]
    pub fetch: FetchConfig,

    /// Retry policy for fetches and store writes
    #[serde(default)]
    pub retry: RetryConfig,

    /// Background job configuration
    #[serde(default)]
    pub jobs: JobsConfig,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorDbConfig {
    /// Qdrant server URL (gRPC port)
    #[serde(default = "default_qdrant_url")]
    pub qdrant_url: String,

    /// Optional Qdrant API key
    #[serde(default)]
    pub api_key: Option<String>,

    /// Collection name for chunk vectors
    #[serde(default = "default_collection_name")]
    pub collection_name: String,

    /// Distance metric used when the collection is first created
    #[serde(default)]
    pub distance: DistanceMetric,

    /// Request timeout in seconds
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

/// Graph store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDbConfig {
    /// Neo4j HTTP endpoint
    #[serde(default = "default_neo4j_uri")]
    pub uri: String,

    #[serde(default = "default_neo4j_user")]
    pub user: String,

    #[serde(default = "default_neo4j_password")]
    pub password: String,

    /// Database name used in the transactional endpoint path
    #[serde(default = "default_neo4j_database")]
    pub database: String,

    /// Maximum node merges in flight at once
    #[serde(default = "default_graph_concurrency")]
    pub max_concurrency: usize,

    /// Request timeout in seconds
    #[serde(default = "default_store_timeout")]
    pub timeout_secs: u64,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider: "hash" (always available) or "fastembed" (feature `fastembed-provider`)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name for providers backed by a real model
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Vector dimension; must match the vector collection
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    /// Token budget per embedding call (estimated)
    #[serde(default = "default_max_batch_tokens")]
    pub max_batch_tokens: usize,

    /// Maximum number of texts per embedding call
    #[serde(default = "default_max_batch_items")]
    pub max_batch_items: usize,

    /// Maximum embedding calls in flight at once
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Timeout in seconds for a single embedding call
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

/// Extraction configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Chunk content is truncated to this many characters
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Files larger than this (bytes) are skipped
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,

    /// Glob patterns a file must match (empty = all text files)
    #[serde(default)]
    pub include_patterns: Vec<String>,

    /// Glob patterns excluded from extraction
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

/// Fetch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Directory holding one working tree per repository URL
    #[serde(default = "default_repos_dir")]
    pub repos_dir: PathBuf,

    /// Directory for cross-process lock files
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,

    /// How long to wait for another process updating the same working tree
    #[serde(default = "default_lock_timeout")]
    pub lock_timeout_secs: u64,
}

/// Retry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

/// Background job configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Ingestion jobs allowed to run at once; the rest stay queued
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent: usize,
}

// Default value functions
fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

fn default_collection_name() -> String {
    "impact_chunks".to_string()
}

fn default_store_timeout() -> u64 {
    30
}

fn default_neo4j_uri() -> String {
    "http://localhost:7474".to_string()
}

fn default_neo4j_user() -> String {
    "neo4j".to_string()
}

fn default_neo4j_password() -> String {
    "neo4jpass".to_string()
}

fn default_neo4j_database() -> String {
    "neo4j".to_string()
}

fn default_graph_concurrency() -> usize {
    8
}

fn default_provider() -> String {
    "hash".to_string()
}

fn default_model_name() -> String {
    "all-MiniLM-L6-v2".to_string()
}

fn default_dimension() -> usize {
    crate::embedding::DEFAULT_DIMENSION
}

fn default_max_batch_tokens() -> usize {
    8_000
}

fn default_max_batch_items() -> usize {
    100
}

fn default_max_workers() -> usize {
    4
}

fn default_embedding_timeout() -> u64 {
    30
}

fn default_max_chunk_chars() -> usize {
    4_000
}

fn default_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10 MB
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/node_modules/**".to_string(),
        "**/target/**".to_string(),
        "**/__pycache__/**".to_string(),
        "**/.venv/**".to_string(),
    ]
}

fn default_repos_dir() -> PathBuf {
    crate::paths::PlatformPaths::default_repos_dir()
}

fn default_lock_dir() -> PathBuf {
    crate::paths::PlatformPaths::default_lock_dir()
}

fn default_lock_timeout() -> u64 {
    600
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    8_000
}

fn default_max_concurrent_jobs() -> usize {
    2
}

impl Default for VectorDbConfig {
    fn default() -> Self {
        Self {
            qdrant_url: default_qdrant_url(),
            api_key: None,
            collection_name: default_collection_name(),
            distance: DistanceMetric::default(),
            timeout_secs: default_store_timeout(),
        }
    }
}

impl Default for GraphDbConfig {
    fn default() -> Self {
        Self {
            uri: default_neo4j_uri(),
            user: default_neo4j_user(),
            password: default_neo4j_password(),
            database: default_neo4j_database(),
            max_concurrency: default_graph_concurrency(),
            timeout_secs: default_store_timeout(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model_name: default_model_name(),
            dimension: default_dimension(),
            max_batch_tokens: default_max_batch_tokens(),
            max_batch_items: default_max_batch_items(),
            max_workers: default_max_workers(),
            timeout_secs: default_embedding_timeout(),
        }
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            max_file_size: default_max_file_size(),
            include_patterns: Vec::new(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            repos_dir: default_repos_dir(),
            lock_dir: default_lock_dir(),
            lock_timeout_secs: default_lock_timeout(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent_jobs(),
        }
    }
}

impl RetryConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

fn invalid(key: &str, reason: impl Into<String>) -> IngestError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
    .into()
}

impl Config {
    /// Load configuration from file
    pub fn from_file(path: &Path) -> Result<Self, IngestError> {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()).into());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadFailed(format!("Failed to read config file: {}", e)))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| ConfigError::ParseFailed(format!("Invalid TOML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default location or create default
    pub fn load_or_default() -> Result<Self, IngestError> {
        let config_path = crate::paths::PlatformPaths::default_config_path();

        if config_path.exists() {
            tracing::info!("Loading config from: {}", config_path.display());
            Self::from_file(&config_path)
        } else {
            tracing::info!("No config file found, using defaults");
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<(), IngestError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ConfigError::SaveFailed(format!("Failed to create config directory: {}", e))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)
            .map_err(|e| ConfigError::SaveFailed(format!("Failed to write config file: {}", e)))?;

        tracing::info!("Saved config to: {}", path.display());
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), IngestError> {
        if !self.vector_db.qdrant_url.starts_with("http://")
            && !self.vector_db.qdrant_url.starts_with("https://")
        {
            return Err(invalid(
                "vector_db.qdrant_url",
                format!("must be an http(s) URL, got '{}'", self.vector_db.qdrant_url),
            ));
        }

        if self.vector_db.collection_name.trim().is_empty() {
            return Err(invalid("vector_db.collection_name", "must not be empty"));
        }

        if !self.graph_db.uri.starts_with("http://") && !self.graph_db.uri.starts_with("https://")
        {
            return Err(invalid(
                "graph_db.uri",
                format!("must be an http(s) URL, got '{}'", self.graph_db.uri),
            ));
        }

        if self.graph_db.max_concurrency == 0 {
            return Err(invalid("graph_db.max_concurrency", "must be greater than 0"));
        }

        if self.embedding.provider != "hash" && self.embedding.provider != "fastembed" {
            return Err(invalid(
                "embedding.provider",
                format!(
                    "must be 'hash' or 'fastembed', got '{}'",
                    self.embedding.provider
                ),
            ));
        }

        for (key, value) in [
            ("embedding.dimension", self.embedding.dimension),
            ("embedding.max_batch_tokens", self.embedding.max_batch_tokens),
            ("embedding.max_batch_items", self.embedding.max_batch_items),
            ("embedding.max_workers", self.embedding.max_workers),
            ("extraction.max_chunk_chars", self.extraction.max_chunk_chars),
            ("jobs.max_concurrent", self.jobs.max_concurrent),
        ] {
            if value == 0 {
                return Err(invalid(key, "must be greater than 0"));
            }
        }

        if self.embedding.timeout_secs == 0 {
            return Err(invalid("embedding.timeout_secs", "must be greater than 0"));
        }

        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(invalid(
                "retry.initial_backoff_ms",
                "must not exceed retry.max_backoff_ms",
            ));
        }

        Ok(())
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        let var = |name: &str| std::env::var(format!("{}{}", ENV_PREFIX, name)).ok();

        if let Some(url) = var("QDRANT_URL") {
            self.vector_db.qdrant_url = url;
        }

        if let Some(key) = var("QDRANT_API_KEY") {
            self.vector_db.api_key = Some(key);
        }

        if let Some(collection) = var("QDRANT_COLLECTION") {
            self.vector_db.collection_name = collection;
        }

        if let Some(uri) = var("NEO4J_URI") {
            self.graph_db.uri = uri;
        }

        if let Some(user) = var("NEO4J_USER") {
            self.graph_db.user = user;
        }

        if let Some(password) = var("NEO4J_PASSWORD") {
            self.graph_db.password = password;
        }

        if let Some(provider) = var("EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }

        if let Some(dimension) = var("EMBEDDING_DIMENSION")
            && let Ok(dimension) = dimension.parse()
        {
            self.embedding.dimension = dimension;
        }

        if let Some(workers) = var("MAX_WORKERS")
            && let Ok(workers) = workers.parse()
        {
            self.embedding.max_workers = workers;
        }

        if let Some(dir) = var("REPOS_DIR") {
            self.fetch.repos_dir = PathBuf::from(dir);
        }
    }

    /// Create a new Config with defaults and environment overrides
    pub fn new() -> Result<Self, IngestError> {
        let mut config = Self::load_or_default()?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }
}
