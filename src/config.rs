//! TOML configuration parsing and validation.
//!
//! Every section except `[db]` has defaults. [`load_config`] validates the
//! whole configuration before anything else runs; invalid combinations fail
//! fast with [`RagError::Config`].

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub context: ContextConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

/// Sliding-window sizes, measured in characters.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_size")]
    pub max_size: usize,
    #[serde(default = "default_overlap")]
    pub overlap: usize,
    #[serde(default = "default_min_size")]
    pub min_size: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_size: default_max_size(),
            overlap: default_overlap(),
            min_size: default_min_size(),
        }
    }
}

fn default_max_size() -> usize {
    1000
}
fn default_overlap() -> usize {
    200
}
fn default_min_size() -> usize {
    100
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_k")]
    pub k_default: usize,
    #[serde(default = "default_oversample_factor")]
    pub oversample_factor: usize,
    /// Trigram Jaccard similarity at or above which two passages count as
    /// near-duplicates.
    #[serde(default = "default_dedup_threshold")]
    pub dedup_threshold: f64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k_default: default_k(),
            oversample_factor: default_oversample_factor(),
            dedup_threshold: default_dedup_threshold(),
        }
    }
}

fn default_k() -> usize {
    4
}
fn default_oversample_factor() -> usize {
    3
}
fn default_dedup_threshold() -> f64 {
    0.9
}

#[derive(Debug, Deserialize, Clone)]
pub struct ContextConfig {
    #[serde(default = "default_token_budget")]
    pub token_budget: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            token_budget: default_token_budget(),
        }
    }
}

fn default_token_budget() -> usize {
    3000
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_embedding_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    /// Embedding dimensionality; fixed for the lifetime of an index.
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_embedding_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: default_embedding_provider(),
            model: None,
            dims: default_dims(),
            url: None,
            batch_size: default_batch_size(),
            max_retries: default_max_retries(),
            timeout_secs: default_embedding_timeout_secs(),
        }
    }
}

impl EmbeddingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries.saturating_add(1),
            base_delay: Duration::from_secs(1),
            backoff_multiplier: 2.0,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn default_embedding_provider() -> String {
    "hash".to_string()
}
fn default_dims() -> usize {
    384
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_embedding_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerationConfig {
    #[serde(default = "default_generation_provider")]
    pub provider: String,
    #[serde(default = "default_generation_model")]
    pub model: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_generation_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_generation_provider(),
            model: default_generation_model(),
            url: None,
            temperature: default_temperature(),
            timeout_secs: default_generation_timeout_secs(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

impl GenerationConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            backoff_multiplier: self.backoff_multiplier,
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

fn default_generation_provider() -> String {
    "openai".to_string()
}
fn default_generation_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_generation_timeout_secs() -> u64 {
    60
}
fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_backoff_multiplier() -> f64 {
    2.0
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
    /// Maximum number of documents extracted and embedded at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            include_globs: default_include_globs(),
            exclude_globs: Vec::new(),
            follow_symlinks: false,
            concurrency: default_concurrency(),
        }
    }
}

fn default_include_globs() -> Vec<String> {
    vec![
        "**/*.pdf".to_string(),
        "**/*.txt".to_string(),
        "**/*.md".to_string(),
    ]
}
fn default_concurrency() -> usize {
    4
}

impl Config {
    /// A fully defaulted configuration pointing at `db_path`, using the
    /// offline `hash` embedder and `extractive` generator.
    pub fn minimal(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db: DbConfig {
                path: db_path.into(),
            },
            chunking: ChunkingConfig::default(),
            retrieval: RetrievalConfig::default(),
            context: ContextConfig::default(),
            embedding: EmbeddingConfig::default(),
            generation: GenerationConfig {
                provider: "extractive".to_string(),
                ..GenerationConfig::default()
            },
            ingest: IngestConfig::default(),
        }
    }

    /// Check every cross-field constraint.
    pub fn validate(&self) -> Result<()> {
        validate_chunking(&self.chunking)?;

        if self.retrieval.k_default < 1 {
            return Err(config_err("retrieval.k_default must be >= 1"));
        }
        if self.retrieval.oversample_factor < 1 {
            return Err(config_err("retrieval.oversample_factor must be >= 1"));
        }
        if !(self.retrieval.dedup_threshold > 0.0 && self.retrieval.dedup_threshold <= 1.0) {
            return Err(config_err("retrieval.dedup_threshold must be in (0.0, 1.0]"));
        }

        if self.context.token_budget == 0 {
            return Err(config_err("context.token_budget must be > 0"));
        }

        if self.embedding.dims == 0 {
            return Err(config_err("embedding.dims must be > 0"));
        }
        if self.embedding.timeout_secs == 0 {
            return Err(config_err("embedding.timeout_secs must be > 0"));
        }
        if self.embedding.batch_size == 0 {
            return Err(config_err("embedding.batch_size must be > 0"));
        }
        match self.embedding.provider.as_str() {
            "hash" => {}
            "openai" | "ollama" => {
                if self.embedding.model.is_none() {
                    return Err(config_err(&format!(
                        "embedding.model must be specified when provider is '{}'",
                        self.embedding.provider
                    )));
                }
            }
            other => {
                return Err(config_err(&format!(
                    "unknown embedding provider: '{}'. Must be hash, openai, or ollama.",
                    other
                )))
            }
        }

        match self.generation.provider.as_str() {
            "openai" | "ollama" | "extractive" => {}
            other => {
                return Err(config_err(&format!(
                    "unknown generation provider: '{}'. Must be openai, ollama, or extractive.",
                    other
                )))
            }
        }
        if self.generation.max_attempts == 0 {
            return Err(config_err("generation.max_attempts must be >= 1"));
        }
        let multiplier = self.generation.backoff_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return Err(config_err(
                "generation.backoff_multiplier must be a finite number >= 1.0",
            ));
        }
        if self.generation.timeout_secs == 0 {
            return Err(config_err("generation.timeout_secs must be > 0"));
        }

        if self.ingest.concurrency == 0 {
            return Err(config_err("ingest.concurrency must be >= 1"));
        }

        Ok(())
    }
}

/// Chunking constraints, shared with [`Chunker::new`](crate::chunk::Chunker::new).
pub fn validate_chunking(chunking: &ChunkingConfig) -> Result<()> {
    if chunking.max_size == 0 {
        return Err(config_err("chunking.max_size must be > 0"));
    }
    if chunking.overlap >= chunking.max_size {
        return Err(config_err(&format!(
            "chunking.overlap ({}) must be less than chunking.max_size ({})",
            chunking.overlap, chunking.max_size
        )));
    }
    if chunking.min_size > chunking.max_size {
        return Err(config_err(&format!(
            "chunking.min_size ({}) must not exceed chunking.max_size ({})",
            chunking.min_size, chunking.max_size
        )));
    }
    Ok(())
}

fn config_err(msg: &str) -> RagError {
    RagError::Config(msg.to_string())
}

/// Parse and validate a configuration document.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .map_err(|e| RagError::Config(format!("failed to parse config file: {}", e)))?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        RagError::Config(format!(
            "failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;
    parse_config(&content)
}
