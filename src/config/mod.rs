//! Configuration management for Puxian
//!
//! Configuration is a TOML file (see [`Config::default_path`]) overridden by
//! `PUXIAN_SECTION__KEY` environment variables and checked by
//! [`ConfigValidator`] before use.

use crate::embedding::HnswParams;
use crate::error::{PuxianError, Result};
use crate::query::{ClassifierSettings, ExpanderSettings};
use crate::retrieval::FusionConfig;
use crate::validation::ValidatorSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    #[serde(default)]
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub indexing: IndexingConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub classifier: ClassifierConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Corpus source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusConfig {
    /// Plain text (one document per line) or `.jsonl` corpus file
    pub path: PathBuf,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Build a dense index; when false retrieval is lexical only
    pub enabled: bool,
    pub model: String,
    pub batch_size: usize,
    /// Deadline for embedding one query
    pub timeout: String,
}

/// HNSW index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexingConfig {
    pub hnsw_m: usize,
    pub hnsw_ef_construction: usize,
    pub hnsw_ef_search: usize,
}

/// Cross-encoder reranker configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerankerConfig {
    pub enabled: bool,
    pub model: String,
    pub timeout: String,
}

/// Generative model configuration (OpenAI-compatible server)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    /// Discovered from the server's model list when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Name of the environment variable holding the API key, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    pub max_tokens: u32,
    pub top_p: f32,
    pub generation_timeout: String,
    pub classify_timeout: String,
    pub expand_timeout: String,
}

/// Retrieval configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub rrf_k: f64,
    pub dense_timeout: String,
    /// Rewrites searched in addition to the original query
    pub max_query_variants: usize,
    /// Deadline for a whole `answer` request
    pub request_timeout: String,
}

/// Query classifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    pub confidence_threshold: f32,
    /// Custom intent patterns; the embedded defaults are used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub patterns_file: Option<PathBuf>,
}

/// Answer validation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    pub low_confidence: f32,
    pub warn_confidence: f32,
    pub max_citations: usize,
    pub preview_chars: usize,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(PuxianError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| PuxianError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate configuration
        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            return Self::load(path);
        }

        tracing::debug!("No config file at {:?}, using defaults", path);
        let mut config = Self::default();
        config.apply_env_overrides();
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PuxianError::Io {
                source: e,
                context: format!("Failed to create config directory: {:?}", parent),
            })?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| PuxianError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: PUXIAN_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        for (key, value) in std::env::vars() {
            if let Some(config_key) = key.strip_prefix("PUXIAN_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "CORPUS__PATH" => self.corpus.path = PathBuf::from(value),
            "EMBEDDING__ENABLED" => self.embedding.enabled = parse_env(path, value)?,
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "RERANKER__ENABLED" => self.reranker.enabled = parse_env(path, value)?,
            "RERANKER__MODEL" => self.reranker.model = value.to_string(),
            "LLM__BASE_URL" => self.llm.base_url = value.to_string(),
            "LLM__MODEL" => self.llm.model = Some(value.to_string()),
            "LLM__MAX_TOKENS" => self.llm.max_tokens = parse_env(path, value)?,
            "LLM__GENERATION_TIMEOUT" => self.llm.generation_timeout = value.to_string(),
            "RETRIEVAL__RRF_K" => self.retrieval.rrf_k = parse_env(path, value)?,
            "RETRIEVAL__REQUEST_TIMEOUT" => self.retrieval.request_timeout = value.to_string(),
            "CLASSIFIER__PATTERNS_FILE" => {
                self.classifier.patterns_file = Some(PathBuf::from(value))
            }
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| PuxianError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("puxian").join("config.toml"))
    }

    /// Corpus path with a leading `~` expanded
    pub fn corpus_path(&self) -> Result<PathBuf> {
        expand_home(&self.corpus.path)
    }

    /// API key read from the configured environment variable
    pub fn llm_api_key(&self) -> Option<String> {
        self.llm
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty())
    }

    pub fn fusion_config(&self) -> Result<FusionConfig> {
        FusionConfig::new(self.retrieval.rrf_k).map_err(|e| PuxianError::InvalidConfigValue {
            path: "retrieval.rrf_k".to_string(),
            message: e.to_string(),
        })
    }

    pub fn hnsw_params(&self) -> HnswParams {
        HnswParams {
            m: self.indexing.hnsw_m,
            ef_construction: self.indexing.hnsw_ef_construction,
            ef_search: self.indexing.hnsw_ef_search,
        }
    }

    pub fn classifier_settings(&self) -> Result<ClassifierSettings> {
        Ok(ClassifierSettings {
            confidence_threshold: self.classifier.confidence_threshold,
            timeout: config_duration("llm.classify_timeout", &self.llm.classify_timeout)?,
        })
    }

    pub fn expander_settings(&self) -> Result<ExpanderSettings> {
        Ok(ExpanderSettings {
            max_rewrites: self.retrieval.max_query_variants,
            timeout: config_duration("llm.expand_timeout", &self.llm.expand_timeout)?,
        })
    }

    pub fn validator_settings(&self) -> ValidatorSettings {
        ValidatorSettings {
            low_confidence: self.validation.low_confidence,
            warn_confidence: self.validation.warn_confidence,
            max_citations: self.validation.max_citations,
            preview_chars: self.validation.preview_chars,
        }
    }
}

fn parse_env<T: std::str::FromStr>(path: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| PuxianError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Cannot parse '{}'", value),
    })
}

/// Parse a duration string such as `"500ms"`, `"5s"`, `"1m"` or `"1h"`.
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: u64 = number.parse().ok()?;

    match unit.trim() {
        "ms" => Some(Duration::from_millis(value)),
        "" | "s" => Some(Duration::from_secs(value)),
        "m" => Some(Duration::from_secs(value * 60)),
        "h" => Some(Duration::from_secs(value * 3600)),
        _ => None,
    }
}

/// Parse a duration from the configuration key `path`
pub fn config_duration(path: &str, value: &str) -> Result<Duration> {
    parse_duration(value).ok_or_else(|| PuxianError::InvalidConfigValue {
        path: path.to_string(),
        message: format!("Invalid duration format: {}", value),
    })
}

fn expand_home(path: &Path) -> Result<PathBuf> {
    match path.strip_prefix("~") {
        Ok(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| PuxianError::Config("Cannot determine home directory".to_string()))?;
            Ok(home.join(rest))
        }
        Err(_) => Ok(path.to_path_buf()),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            corpus: CorpusConfig::default(),
            embedding: EmbeddingConfig::default(),
            indexing: IndexingConfig::default(),
            reranker: RerankerConfig::default(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            classifier: ClassifierConfig::default(),
            validation: ValidationConfig::default(),
        }
    }
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("~/.puxian/corpus.txt"),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "bge-small-zh-v1.5".to_string(),
            batch_size: 32,
            timeout: "5s".to_string(),
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        let params = HnswParams::default();
        Self {
            hnsw_m: params.m,
            hnsw_ef_construction: params.ef_construction,
            hnsw_ef_search: params.ef_search,
        }
    }
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "bge-reranker-base".to_string(),
            timeout: "10s".to_string(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8001/v1".to_string(),
            model: None,
            api_key_env: None,
            max_tokens: 512,
            top_p: 0.9,
            generation_timeout: "60s".to_string(),
            classify_timeout: "10s".to_string(),
            expand_timeout: "15s".to_string(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            rrf_k: 60.0,
            dense_timeout: "5s".to_string(),
            max_query_variants: 3,
            request_timeout: "120s".to_string(),
        }
    }
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.9,
            patterns_file: None,
        }
    }
}

impl Default for ValidationConfig {
    fn default() -> Self {
        let settings = ValidatorSettings::default();
        Self {
            low_confidence: settings.low_confidence,
            warn_confidence: settings.warn_confidence,
            max_citations: settings.max_citations,
            preview_chars: settings.preview_chars,
        }
    }
}
