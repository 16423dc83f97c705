use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for Puxian
#[derive(Error, Debug)]
pub enum PuxianError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration validation errors
    #[error("Configuration validation failed: {errors:?}")]
    ConfigValidation { errors: Vec<ValidationError> },

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Invalid configuration value
    #[error("Invalid configuration value at {path}: {message}")]
    InvalidConfigValue { path: String, message: String },

    /// IO errors
    #[error("IO error: {context}: {source}")]
    Io {
        source: std::io::Error,
        context: String,
    },

    /// TOML deserialization errors
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization errors
    #[error("TOML serialization error: {0}")]
    TomlSerialization(#[from] toml::ser::Error),

    /// JSON errors
    #[error("JSON error: {context}: {source}")]
    Json {
        source: serde_json::Error,
        context: String,
    },

    /// The corpus has no documents to index
    #[error("Corpus is empty")]
    EmptyCorpus,

    /// Two corpus entries share an id
    #[error("Duplicate document id in corpus: {id}")]
    DuplicateDocumentId { id: String },

    /// A scoring or search backend could not be reached
    #[error("Backend unavailable: {backend}: {reason}")]
    BackendUnavailable { backend: String, reason: String },

    /// The model-based classifier produced nothing usable
    #[error("Query classification failed: {0}")]
    ClassificationFailed(String),

    /// Answer generation failed
    #[error("Generation failed: {0}")]
    GenerationFailed(String),

    /// Answer generation did not finish within its deadline
    #[error("Generation timed out after {after:?}")]
    GenerationTimeout { after: Duration },

    /// The whole request exceeded its deadline
    #[error("Request timed out after {after:?}")]
    RequestTimeout { after: Duration },

    /// Rejected query input
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Generic errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PuxianError {
    /// Whether the caller may retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PuxianError::GenerationFailed(_)
                | PuxianError::GenerationTimeout { .. }
                | PuxianError::RequestTimeout { .. }
        )
    }
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Path to the configuration key that failed validation
    pub path: String,
    /// Error message describing the validation failure
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Result type for Puxian operations
pub type Result<T> = std::result::Result<T, PuxianError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_errors_are_retryable() {
        assert!(PuxianError::GenerationFailed("boom".to_string()).is_retryable());
        assert!(PuxianError::GenerationTimeout {
            after: Duration::from_secs(1)
        }
        .is_retryable());
        assert!(!PuxianError::EmptyCorpus.is_retryable());
    }
}
