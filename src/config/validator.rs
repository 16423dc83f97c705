use crate::config::{parse_duration, Config, SCHEMA_VERSION};
use crate::embedding::FastEmbedProvider;
use crate::error::{PuxianError, Result, ValidationError};
use crate::retrieval::FastEmbedScorer;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration, reporting every problem at once
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_corpus(config, &mut errors);
        Self::validate_embedding(config, &mut errors);
        Self::validate_indexing(config, &mut errors);
        Self::validate_reranker(config, &mut errors);
        Self::validate_llm(config, &mut errors);
        Self::validate_retrieval(config, &mut errors);
        Self::validate_classifier(config, &mut errors);
        Self::validate_validation(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(PuxianError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_corpus(config: &Config, errors: &mut Vec<ValidationError>) {
        // Existence is checked when the corpus is loaded, not here
        if config.corpus.path.as_os_str().is_empty() {
            errors.push(ValidationError::new(
                "corpus.path",
                "Corpus path cannot be empty",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.embedding.batch_size == 0 {
            errors.push(ValidationError::new(
                "embedding.batch_size",
                "Batch size must be greater than 0",
            ));
        }

        if let Err(e) = FastEmbedProvider::resolve_model(&config.embedding.model) {
            errors.push(ValidationError::new("embedding.model", e.to_string()));
        }

        Self::check_duration("embedding.timeout", &config.embedding.timeout, errors);
    }

    fn validate_indexing(config: &Config, errors: &mut Vec<ValidationError>) {
        let params = [
            ("indexing.hnsw_m", config.indexing.hnsw_m),
            ("indexing.hnsw_ef_construction", config.indexing.hnsw_ef_construction),
            ("indexing.hnsw_ef_search", config.indexing.hnsw_ef_search),
        ];
        for (path, value) in params {
            if value == 0 {
                errors.push(ValidationError::new(path, "Must be greater than 0"));
            }
        }
    }

    fn validate_reranker(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.reranker.enabled {
            if let Err(e) = FastEmbedScorer::new(&config.reranker.model) {
                errors.push(ValidationError::new("reranker.model", e.to_string()));
            }
        }
        Self::check_duration("reranker.timeout", &config.reranker.timeout, errors);
    }

    fn validate_llm(config: &Config, errors: &mut Vec<ValidationError>) {
        let url = &config.llm.base_url;
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            errors.push(ValidationError::new(
                "llm.base_url",
                format!("Base URL must start with http:// or https://, got '{}'", url),
            ));
        }

        // If a key variable is named, it must be set
        if let Some(env_var) = &config.llm.api_key_env {
            match std::env::var(env_var) {
                Ok(key) if key.is_empty() => errors.push(ValidationError::new(
                    "llm.api_key_env",
                    format!("Environment variable {} is empty", env_var),
                )),
                Ok(_) => {}
                Err(_) => errors.push(ValidationError::new(
                    "llm.api_key_env",
                    format!("Environment variable {} is not set", env_var),
                )),
            }
        }

        if config.llm.max_tokens == 0 {
            errors.push(ValidationError::new(
                "llm.max_tokens",
                "max_tokens must be greater than 0",
            ));
        }

        let top_p = config.llm.top_p;
        if !(top_p > 0.0 && top_p <= 1.0) {
            errors.push(ValidationError::new(
                "llm.top_p",
                format!("top_p must be in (0, 1], got {}", top_p),
            ));
        }

        Self::check_duration("llm.generation_timeout", &config.llm.generation_timeout, errors);
        Self::check_duration("llm.classify_timeout", &config.llm.classify_timeout, errors);
        Self::check_duration("llm.expand_timeout", &config.llm.expand_timeout, errors);
    }

    fn validate_retrieval(config: &Config, errors: &mut Vec<ValidationError>) {
        let k = config.retrieval.rrf_k;
        if !k.is_finite() || k < 0.0 {
            errors.push(ValidationError::new(
                "retrieval.rrf_k",
                format!("RRF k must be a non-negative number, got {}", k),
            ));
        }

        if config.retrieval.max_query_variants > 8 {
            errors.push(ValidationError::new(
                "retrieval.max_query_variants",
                format!(
                    "At most 8 query variants are supported, got {}",
                    config.retrieval.max_query_variants
                ),
            ));
        }

        Self::check_duration("retrieval.dense_timeout", &config.retrieval.dense_timeout, errors);
        Self::check_duration(
            "retrieval.request_timeout",
            &config.retrieval.request_timeout,
            errors,
        );
    }

    fn validate_classifier(config: &Config, errors: &mut Vec<ValidationError>) {
        let threshold = config.classifier.confidence_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            errors.push(ValidationError::new(
                "classifier.confidence_threshold",
                format!("Threshold must be between 0.0 and 1.0, got {}", threshold),
            ));
        }

        if let Some(path) = &config.classifier.patterns_file {
            if path.as_os_str().is_empty() {
                errors.push(ValidationError::new(
                    "classifier.patterns_file",
                    "Patterns file path cannot be empty",
                ));
            }
        }
    }

    fn validate_validation(config: &Config, errors: &mut Vec<ValidationError>) {
        let low = config.validation.low_confidence;
        let warn = config.validation.warn_confidence;

        for (path, value) in [
            ("validation.low_confidence", low),
            ("validation.warn_confidence", warn),
        ] {
            if !(0.0..=1.0).contains(&value) {
                errors.push(ValidationError::new(
                    path,
                    format!("Must be between 0.0 and 1.0, got {}", value),
                ));
            }
        }

        if low > warn {
            errors.push(ValidationError::new(
                "validation.low_confidence",
                format!(
                    "low_confidence ({}) cannot exceed warn_confidence ({})",
                    low, warn
                ),
            ));
        }
    }

    fn check_duration(path: &str, value: &str, errors: &mut Vec<ValidationError>) {
        match parse_duration(value) {
            Some(d) if d.is_zero() => errors.push(ValidationError::new(
                path,
                "Duration must be greater than 0",
            )),
            Some(_) => {}
            None => errors.push(ValidationError::new(
                path,
                format!("Invalid duration format: {}", value),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn errors_of(config: &Config) -> Vec<ValidationError> {
        match ConfigValidator::validate(config) {
            Err(PuxianError::ConfigValidation { errors }) => errors,
            other => panic!("expected validation errors, got {:?}", other),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_empty_corpus_path() {
        let mut config = Config::default();
        config.corpus.path = PathBuf::new();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_all_errors_collected() {
        let mut config = Config::default();
        config.embedding.model = "unknown-model".to_string();
        config.llm.generation_timeout = "soon".to_string();
        config.validation.low_confidence = 0.8;

        let errors = errors_of(&config);
        let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
        assert!(paths.contains(&"embedding.model"));
        assert!(paths.contains(&"llm.generation_timeout"));
        assert!(paths.contains(&"validation.low_confidence"));
    }

    #[test]
    fn test_zero_duration_rejected() {
        let mut config = Config::default();
        config.retrieval.request_timeout = "0s".to_string();
        let errors = errors_of(&config);
        assert_eq!(errors[0].path, "retrieval.request_timeout");
    }

    #[test]
    fn test_disabled_reranker_model_not_checked() {
        let mut config = Config::default();
        config.reranker.enabled = false;
        config.reranker.model = "anything".to_string();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_bad_schema_version() {
        let mut config = Config::default();
        config.meta.schema_version = "0.9".to_string();
        let errors = errors_of(&config);
        assert_eq!(errors[0].path, "_meta.schema_version");
    }
}
