//! Pattern registry for configuration-driven query intent detection
//!
//! Intent groups are loaded from TOML (`config-templates/intents.toml` is
//! embedded as the default) and compiled once. Group order in the file is
//! the classifier's priority order.

use crate::error::{PuxianError, Result};
use crate::query::QueryType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Default intent patterns shipped with the crate
pub const DEFAULT_INTENTS: &str = include_str!("../../config-templates/intents.toml");

/// Intent group configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentConfig {
    pub label: String,
    pub patterns: Vec<String>,
    #[serde(default)]
    pub description: String,
}

/// Intent patterns configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntentsConfig {
    pub intent: Vec<IntentConfig>,
}

/// Compiled intent group with pre-compiled regexes
#[derive(Debug, Clone)]
pub struct CompiledIntentGroup {
    pub label: QueryType,
    pub patterns: Vec<Regex>,
    pub description: String,
}

/// A pattern that matched a query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentMatch<'a> {
    pub label: QueryType,
    pub pattern: &'a str,
}

/// Pattern registry with all pre-compiled intent groups, in priority order
#[derive(Debug, Clone)]
pub struct IntentPatternRegistry {
    groups: Vec<CompiledIntentGroup>,
}

impl IntentPatternRegistry {
    /// Registry built from the embedded default patterns
    pub fn embedded() -> Result<Self> {
        Self::from_toml_str(DEFAULT_INTENTS)
    }

    /// Load pattern registry from a configuration file
    pub fn from_config_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| PuxianError::Io {
            source: e,
            context: format!("Failed to read intent patterns: {:?}", path),
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: IntentsConfig = toml::from_str(raw)?;
        Self::from_config(config)
    }

    /// Build pattern registry from parsed configuration
    pub fn from_config(config: IntentsConfig) -> Result<Self> {
        let mut groups: Vec<CompiledIntentGroup> = Vec::with_capacity(config.intent.len());

        for intent in config.intent {
            let label: QueryType = intent.label.parse().map_err(|_| {
                PuxianError::Config(format!("Unknown intent label '{}'", intent.label))
            })?;

            if groups.iter().any(|g| g.label == label) {
                return Err(PuxianError::Config(format!(
                    "Intent label '{}' is defined more than once",
                    label
                )));
            }
            if intent.patterns.is_empty() {
                return Err(PuxianError::Config(format!(
                    "Intent '{}' has no patterns",
                    label
                )));
            }

            let patterns = intent
                .patterns
                .iter()
                .map(|p| {
                    Regex::new(p).map_err(|e| {
                        PuxianError::Config(format!(
                            "Invalid pattern for intent '{}': {}",
                            label, e
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            groups.push(CompiledIntentGroup {
                label,
                patterns,
                description: intent.description,
            });
        }

        tracing::debug!("Loaded {} intent pattern groups", groups.len());

        Ok(Self { groups })
    }

    /// First group, in priority order, with a pattern found in `query`
    pub fn first_match(&self, query: &str) -> Option<IntentMatch<'_>> {
        self.groups.iter().find_map(|group| {
            group
                .patterns
                .iter()
                .find(|regex| regex.is_match(query))
                .map(|regex| IntentMatch {
                    label: group.label,
                    pattern: regex.as_str(),
                })
        })
    }

    pub fn groups(&self) -> &[CompiledIntentGroup] {
        &self.groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_embedded_patterns_compile() {
        let registry = IntentPatternRegistry::embedded().unwrap();
        let labels: Vec<QueryType> = registry.groups().iter().map(|g| g.label).collect();
        assert_eq!(labels, QueryType::ALL.to_vec());
    }

    #[test]
    fn test_first_match_respects_priority() {
        let registry = IntentPatternRegistry::embedded().unwrap();

        // "怎么读" is factual even though the query also asks about usage
        let m = registry.first_match("这个字怎么读，怎么用").unwrap();
        assert_eq!(m.label, QueryType::Factual);
        assert_eq!(m.pattern, "怎么读");

        let m = registry.first_match("食和吃的区别").unwrap();
        assert_eq!(m.label, QueryType::Comparison);

        let m = registry.first_match("食和吃的关系").unwrap();
        assert_eq!(m.pattern, "和.*的关系");

        assert!(registry.first_match("莆田").is_none());
    }

    #[test]
    fn test_invalid_regex_rejected() {
        let raw = r#"
            [[intent]]
            label = "factual"
            patterns = ["(unclosed"]
        "#;
        let err = IntentPatternRegistry::from_toml_str(raw).unwrap_err();
        assert!(err.to_string().contains("factual"));
    }

    #[test]
    fn test_unknown_and_duplicate_labels_rejected() {
        let unknown = r#"
            [[intent]]
            label = "poetry"
            patterns = ["诗"]
        "#;
        assert!(IntentPatternRegistry::from_toml_str(unknown).is_err());

        let duplicate = r#"
            [[intent]]
            label = "factual"
            patterns = ["a"]

            [[intent]]
            label = "factual"
            patterns = ["b"]
        "#;
        assert!(IntentPatternRegistry::from_toml_str(duplicate).is_err());
    }

    #[test]
    fn test_custom_file_order_is_priority() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("intents.toml");
        std::fs::write(
            &path,
            r#"
            [[intent]]
            label = "example"
            patterns = ["怎么"]

            [[intent]]
            label = "factual"
            patterns = ["怎么读"]
            "#,
        )
        .unwrap();

        let registry = IntentPatternRegistry::from_config_file(&path).unwrap();
        assert_eq!(registry.first_match("怎么读").unwrap().label, QueryType::Example);
    }
}
