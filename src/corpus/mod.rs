//! Corpus documents and the stores they are loaded from

use crate::error::{PuxianError, Result};
use crate::text::tokenize;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Immutable corpus entry.
///
/// `ordinal` is the document's position in the corpus it was loaded from and
/// is the final tie-breaker wherever two documents score identically.
#[derive(Debug)]
pub struct Document {
    id: String,
    content: String,
    ordinal: usize,
    tokens: OnceLock<Vec<String>>,
}

impl Document {
    pub fn new(id: impl Into<String>, content: impl Into<String>, ordinal: usize) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            ordinal,
            tokens: OnceLock::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Cached tokenization, built on first access
    pub fn tokens(&self) -> &[String] {
        self.tokens.get_or_init(|| tokenize(&self.content))
    }
}

/// Source of the corpus used to build (and rebuild) the indexes
pub trait DocumentStore: Send + Sync {
    /// Every document in corpus order
    fn list_all(&self) -> Result<Vec<Document>>;
}

/// Store backed by a fixed list of `(id, content)` pairs
#[derive(Debug, Clone, Default)]
pub struct InMemoryDocumentStore {
    entries: Vec<(String, String)>,
}

impl InMemoryDocumentStore {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        Self { entries }
    }

    /// Build from bare contents, assigning `doc_<n>` ids
    pub fn from_contents<I, S>(contents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = contents
            .into_iter()
            .enumerate()
            .map(|(i, content)| (format!("doc_{}", i), content.into()))
            .collect();
        Self { entries }
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn list_all(&self) -> Result<Vec<Document>> {
        Ok(self
            .entries
            .iter()
            .enumerate()
            .map(|(ordinal, (id, content))| Document::new(id.clone(), content.clone(), ordinal))
            .collect())
    }
}

#[derive(Debug, Deserialize, Serialize)]
struct JsonlRecord {
    id: String,
    content: String,
}

/// Store reading a corpus file from disk.
///
/// `.jsonl` files hold one `{"id": ..., "content": ...}` object per line; any
/// other file is read as plain text with one document per non-blank line.
#[derive(Debug, Clone)]
pub struct FileDocumentStore {
    path: PathBuf,
}

impl FileDocumentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn is_jsonl(&self) -> bool {
        self.path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("jsonl"))
            .unwrap_or(false)
    }
}

impl DocumentStore for FileDocumentStore {
    fn list_all(&self) -> Result<Vec<Document>> {
        let raw = std::fs::read_to_string(&self.path).map_err(|e| PuxianError::Io {
            source: e,
            context: format!("Failed to read corpus file: {:?}", self.path),
        })?;

        let lines = raw.lines().map(str::trim).filter(|line| !line.is_empty());

        if self.is_jsonl() {
            lines
                .enumerate()
                .map(|(ordinal, line)| {
                    let record: JsonlRecord =
                        serde_json::from_str(line).map_err(|e| PuxianError::Json {
                            source: e,
                            context: format!("Invalid corpus record at line {}", ordinal + 1),
                        })?;
                    Ok(Document::new(record.id, record.content, ordinal))
                })
                .collect()
        } else {
            Ok(lines
                .enumerate()
                .map(|(ordinal, line)| Document::new(format!("doc_{}", ordinal), line, ordinal))
                .collect())
        }
    }
}
