//! Answer validation: lexical consistency score, citations and warnings
//!
//! The consistency score is a heuristic, not a calibrated probability: it
//! is the mean share of each supporting document's terms that also occur
//! in the answer, doubled and clamped to `[0, 1]`.

use crate::retrieval::RetrievalHit;
use crate::text::tokenize;
use ahash::AHashSet;
use serde::{Deserialize, Serialize};

/// Answer returned when there is nothing to ground generation on
pub const REFUSAL_ANSWER: &str =
    "抱歉，知识库中没有找到相关信息。建议查阅莆仙方言词典或请教当地的方言使用者。";

pub const NO_DOCUMENTS_WARNING: &str = "no relevant documents";
pub const LOW_CONFIDENCE_WARNING: &str = "此答案置信度较低，建议仔细核对";
pub const UNCERTAIN_WARNING: &str = "此答案可能不完全准确";

const CITATION_HEADER: &str = "\n\n📚 参考来源：\n";

/// Score used when no supporting document has any terms
const NEUTRAL_SCORE: f32 = 0.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ValidatorSettings {
    /// Below this, the answer text gets a visible warning prefix
    pub low_confidence: f32,
    /// Below this, the warning field is set
    pub warn_confidence: f32,
    pub max_citations: usize,
    pub preview_chars: usize,
}

impl Default for ValidatorSettings {
    fn default() -> Self {
        Self {
            low_confidence: 0.5,
            warn_confidence: 0.7,
            max_citations: 3,
            preview_chars: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Answer with citation block and any warning prefix
    pub annotated_answer: String,
    /// The model's answer as generated
    pub raw_answer: String,
    pub confidence: f32,
    pub citations: Vec<String>,
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AnswerValidator {
    settings: ValidatorSettings,
}

impl AnswerValidator {
    pub fn new(settings: ValidatorSettings) -> Self {
        Self { settings }
    }

    /// Refusal result for a request with no supporting documents
    pub fn refusal(&self, raw_answer: &str) -> ValidationResult {
        ValidationResult {
            annotated_answer: REFUSAL_ANSWER.to_string(),
            raw_answer: raw_answer.to_string(),
            confidence: 0.0,
            citations: Vec::new(),
            warning: Some(NO_DOCUMENTS_WARNING.to_string()),
        }
    }

    pub fn validate(&self, _query: &str, answer: &str, hits: &[RetrievalHit]) -> ValidationResult {
        if hits.is_empty() {
            return self.refusal(answer);
        }

        let confidence = self.consistency_score(answer, hits);

        let citations: Vec<String> = hits
            .iter()
            .take(self.settings.max_citations)
            .enumerate()
            .map(|(i, hit)| format!("[{}] {}", i + 1, hit.preview(self.settings.preview_chars)))
            .collect();

        let mut annotated = answer.to_string();
        if !citations.is_empty() {
            annotated.push_str(CITATION_HEADER);
            annotated.push_str(&citations.join("\n"));
        }

        let warning = if confidence < self.settings.low_confidence {
            annotated = format!("⚠️ 注意：{}\n\n{}", LOW_CONFIDENCE_WARNING, annotated);
            Some(LOW_CONFIDENCE_WARNING.to_string())
        } else if confidence < self.settings.warn_confidence {
            Some(UNCERTAIN_WARNING.to_string())
        } else {
            None
        };

        ValidationResult {
            annotated_answer: annotated,
            raw_answer: answer.to_string(),
            confidence,
            citations,
            warning,
        }
    }

    /// Mean per-document overlap `|answer ∩ doc| / |doc|`, doubled, clamped
    pub fn consistency_score(&self, answer: &str, hits: &[RetrievalHit]) -> f32 {
        let answer_terms: AHashSet<String> = tokenize(answer).into_iter().collect();

        let overlaps: Vec<f32> = hits
            .iter()
            .filter_map(|hit| {
                let doc_terms: AHashSet<&String> = hit.document().tokens().iter().collect();
                if doc_terms.is_empty() {
                    return None;
                }
                let shared = doc_terms.iter().filter(|t| answer_terms.contains(**t)).count();
                Some(shared as f32 / doc_terms.len() as f32)
            })
            .collect();

        if overlaps.is_empty() {
            return NEUTRAL_SCORE;
        }

        let mean = overlaps.iter().sum::<f32>() / overlaps.len() as f32;
        (mean * 2.0).clamp(0.0, 1.0)
    }
}
