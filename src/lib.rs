//! Puxian - Adaptive hybrid retrieval for Puxian dialect questions
//!
//! Questions are classified by intent, answered from a local corpus through
//! lexical + dense retrieval, reciprocal rank fusion and cross-encoder
//! reranking, and the generated answer is checked against its sources.

pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod patterns;
pub mod pipeline;
pub mod query;
pub mod retrieval;
pub mod text;
pub mod validation;

pub use error::{PuxianError, Result};
