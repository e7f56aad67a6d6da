//! Content generation — the capability that proposes a rewritten section for a
//! single problem, plus job description parsing.
//!
//! The refinement core holds an `Arc<dyn ContentGenerator>`; which backend
//! runs (`LlmContentGenerator` or `RuleBasedGenerator`) is decided at startup.

pub mod generator;
pub mod jd_parser;
pub mod prompts;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm_client::LlmError;
use crate::models::problem::Problem;
use crate::models::resume::SectionKind;

pub use generator::{LlmContentGenerator, RuleBasedGenerator};

/// Everything a generator may look at when proposing a fix.
#[derive(Debug, Clone, Copy)]
pub struct FixRequest<'a> {
    pub section: &'a SectionKind,
    pub content: &'a str,
    pub problem: &'a Problem,
    /// Candidates already rejected for this problem; must not be offered again.
    pub prior_rejected: &'a [String],
    /// The user's answer after escalation. Authoritative when present.
    pub user_answer: Option<&'a str>,
}

/// Transient generation failures. Each one costs the problem an attempt and
/// never advances its status.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation timed out")]
    Timeout,

    /// Low-confidence or unusable output.
    #[error("Generation rejected: {0}")]
    Rejected(String),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Returns the full candidate content for the section.
    async fn suggest_fix(&self, request: &FixRequest<'_>) -> Result<String, GenerationError>;
}
