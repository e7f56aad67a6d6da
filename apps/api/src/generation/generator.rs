//! Content generator backends.
//!
//! `LlmContentGenerator` asks Claude for a JSON rewrite; `RuleBasedGenerator`
//! only applies mechanical clean-ups and applies user answers verbatim. Neither
//! may introduce a fact the section or the user did not supply.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::assessment::impact::{claim_lines, informal_words};
use crate::generation::prompts::{FIX_PROMPT_TEMPLATE, FIX_ROLE};
use crate::generation::{ContentGenerator, FixRequest, GenerationError};
use crate::llm_client::prompts::{json_system, NO_FABRICATION_INSTRUCTION};
use crate::llm_client::LlmClient;
use crate::models::problem::{Problem, ProblemCategory};

/// Below this self-reported confidence an LLM rewrite is rejected.
const MIN_CONFIDENCE: f32 = 0.5;

// ────────────────────────────────────────────────────────────────────────────
// LLM backend
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct FixResponse {
    content: String,
    #[serde(default)]
    confidence: f32,
}

pub struct LlmContentGenerator {
    llm: LlmClient,
    system: String,
}

impl LlmContentGenerator {
    pub fn new(llm: LlmClient) -> Self {
        Self {
            llm,
            system: json_system(FIX_ROLE),
        }
    }
}

#[async_trait]
impl ContentGenerator for LlmContentGenerator {
    async fn suggest_fix(&self, request: &FixRequest<'_>) -> Result<String, GenerationError> {
        let prompt = build_fix_prompt(request);
        let response: FixResponse = self.llm.call_json(&prompt, &self.system).await?;
        accept_response(request, response)
    }
}

/// Fills the fix prompt template for one request.
pub fn build_fix_prompt(request: &FixRequest<'_>) -> String {
    let rejected = if request.prior_rejected.is_empty() {
        "(none)".to_string()
    } else {
        request
            .prior_rejected
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{}. {}", i + 1, c))
            .collect::<Vec<_>>()
            .join("\n")
    };

    FIX_PROMPT_TEMPLATE
        .replace("{no_fabrication}", NO_FABRICATION_INSTRUCTION)
        .replace("{section}", &request.section.title())
        .replace("{category}", &format!("{:?}", request.problem.category))
        .replace("{problem}", &request.problem.description)
        .replace("{rejected}", &rejected)
        .replace("{answer}", request.user_answer.unwrap_or("(none)"))
        .replace("{content}", request.content)
}

fn accept_response(
    request: &FixRequest<'_>,
    response: FixResponse,
) -> Result<String, GenerationError> {
    let content = response.content.trim().to_string();
    if content.is_empty() {
        return Err(GenerationError::Rejected("empty rewrite".into()));
    }
    if response.confidence < MIN_CONFIDENCE {
        return Err(GenerationError::Rejected(format!(
            "confidence {:.2} below {MIN_CONFIDENCE}",
            response.confidence
        )));
    }
    if content == request.content.trim() {
        return Err(GenerationError::Rejected("rewrite left content unchanged".into()));
    }
    if request.prior_rejected.iter().any(|c| c.trim() == content) {
        return Err(GenerationError::Rejected("rewrite repeats a rejected candidate".into()));
    }
    Ok(content)
}

// ────────────────────────────────────────────────────────────────────────────
// Rule-based backend
// ────────────────────────────────────────────────────────────────────────────

/// Deterministic fallback used when no API key is configured.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedGenerator;

#[async_trait]
impl ContentGenerator for RuleBasedGenerator {
    async fn suggest_fix(&self, request: &FixRequest<'_>) -> Result<String, GenerationError> {
        if let Some(answer) = request.user_answer {
            return Ok(apply_answer(request.content, request.problem, answer));
        }

        // Adding a keyword or a fact is never a mechanical edit.
        if request.problem.category != ProblemCategory::Weak {
            return Err(GenerationError::Rejected(format!(
                "no rule-based rewrite for {:?} problems",
                request.problem.category
            )));
        }

        let candidate = tidy(request.content);
        if candidate == request.content.trim()
            || request.prior_rejected.iter().any(|c| c == &candidate)
        {
            return Err(GenerationError::Rejected("no rule-based rewrite applies".into()));
        }
        debug!(section = %request.section, "rule-based rewrite produced");
        Ok(candidate)
    }
}

/// Applies a user answer as authoritative content. Answers to `Weak`
/// problems are rephrasings: they replace the line holding the quoted term,
/// or the whole section when the problem names none. Any other answer is a
/// new fact and is folded in with [`incorporate_answer`].
pub fn apply_answer(content: &str, problem: &Problem, answer: &str) -> String {
    if problem.category != ProblemCategory::Weak || content.trim().is_empty() {
        return incorporate_answer(content, answer);
    }
    match flagged_term(&problem.description) {
        Some(term) => replace_line_with(content, term, answer)
            .unwrap_or_else(|| incorporate_answer(content, answer)),
        None => answer.trim().to_string(),
    }
}

/// The term a problem quotes, e.g. `stuff` in "Informal word 'stuff'".
pub fn flagged_term(description: &str) -> Option<&str> {
    let (_, rest) = description.split_once('\'')?;
    let (term, _) = rest.split_once('\'')?;
    let term = term.trim();
    (!term.is_empty()).then_some(term)
}

fn replace_line_with(content: &str, term: &str, answer: &str) -> Option<String> {
    let term = term.to_lowercase();
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let index = lines
        .iter()
        .position(|line| line.to_lowercase().contains(&term))?;

    let line = &lines[index];
    let indent = &line[..line.len() - line.trim_start().len()];
    let marker = ["- ", "* ", "• "]
        .into_iter()
        .find(|m| line.trim_start().starts_with(m))
        .unwrap_or("");
    let body = ["- ", "* ", "• "]
        .into_iter()
        .find_map(|m| answer.trim().strip_prefix(m))
        .unwrap_or(answer.trim());

    let replacement = format!("{indent}{marker}{}", as_sentence(body));
    lines[index] = replacement;
    Some(lines.join("\n"))
}

/// Folds a user answer into section content without rewording it: a new
/// bullet when the section is bulleted, otherwise a closing sentence.
pub fn incorporate_answer(content: &str, answer: &str) -> String {
    let answer = as_sentence(answer);
    let content = content.trim_end();
    if content.trim().is_empty() {
        return answer;
    }

    let bullet = content
        .lines()
        .map(str::trim_start)
        .find_map(|line| {
            ["- ", "* ", "• "]
                .into_iter()
                .find(|marker| line.starts_with(marker))
        });

    match bullet {
        Some(marker) => format!("{content}\n{marker}{answer}"),
        None => format!("{content} {answer}"),
    }
}

/// Removes informal filler words, collapses runs of spaces and capitalises
/// each line. Bullet markers and line structure are preserved.
pub fn tidy(content: &str) -> String {
    let informal = informal_words(content);
    content
        .trim()
        .lines()
        .map(|line| tidy_line(line, &informal))
        .collect::<Vec<_>>()
        .join("\n")
}

fn tidy_line(line: &str, informal: &[&str]) -> String {
    let trimmed = line.trim();
    let (marker, body) = ["- ", "* ", "• "]
        .into_iter()
        .find_map(|m| trimmed.strip_prefix(m).map(|rest| (m, rest)))
        .unwrap_or(("", trimmed));

    let words: Vec<&str> = body
        .split_whitespace()
        .filter(|word| {
            let bare = word
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            !informal.contains(&bare.as_str())
        })
        .collect();

    if words.is_empty() && !claim_lines(body).is_empty() {
        // Never blank a line that only held filler; keep the original.
        return trimmed.to_string();
    }

    format!("{marker}{}", capitalize(&words.join(" ")))
}

fn as_sentence(text: &str) -> String {
    let text = capitalize(text.trim());
    if text.ends_with(['.', '!', '?']) {
        text
    } else {
        format!("{text}.")
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
