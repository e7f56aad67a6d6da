//! Rule-based quality assessor. Deterministic: the same content always yields
//! the same problem descriptions, which is what lets the ledger recognise a
//! problem across re-assessments.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::assessment::impact::{
    claim_lines, contains_word, informal_words, is_quantified, unquantified_scale_words,
    unquantified_vague_verbs,
};
use crate::assessment::{Assessment, QualityAssessor};
use crate::errors::RefineError;
use crate::models::job::JobRequirement;
use crate::models::problem::{Problem, ProblemCategory, Severity};
use crate::models::resume::SectionKind;
use crate::refinement::overlay::covers_keyword;

const ACTION_VERBS: &[&str] = &[
    "achieved",
    "architected",
    "built",
    "created",
    "delivered",
    "designed",
    "developed",
    "drove",
    "implemented",
    "increased",
    "launched",
    "led",
    "managed",
    "optimized",
    "reduced",
    "shipped",
];

pub const EMPTY_SECTION: &str = "Section is empty";
pub const NO_METRIC: &str = "No quantifiable metric";
pub const NEEDS_DETAIL: &str = "Section needs more detail";
pub const TOO_LONG: &str = "Section is too long";
pub const NO_ACTION_VERBS: &str = "No strong action verbs";

/// Word-count bounds: (min, max) for narrative and other sections.
const NARRATIVE_WORDS: (usize, usize) = (20, 200);
const OTHER_WORDS: (usize, usize) = (5, 100);

#[derive(Debug, Clone, Default)]
pub struct HeuristicAssessor;

#[async_trait]
impl QualityAssessor for HeuristicAssessor {
    async fn assess(
        &self,
        kind: &SectionKind,
        content: &str,
        requirements: &[JobRequirement],
    ) -> Result<Assessment, RefineError> {
        Ok(assess_content(kind, content, requirements))
    }
}

/// Synchronous core of `HeuristicAssessor`.
pub fn assess_content(
    kind: &SectionKind,
    content: &str,
    requirements: &[JobRequirement],
) -> Assessment {
    let keywords: BTreeSet<String> = requirements
        .iter()
        .filter(|r| covers_keyword(content, &r.keyword))
        .map(|r| r.keyword.to_lowercase())
        .collect();

    if content.trim().is_empty() {
        return Assessment {
            score: 0.0,
            problems: vec![Problem::new(
                kind.clone(),
                EMPTY_SECTION,
                Severity::Critical,
                ProblemCategory::Missing,
            )],
            keywords,
        };
    }

    let problems = find_problems(kind, content);
    Assessment {
        score: score_content(kind, content),
        problems,
        keywords,
    }
}

fn find_problems(kind: &SectionKind, content: &str) -> Vec<Problem> {
    let mut problems = Vec::new();
    let mut push = |description: String, severity: Severity, category: ProblemCategory| {
        problems.push(Problem::new(kind.clone(), description, severity, category));
    };

    let word_count = content.split_whitespace().count();
    let (min_words, max_words) = word_bounds(kind);

    if kind.is_narrative() {
        if !claim_lines(content).iter().any(|line| is_quantified(line)) {
            push(NO_METRIC.to_string(), Severity::High, ProblemCategory::Missing);
        }
        if word_count < min_words {
            push(NEEDS_DETAIL.to_string(), Severity::Medium, ProblemCategory::Missing);
        }
        for verb in unquantified_vague_verbs(content) {
            push(
                format!("Vague verb '{verb}' without quantified impact"),
                Severity::Medium,
                ProblemCategory::Weak,
            );
        }
        for word in unquantified_scale_words(content) {
            push(
                format!("Unsupported scale claim '{word}'"),
                Severity::Medium,
                ProblemCategory::Unverifiable,
            );
        }
    }

    if *kind == SectionKind::Experience && !has_action_verb(content) {
        push(NO_ACTION_VERBS.to_string(), Severity::Low, ProblemCategory::Weak);
    }

    if word_count > max_words {
        push(TOO_LONG.to_string(), Severity::Low, ProblemCategory::Weak);
    }

    for word in informal_words(content) {
        push(
            format!("Informal word '{word}'"),
            Severity::Low,
            ProblemCategory::Weak,
        );
    }

    problems
}

/// Weighted quality score in [0, 1]: length within bounds (0.3), action verbs
/// for experience (up to 0.3), quantified results (0.2), professional
/// language (0.2). Normalised by the points available for the section kind.
pub fn score_content(kind: &SectionKind, content: &str) -> f32 {
    if content.trim().is_empty() {
        return 0.0;
    }

    let mut earned = 0.0_f32;
    let mut available = 0.7_f32;

    let word_count = content.split_whitespace().count();
    let (min_words, max_words) = word_bounds(kind);
    if (min_words..=max_words).contains(&word_count) {
        earned += 0.3;
    }

    if *kind == SectionKind::Experience {
        available += 0.3;
        let lower = content.to_lowercase();
        let verbs = ACTION_VERBS
            .iter()
            .filter(|v| contains_word(&lower, v))
            .count();
        earned += (verbs as f32 / 3.0).min(1.0) * 0.3;
    }

    if claim_lines(content).iter().any(|line| is_quantified(line)) {
        earned += 0.2;
    }

    if informal_words(content).is_empty() {
        earned += 0.2;
    }

    (earned / available).clamp(0.0, 1.0)
}

fn word_bounds(kind: &SectionKind) -> (usize, usize) {
    if kind.is_narrative() {
        NARRATIVE_WORDS
    } else {
        OTHER_WORDS
    }
}

fn has_action_verb(content: &str) -> bool {
    let lower = content.to_lowercase();
    ACTION_VERBS.iter().any(|v| contains_word(&lower, v))
}
