use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::resume::SectionKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProblemId(pub Uuid);

impl ProblemId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProblemId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProblemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProblemCategory {
    /// Required content is absent (a metric, a date, the section itself).
    Missing,
    /// Content exists but reads poorly; safe to rewrite automatically.
    Weak,
    /// A claim that only the user can substantiate.
    Unverifiable,
    /// A job keyword the section does not cover.
    KeywordGap,
}

impl ProblemCategory {
    /// Categories whose fix needs facts from the user. Automated generation
    /// must never be asked to fill these in.
    pub fn requires_ground_truth(self) -> bool {
        matches!(self, ProblemCategory::Missing | ProblemCategory::Unverifiable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Scales a job requirement's weight into a severity. Preferred keywords
    /// count for 60% of a required one.
    pub fn from_weight(weight: f32, required: bool) -> Self {
        let scaled = weight.clamp(0.0, 1.0) * if required { 1.0 } else { 0.6 };
        if scaled >= 0.75 {
            Severity::High
        } else if scaled >= 0.4 {
            Severity::Medium
        } else {
            Severity::Low
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProblemStatus {
    Open,
    AttemptingFix,
    Escalated,
    Resolved,
    Abandoned,
}

impl ProblemStatus {
    /// Lifecycle edges. The only backward edge is `Escalated → AttemptingFix`
    /// (a user answer arrived); `AttemptingFix → Open` exists solely for abort
    /// rollback and is not reachable through this table.
    pub fn can_transition_to(self, next: ProblemStatus) -> bool {
        use ProblemStatus::*;
        matches!(
            (self, next),
            (Open, AttemptingFix)
                | (AttemptingFix, Resolved)
                | (AttemptingFix, Escalated)
                | (AttemptingFix, Abandoned)
                | (Escalated, AttemptingFix)
                | (Escalated, Resolved)
                | (Escalated, Abandoned)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProblemStatus::Resolved | ProblemStatus::Abandoned)
    }
}

impl fmt::Display for ProblemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ProblemStatus::Open => "open",
            ProblemStatus::AttemptingFix => "attempting_fix",
            ProblemStatus::Escalated => "escalated",
            ProblemStatus::Resolved => "resolved",
            ProblemStatus::Abandoned => "abandoned",
        };
        write!(f, "{label}")
    }
}

/// A single identified quality or completeness issue in one section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Problem {
    pub id: ProblemId,
    pub section: SectionKind,
    pub description: String,
    pub severity: Severity,
    pub category: ProblemCategory,
    pub status: ProblemStatus,
    /// Set for `KeywordGap` problems: the job keyword that must appear.
    #[serde(default)]
    pub keyword: Option<String>,
    pub discovered_at: DateTime<Utc>,
}

impl Problem {
    pub fn new(
        section: SectionKind,
        description: impl Into<String>,
        severity: Severity,
        category: ProblemCategory,
    ) -> Self {
        Self {
            id: ProblemId::new(),
            section,
            description: description.into(),
            severity,
            category,
            status: ProblemStatus::Open,
            keyword: None,
            discovered_at: Utc::now(),
        }
    }

    pub fn keyword_gap(section: SectionKind, keyword: &str, severity: Severity) -> Self {
        let mut problem = Self::new(
            section,
            format!("Missing job keyword '{}'", keyword.to_lowercase()),
            severity,
            ProblemCategory::KeywordGap,
        );
        problem.keyword = Some(keyword.to_string());
        problem
    }

    /// Identity key: two problems with the same normalised description in the
    /// same section are the same problem.
    pub fn identity(&self) -> String {
        normalize_description(&self.description)
    }
}

/// Lowercases, collapses whitespace and strips trailing punctuation.
pub fn normalize_description(description: &str) -> String {
    description
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
        .trim_end_matches(|c: char| c == '.' || c == '!' || c == '?' || c == ';')
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum QueryAnswer {
    Provided(String),
    /// The user declined, or the answer window timed out.
    Declined,
}

impl QueryAnswer {
    /// Empty or whitespace-only replies count as a decline.
    pub fn from_reply(reply: Option<String>) -> Self {
        match reply {
            Some(text) if !text.trim().is_empty() => QueryAnswer::Provided(text.trim().to_string()),
            _ => QueryAnswer::Declined,
        }
    }
}

/// A pending request for information only the user has. Exactly one per
/// escalated problem; answered at most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserQuery {
    pub id: Uuid,
    pub problem_id: ProblemId,
    pub section: SectionKind,
    pub questions: Vec<String>,
    #[serde(default)]
    pub answer: Option<QueryAnswer>,
    pub asked_at: DateTime<Utc>,
    #[serde(default)]
    pub answered_at: Option<DateTime<Utc>>,
}

impl UserQuery {
    pub fn new(problem: &Problem, questions: Vec<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            problem_id: problem.id,
            section: problem.section.clone(),
            questions,
            answer: None,
            asked_at: Utc::now(),
            answered_at: None,
        }
    }

    pub fn is_answered(&self) -> bool {
        self.answer.is_some()
    }
}
