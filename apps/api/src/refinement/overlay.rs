//! Job Alignment Overlay — weighted keyword coverage of a section against the
//! target role, and the synthetic `KeywordGap` problems that re-open it.

use serde::{Deserialize, Serialize};

use crate::assessment::impact::contains_word;
use crate::models::job::JobRequirement;
use crate::models::problem::{Problem, Severity};
use crate::models::resume::SectionKind;

/// Whole-word, case-insensitive keyword match.
pub fn covers_keyword(content: &str, keyword: &str) -> bool {
    let keyword = keyword.trim().to_lowercase();
    !keyword.is_empty() && contains_word(&content.to_lowercase(), &keyword)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageReport {
    /// Σ weight(matched) / Σ weight(all), in [0, 1].
    pub coverage: f32,
    pub matched: Vec<String>,
    pub missing: Vec<JobRequirement>,
}

#[derive(Debug, Clone)]
pub struct JobAlignmentOverlay {
    requirements: Vec<JobRequirement>,
    threshold: f32,
}

impl JobAlignmentOverlay {
    pub fn new(requirements: Vec<JobRequirement>, threshold: f32) -> Self {
        Self {
            requirements,
            threshold: threshold.clamp(0.0, 1.0),
        }
    }

    pub fn requirements(&self) -> &[JobRequirement] {
        &self.requirements
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Only sections that can carry keywords are measured; a Contact block is
    /// never asked to mention Kubernetes.
    pub fn applies_to(&self, kind: &SectionKind) -> bool {
        !self.requirements.is_empty() && kind.is_keyword_bearing()
    }

    pub fn coverage(&self, content: &str) -> CoverageReport {
        let total: f32 = self.requirements.iter().map(|r| r.weight.max(0.0)).sum();
        let mut matched = Vec::new();
        let mut missing = Vec::new();
        let mut covered = 0.0_f32;

        for req in &self.requirements {
            if covers_keyword(content, &req.keyword) {
                covered += req.weight.max(0.0);
                matched.push(req.keyword.clone());
            } else {
                missing.push(req.clone());
            }
        }

        let coverage = if total > 0.0 {
            (covered / total).clamp(0.0, 1.0)
        } else {
            1.0
        };

        CoverageReport {
            coverage,
            matched,
            missing,
        }
    }

    pub fn is_below_threshold(&self, report: &CoverageReport) -> bool {
        report.coverage < self.threshold
    }

    /// One `KeywordGap` problem per missing requirement, severity scaled by
    /// its weight and level.
    pub fn gap_problems(&self, kind: &SectionKind, report: &CoverageReport) -> Vec<Problem> {
        report
            .missing
            .iter()
            .map(|req| {
                Problem::keyword_gap(
                    kind.clone(),
                    &req.keyword,
                    Severity::from_weight(req.weight, req.is_required()),
                )
            })
            .collect()
    }
}
