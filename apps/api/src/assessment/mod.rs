//! Quality assessment — the capability boundary that turns section content
//! into a score and a problem list.
//!
//! The refinement core depends only on the `QualityAssessor` trait. The default
//! backend is `HeuristicAssessor` (pure Rust, deterministic); the trait is held
//! as `Arc<dyn QualityAssessor>` so a semantic backend can replace it.

pub mod heuristics;
pub mod impact;

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::RefineError;
use crate::models::job::JobRequirement;
use crate::models::problem::Problem;
use crate::models::resume::SectionKind;

pub use heuristics::HeuristicAssessor;

/// Output of one assessment pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assessment {
    /// 0.0 – 1.0
    pub score: f32,
    pub problems: Vec<Problem>,
    /// Job keywords the content already covers.
    pub keywords: BTreeSet<String>,
}

#[async_trait]
pub trait QualityAssessor: Send + Sync {
    async fn assess(
        &self,
        kind: &SectionKind,
        content: &str,
        requirements: &[JobRequirement],
    ) -> Result<Assessment, RefineError>;

    /// Assessment restricted to one problem: does `content` still exhibit it?
    /// Problems are matched by normalised description.
    async fn still_present(
        &self,
        problem: &Problem,
        content: &str,
        requirements: &[JobRequirement],
    ) -> Result<bool, RefineError> {
        let assessment = self.assess(&problem.section, content, requirements).await?;
        let identity = problem.identity();
        Ok(assessment.problems.iter().any(|p| p.identity() == identity))
    }
}
