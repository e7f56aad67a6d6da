//! Resolution Engine — drives one problem from `Open` to a terminal outcome
//! or to an escalation.
//!
//! Per problem:
//! 1. A recorded user answer is authoritative: it is applied to the section
//!    and validated; if it does not clear the problem the problem is abandoned.
//! 2. `Missing`/`Unverifiable` problems escalate on the first attempt. The
//!    generator is never asked to supply facts.
//! 3. Otherwise the generator proposes candidates (bounded by the shared
//!    capacity semaphore and the generation timeout) until one clears the
//!    problem or `max_auto_attempts` is reached, then the problem escalates.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::assessment::heuristics::EMPTY_SECTION;
use crate::assessment::QualityAssessor;
use crate::config::RefinementConfig;
use crate::errors::RefineError;
use crate::generation::generator::{apply_answer, flagged_term};
use crate::generation::{ContentGenerator, FixRequest, GenerationError};
use crate::models::job::JobRequirement;
use crate::models::problem::{
    Problem, ProblemCategory, ProblemId, ProblemStatus, QueryAnswer, UserQuery,
};
use crate::models::profile::UserProfile;
use crate::models::resume::{Section, SectionKind};
use crate::refinement::ledger::ProblemLedger;
use crate::refinement::overlay::covers_keyword;

/// What a section looks like while one of its problems is being driven.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionContext<'a> {
    pub section: &'a Section,
    /// Requirements the assessor sees for this section (empty without overlay).
    pub requirements: &'a [JobRequirement],
    pub profile: Option<&'a UserProfile>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// The problem is `Resolved`; `content` must be committed on top of
    /// `base_revision`.
    Resolved { content: String, base_revision: u32 },
    /// The problem is `Escalated` and waits for this query's answer.
    Escalated(UserQuery),
    Abandoned,
}

#[derive(Clone)]
pub struct ResolutionEngine {
    generator: Arc<dyn ContentGenerator>,
    assessor: Arc<dyn QualityAssessor>,
    capacity: Arc<Semaphore>,
    max_auto_attempts: u32,
    generation_timeout: Duration,
}

impl ResolutionEngine {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        assessor: Arc<dyn QualityAssessor>,
        config: &RefinementConfig,
    ) -> Self {
        Self {
            generator,
            assessor,
            capacity: Arc::new(Semaphore::new(config.max_concurrent_generations.max(1))),
            max_auto_attempts: config.max_auto_attempts,
            generation_timeout: config.generation_timeout,
        }
    }

    /// Drives problem `id` as far as it can go without the user.
    pub async fn drive(
        &self,
        ledger: &mut ProblemLedger,
        id: ProblemId,
        ctx: ResolutionContext<'_>,
    ) -> Result<Resolution, RefineError> {
        let problem = ledger.get(id).cloned().ok_or(RefineError::UnknownProblem(id))?;

        if problem.status.is_terminal() {
            return Err(RefineError::InvalidTransition {
                id,
                from: problem.status,
                to: ProblemStatus::AttemptingFix,
            });
        }

        match (problem.status, ledger.answer(id).cloned()) {
            (ProblemStatus::Escalated, None) => {
                // Still waiting; hand back the one query this problem owns.
                let query = self.attach_query(ledger, &problem, ctx)?;
                Ok(Resolution::Escalated(query))
            }
            (status, Some(QueryAnswer::Declined)) => {
                if status == ProblemStatus::Open {
                    // Restored after an abort; the answer is already recorded.
                    ledger.update_status(id, ProblemStatus::AttemptingFix)?;
                }
                ledger.update_status(id, ProblemStatus::Abandoned)?;
                warn!(section = %problem.section, problem_id = %id, "user declined; problem abandoned");
                Ok(Resolution::Abandoned)
            }
            (status, Some(QueryAnswer::Provided(answer))) => {
                if status != ProblemStatus::AttemptingFix {
                    ledger.update_status(id, ProblemStatus::AttemptingFix)?;
                }
                self.apply_answer(ledger, &problem, &answer, ctx).await
            }
            (status, None) => {
                if status == ProblemStatus::Open {
                    ledger.update_status(id, ProblemStatus::AttemptingFix)?;
                }
                self.attempt(ledger, &problem, ctx).await
            }
        }
    }

    async fn attempt(
        &self,
        ledger: &mut ProblemLedger,
        problem: &Problem,
        ctx: ResolutionContext<'_>,
    ) -> Result<Resolution, RefineError> {
        let id = problem.id;
        loop {
            if problem.category.requires_ground_truth() {
                debug!(section = %problem.section, problem_id = %id, "needs facts from the user");
                return self.escalate(ledger, problem, ctx);
            }
            if ledger.attempts(id) >= self.max_auto_attempts {
                return self.escalate(ledger, problem, ctx);
            }

            let generated = {
                let request = FixRequest {
                    section: &ctx.section.kind,
                    content: &ctx.section.content,
                    problem,
                    prior_rejected: ledger.rejected_candidates(id),
                    user_answer: None,
                };
                self.generate(&request).await
            };

            match generated {
                Ok(candidate) => {
                    if self.clears(problem, &candidate, ctx).await? {
                        return self.resolve(ledger, problem, candidate, ctx);
                    }
                    let attempts = ledger.record_attempt(id)?;
                    debug!(section = %problem.section, problem_id = %id, attempts, "candidate did not clear problem");
                    ledger.reject_candidate(id, candidate)?;
                }
                Err(e) => {
                    let attempts = ledger.record_attempt(id)?;
                    debug!(section = %problem.section, problem_id = %id, attempts, error = %e, "generation attempt failed");
                }
            }
        }
    }

    /// Post-escalation path. The answer is the only new input: first offered
    /// to the generator, then folded in verbatim. Nothing else is tried.
    async fn apply_answer(
        &self,
        ledger: &mut ProblemLedger,
        problem: &Problem,
        answer: &str,
        ctx: ResolutionContext<'_>,
    ) -> Result<Resolution, RefineError> {
        let id = problem.id;

        let generated = {
            let request = FixRequest {
                section: &ctx.section.kind,
                content: &ctx.section.content,
                problem,
                prior_rejected: ledger.rejected_candidates(id),
                user_answer: Some(answer),
            };
            self.generate(&request).await
        };

        let mut candidates = Vec::with_capacity(2);
        match generated {
            Ok(candidate) => candidates.push(candidate),
            Err(e) => {
                ledger.record_attempt(id)?;
                debug!(section = %problem.section, problem_id = %id, error = %e, "generation with answer failed");
            }
        }
        let verbatim = apply_answer(&ctx.section.content, problem, answer);
        if !candidates.contains(&verbatim) {
            candidates.push(verbatim);
        }

        for candidate in candidates {
            if self.clears(problem, &candidate, ctx).await? {
                return self.resolve(ledger, problem, candidate, ctx);
            }
            ledger.record_attempt(id)?;
            ledger.reject_candidate(id, candidate)?;
        }

        ledger.update_status(id, ProblemStatus::Abandoned)?;
        warn!(section = %problem.section, problem_id = %id, description = %problem.description, "answer did not resolve problem; abandoned");
        Ok(Resolution::Abandoned)
    }

    async fn generate(&self, request: &FixRequest<'_>) -> Result<String, GenerationError> {
        let call = async {
            let _permit = self
                .capacity
                .acquire()
                .await
                .map_err(|_| GenerationError::Rejected("generation capacity closed".into()))?;
            self.generator.suggest_fix(request).await
        };
        match tokio::time::timeout(self.generation_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout),
        }
    }

    /// Re-validation restricted to one problem.
    async fn clears(
        &self,
        problem: &Problem,
        candidate: &str,
        ctx: ResolutionContext<'_>,
    ) -> Result<bool, RefineError> {
        if candidate.trim().is_empty() || candidate.trim() == ctx.section.content.trim() {
            return Ok(false);
        }
        match (&problem.category, &problem.keyword) {
            (ProblemCategory::KeywordGap, Some(keyword)) => Ok(covers_keyword(candidate, keyword)),
            _ => Ok(!self
                .assessor
                .still_present(problem, candidate, ctx.requirements)
                .await?),
        }
    }

    fn resolve(
        &self,
        ledger: &mut ProblemLedger,
        problem: &Problem,
        content: String,
        ctx: ResolutionContext<'_>,
    ) -> Result<Resolution, RefineError> {
        ledger.update_status(problem.id, ProblemStatus::Resolved)?;
        info!(section = %problem.section, problem_id = %problem.id, attempts = ledger.attempts(problem.id), "problem resolved");
        Ok(Resolution::Resolved {
            content,
            base_revision: ctx.section.revision,
        })
    }

    fn escalate(
        &self,
        ledger: &mut ProblemLedger,
        problem: &Problem,
        ctx: ResolutionContext<'_>,
    ) -> Result<Resolution, RefineError> {
        ledger.update_status(problem.id, ProblemStatus::Escalated)?;
        let query = self.attach_query(ledger, problem, ctx)?;
        warn!(
            section = %problem.section,
            problem_id = %problem.id,
            attempts = ledger.attempts(problem.id),
            description = %problem.description,
            "problem escalated to user"
        );
        Ok(Resolution::Escalated(query))
    }

    fn attach_query(
        &self,
        ledger: &mut ProblemLedger,
        problem: &Problem,
        ctx: ResolutionContext<'_>,
    ) -> Result<UserQuery, RefineError> {
        let questions = questions_for(problem, ctx.profile);
        ledger.attach_query(problem.id, UserQuery::new(problem, questions))
    }
}

/// Question text for an escalated problem. The profile only shapes wording.
pub fn questions_for(problem: &Problem, profile: Option<&UserProfile>) -> Vec<String> {
    let title = problem.section.title();
    let context = format!("{title}: {}.", problem.description.trim_end_matches('.'));

    let ask = match problem.category {
        ProblemCategory::Missing if problem.description == EMPTY_SECTION => {
            match (profile, &problem.section) {
                (Some(profile), SectionKind::Summary) => format!(
                    "Describe your experience as a {} in two or three sentences.",
                    profile.target_position.trim()
                ),
                _ => format!("What should the {title} section say? Reply with the facts to include."),
            }
        }
        ProblemCategory::Missing => {
            "What measurable result can you share (a number, percentage, amount or time saved)? Leave blank if there is none.".to_string()
        }
        ProblemCategory::Unverifiable => {
            "What specific figure or example supports this claim? Leave blank to drop it.".to_string()
        }
        ProblemCategory::KeywordGap => match &problem.keyword {
            Some(keyword) => format!(
                "Do you have hands-on experience with {keyword}? If so, say where you used it; otherwise leave blank."
            ),
            None => "Which of your experiences relates to this requirement?".to_string(),
        },
        ProblemCategory::Weak => match flagged_term(&problem.description) {
            Some(term) => format!(
                "Automated rewrites could not fix this. How would you rephrase the line with '{term}'? Your reply replaces that line."
            ),
            None => format!(
                "Automated rewrites could not fix this. Reply with the rewritten {title} section; it replaces the current text."
            ),
        },
    };

    vec![context, ask]
}
