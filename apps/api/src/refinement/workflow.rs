//! Segment Workflow — the per-section state machine.
//!
//! `Discovering → Assessing → Resolving → Finalizing → Done`
//!
//! Resolving drives one actionable problem at a time and returns to Assessing
//! after every committed fix, so the next problem is always picked from an
//! assessment of the current content. `Open` problems the new assessment no
//! longer reports are retired as resolved. Escalated problems are parked while the
//! rest of the section continues; their questions go to the broker as one
//! batch once nothing else is actionable. The workflow owns its section and
//! ledger outright and reports to the orchestrator only through events.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::assessment::QualityAssessor;
use crate::errors::RefineError;
use crate::generation::generator::incorporate_answer;
use crate::models::job::JobRequirement;
use crate::models::problem::{
    Problem, ProblemCategory, ProblemId, ProblemStatus, QueryAnswer, UserQuery,
};
use crate::models::profile::UserProfile;
use crate::models::resume::{Section, SectionKind, SectionStatus};
use crate::refinement::broker::{AnsweredQuery, Escalation};
use crate::refinement::checkpoint::SectionCheckpoint;
use crate::refinement::ledger::ProblemLedger;
use crate::refinement::overlay::{covers_keyword, JobAlignmentOverlay};
use crate::refinement::resolution::{Resolution, ResolutionContext, ResolutionEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    Discovering,
    Assessing,
    Resolving,
    Finalizing,
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Convergence {
    Converged,
    /// Iteration cap hit; the section was finalized best-effort.
    ConvergenceFailure,
    Aborted,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionOutcome {
    pub convergence: Convergence,
    pub iterations: u32,
    /// Last measured keyword coverage, for sections the overlay applies to.
    pub coverage: Option<f32>,
    /// Coverage stayed below threshold after the single re-opening.
    pub coverage_shortfall: bool,
}

impl SectionOutcome {
    /// A finished section that a resumed run keeps as-is.
    pub fn is_final(&self) -> bool {
        self.convergence != Convergence::Aborted
    }
}

/// Messages from a workflow to the orchestrator, in emission order.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// A new section value; the orchestrator bumps the document version.
    Committed(Section),
    Checkpoint(SectionCheckpoint),
}

/// User-supplied material the Discovering state assembles into content.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoverySeed {
    pub draft: String,
    /// Extra facts for this section (prior answers, notes).
    pub notes: Vec<String>,
}

impl DiscoverySeed {
    pub fn content(&self) -> String {
        let mut content = self.draft.trim().to_string();
        for note in &self.notes {
            let note = note.trim();
            if !note.is_empty() && !content.contains(note) {
                content = incorporate_answer(&content, note);
            }
        }
        content
    }
}

/// Shared collaborators handed to every workflow of a run.
#[derive(Clone)]
pub struct WorkflowDeps {
    pub engine: ResolutionEngine,
    pub assessor: Arc<dyn QualityAssessor>,
    pub overlay: Option<Arc<JobAlignmentOverlay>>,
    pub escalations: mpsc::UnboundedSender<Escalation>,
    pub events: mpsc::UnboundedSender<WorkflowEvent>,
    pub abort: CancellationToken,
    pub profile: Option<Arc<UserProfile>>,
    pub max_iterations: u32,
    /// Upper bound on waiting for one batch of answers, broker queueing included.
    pub answer_wait: Duration,
}

enum Step {
    Continue,
    Aborted,
}

pub struct SegmentWorkflow {
    section: Section,
    ledger: ProblemLedger,
    state: WorkflowState,
    iterations: u32,
    overlay_reopened: bool,
    coverage: Option<f32>,
    coverage_shortfall: bool,
    outcome: Option<SectionOutcome>,
    seed: Option<DiscoverySeed>,
    /// Escalated problems whose answers have not arrived.
    pending: BTreeSet<ProblemId>,
    outbox: Vec<UserQuery>,
    awaiting: Option<oneshot::Receiver<Vec<AnsweredQuery>>>,
    deps: WorkflowDeps,
}

impl SegmentWorkflow {
    pub fn new(kind: SectionKind, seed: DiscoverySeed, deps: WorkflowDeps) -> Self {
        Self {
            section: Section::new(kind.clone(), ""),
            ledger: ProblemLedger::new(kind),
            state: WorkflowState::Discovering,
            iterations: 0,
            overlay_reopened: false,
            coverage: None,
            coverage_shortfall: false,
            outcome: None,
            seed: Some(seed),
            pending: BTreeSet::new(),
            outbox: Vec::new(),
            awaiting: None,
            deps,
        }
    }

    /// Continues an interrupted section from its last checkpoint. In-flight
    /// fixes go back to `Open`; recorded answers are kept and used.
    pub fn restore(checkpoint: SectionCheckpoint, deps: WorkflowDeps) -> Self {
        let mut ledger = checkpoint.ledger;
        let reverted = ledger.revert_in_flight();
        let state = match checkpoint.seed {
            Some(_) => WorkflowState::Discovering,
            None => WorkflowState::Assessing,
        };
        debug!(section = %checkpoint.section.kind, reverted, ?state, "restoring workflow");
        Self {
            section: checkpoint.section,
            ledger,
            state,
            iterations: checkpoint.iterations,
            overlay_reopened: checkpoint.overlay_reopened,
            coverage: None,
            coverage_shortfall: false,
            outcome: None,
            seed: checkpoint.seed,
            pending: BTreeSet::new(),
            outbox: Vec::new(),
            awaiting: None,
            deps,
        }
    }

    pub fn kind(&self) -> &SectionKind {
        &self.section.kind
    }

    /// Runs to `Done` (clean or degraded) or until the run is aborted.
    pub async fn run(mut self) -> Result<SectionCheckpoint, RefineError> {
        loop {
            if self.deps.abort.is_cancelled() {
                return Ok(self.abort());
            }
            match self.state {
                WorkflowState::Discovering => self.discover()?,
                WorkflowState::Assessing => self.assess().await?,
                WorkflowState::Resolving => {
                    if let Step::Aborted = self.resolve_step().await? {
                        return Ok(self.abort());
                    }
                }
                WorkflowState::Finalizing => self.finalize()?,
                WorkflowState::Done => return Ok(self.checkpoint()),
            }
        }
    }

    fn discover(&mut self) -> Result<(), RefineError> {
        if let Some(seed) = self.seed.take() {
            let content = seed.content();
            if content != self.section.content {
                self.section = self.section.replace_content(self.section.revision, content)?;
                self.emit(WorkflowEvent::Committed(self.section.clone()));
            }
        }
        self.emit_checkpoint();
        self.transition(WorkflowState::Assessing);
        Ok(())
    }

    async fn assess(&mut self) -> Result<(), RefineError> {
        let requirements = overlay_requirements(&self.deps.overlay, &self.section.kind);
        let assessment = self
            .deps
            .assessor
            .assess(&self.section.kind, &self.section.content, requirements)
            .await?;

        let present: BTreeSet<String> = assessment.problems.iter().map(Problem::identity).collect();
        let before = self.ledger.len();
        for problem in assessment.problems {
            self.ledger.record(problem);
        }
        let retired = self.retire_stale(&present)?;
        debug!(
            section = %self.section.kind,
            score = assessment.score,
            new_problems = self.ledger.len() - before,
            retired,
            "section assessed"
        );

        self.section = self
            .section
            .with_assessment(assessment.score, assessment.keywords);
        self.transition(WorkflowState::Resolving);
        Ok(())
    }

    /// Resolves `Open` problems the current content no longer exhibits.
    /// Parked and in-flight problems are left alone.
    fn retire_stale(&mut self, present: &BTreeSet<String>) -> Result<usize, RefineError> {
        let stale: Vec<ProblemId> = self
            .ledger
            .problems()
            .filter(|p| p.status == ProblemStatus::Open && !self.pending.contains(&p.id))
            .filter(|p| match (p.category, p.keyword.as_deref()) {
                // Overlay gaps are not reported by the assessor; check the keyword itself.
                (ProblemCategory::KeywordGap, Some(keyword)) => {
                    !present.contains(&p.identity()) && covers_keyword(&self.section.content, keyword)
                }
                _ => !present.contains(&p.identity()),
            })
            .map(|p| p.id)
            .collect();

        for id in &stale {
            self.ledger.retire(*id)?;
        }
        Ok(stale.len())
    }

    async fn resolve_step(&mut self) -> Result<Step, RefineError> {
        let next = self
            .ledger
            .open_problems()
            .into_iter()
            .find(|p| !self.pending.contains(&p.id))
            .map(|p| p.id);

        let Some(id) = next else {
            return self.idle().await;
        };

        if self.iterations >= self.deps.max_iterations {
            self.fail_convergence()?;
            return Ok(Step::Continue);
        }
        self.iterations += 1;

        let ctx = ResolutionContext {
            section: &self.section,
            requirements: overlay_requirements(&self.deps.overlay, &self.section.kind),
            profile: self.deps.profile.as_deref(),
        };
        let outcome = tokio::select! {
            _ = self.deps.abort.cancelled() => None,
            result = self.deps.engine.drive(&mut self.ledger, id, ctx) => Some(result),
        };
        let Some(result) = outcome else {
            return Ok(Step::Aborted);
        };

        match result? {
            Resolution::Resolved {
                content,
                base_revision,
            } => {
                self.section = self.section.replace_content(base_revision, content)?;
                self.emit(WorkflowEvent::Committed(self.section.clone()));
                self.emit_checkpoint();
                self.transition(WorkflowState::Assessing);
            }
            Resolution::Escalated(query) => {
                if self.pending.insert(id) {
                    self.outbox.push(query);
                }
            }
            Resolution::Abandoned => {
                self.pending.remove(&id);
                self.emit_checkpoint();
            }
        }
        Ok(Step::Continue)
    }

    /// Nothing is actionable: ask, wait, or move on to Finalizing.
    async fn idle(&mut self) -> Result<Step, RefineError> {
        if let Some(reply) = self.awaiting.take() {
            return self.await_answers(reply).await;
        }
        if !self.outbox.is_empty() {
            self.submit_outbox()?;
            return Ok(Step::Continue);
        }
        self.transition(WorkflowState::Finalizing);
        Ok(Step::Continue)
    }

    fn submit_outbox(&mut self) -> Result<(), RefineError> {
        // Persist the resumption point before suspending.
        self.emit_checkpoint();

        let (reply, receiver) = oneshot::channel();
        let escalation = Escalation {
            section: self.section.kind.clone(),
            queries: std::mem::take(&mut self.outbox),
            reply,
        };
        info!(section = %self.section.kind, queries = escalation.queries.len(), "submitting questions to user");

        match self.deps.escalations.send(escalation) {
            Ok(()) => self.awaiting = Some(receiver),
            Err(_) => {
                warn!(section = %self.section.kind, "interaction broker unavailable; declining questions");
                self.decline_pending()?;
            }
        }
        Ok(())
    }

    async fn await_answers(
        &mut self,
        reply: oneshot::Receiver<Vec<AnsweredQuery>>,
    ) -> Result<Step, RefineError> {
        let received = tokio::select! {
            _ = self.deps.abort.cancelled() => return Ok(Step::Aborted),
            received = tokio::time::timeout(self.deps.answer_wait, reply) => received,
        };

        match received {
            Ok(Ok(answers)) => {
                for answered in answers {
                    if self.pending.remove(&answered.problem_id) {
                        self.ledger
                            .record_answer(answered.problem_id, answered.answer)?;
                    }
                }
            }
            Ok(Err(_)) => {
                warn!(section = %self.section.kind, "question batch dropped without answers");
            }
            Err(_) => {
                warn!(section = %self.section.kind, "timed out waiting for answers");
            }
        }

        // Anything still unanswered counts as declined.
        self.decline_pending()?;
        self.emit_checkpoint();
        Ok(Step::Continue)
    }

    fn decline_pending(&mut self) -> Result<(), RefineError> {
        for id in std::mem::take(&mut self.pending) {
            self.ledger.record_answer(id, QueryAnswer::Declined)?;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), RefineError> {
        if self.ledger.has_unresolved() {
            self.transition(WorkflowState::Resolving);
            return Ok(());
        }

        let overlay = self
            .deps
            .overlay
            .clone()
            .filter(|o| o.applies_to(&self.section.kind));

        if let Some(overlay) = overlay {
            let report = overlay.coverage(&self.section.content);
            self.coverage = Some(report.coverage);

            if overlay.is_below_threshold(&report) {
                if !self.overlay_reopened {
                    self.overlay_reopened = true;
                    let before = self.ledger.len();
                    for problem in overlay.gap_problems(&self.section.kind, &report) {
                        self.ledger.record(problem);
                    }
                    if self.ledger.len() > before {
                        info!(
                            section = %self.section.kind,
                            coverage = report.coverage,
                            threshold = overlay.threshold(),
                            "keyword coverage below threshold; reopening section"
                        );
                        self.transition(WorkflowState::Resolving);
                        return Ok(());
                    }
                }
                self.coverage_shortfall = true;
                warn!(
                    section = %self.section.kind,
                    coverage = report.coverage,
                    threshold = overlay.threshold(),
                    "keyword coverage shortfall accepted"
                );
            }
        }

        self.freeze(SectionStatus::Finalized, Convergence::Converged);
        Ok(())
    }

    fn fail_convergence(&mut self) -> Result<(), RefineError> {
        let abandoned = self.ledger.abandon_unresolved();
        self.pending.clear();
        self.outbox.clear();
        self.awaiting = None;
        warn!(
            section = %self.section.kind,
            iterations = self.iterations,
            abandoned = abandoned.len(),
            "convergence failure; finalizing best effort"
        );
        self.freeze(SectionStatus::Degraded, Convergence::ConvergenceFailure);
        Ok(())
    }

    fn freeze(&mut self, status: SectionStatus, convergence: Convergence) {
        self.section = self.section.with_status(status);
        self.emit(WorkflowEvent::Committed(self.section.clone()));
        self.outcome = Some(self.outcome_with(convergence));
        self.transition(WorkflowState::Done);
        self.emit_checkpoint();
    }

    fn abort(mut self) -> SectionCheckpoint {
        let reverted = self.ledger.revert_in_flight();
        info!(section = %self.section.kind, state = ?self.state, reverted, "workflow aborted");
        self.outcome = Some(self.outcome_with(Convergence::Aborted));
        let checkpoint = self.checkpoint();
        self.emit(WorkflowEvent::Checkpoint(checkpoint.clone()));
        checkpoint
    }

    fn outcome_with(&self, convergence: Convergence) -> SectionOutcome {
        SectionOutcome {
            convergence,
            iterations: self.iterations,
            coverage: self.coverage,
            coverage_shortfall: self.coverage_shortfall,
        }
    }

    fn checkpoint(&self) -> SectionCheckpoint {
        SectionCheckpoint {
            section: self.section.clone(),
            ledger: self.ledger.clone(),
            state: self.state,
            iterations: self.iterations,
            overlay_reopened: self.overlay_reopened,
            outcome: self.outcome.clone(),
            seed: self.seed.clone(),
        }
    }

    fn emit_checkpoint(&self) {
        self.emit(WorkflowEvent::Checkpoint(self.checkpoint()));
    }

    fn emit(&self, event: WorkflowEvent) {
        // The orchestrator outlives its workflows; a closed channel only
        // happens when the whole run is being torn down.
        let _ = self.deps.events.send(event);
    }

    fn transition(&mut self, next: WorkflowState) {
        debug!(section = %self.section.kind, from = ?self.state, to = ?next, "workflow transition");
        self.state = next;
    }
}

fn overlay_requirements<'a>(
    overlay: &'a Option<Arc<JobAlignmentOverlay>>,
    kind: &SectionKind,
) -> &'a [JobRequirement] {
    match overlay {
        Some(overlay) if overlay.applies_to(kind) => overlay.requirements(),
        _ => &[],
    }
}
