//! Orchestrator — owns the `ResumeDocument` for one run.
//!
//! Spawns one `SegmentWorkflow` task per expected section, applies their
//! committed sections to the document (the only writer, so every commit is
//! exactly one version bump), persists checkpoints, and assembles the final
//! document plus the `IssueReport` once every workflow has stopped.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::assessment::QualityAssessor;
use crate::config::RefinementConfig;
use crate::errors::RefineError;
use crate::generation::ContentGenerator;
use crate::models::job::JobRequirement;
use crate::models::problem::{
    Problem, ProblemCategory, ProblemId, ProblemStatus, QueryAnswer, Severity,
};
use crate::models::profile::UserProfile;
use crate::models::resume::{ResumeDocument, Section, SectionKind, SectionStatus};
use crate::models::template::Template;
use crate::parsing::{DocumentFormat, DocumentParser, ParsedSections};
use crate::refinement::broker::{InteractionBroker, UserInteractionChannel};
use crate::refinement::checkpoint::{CheckpointStore, RunCheckpoint, SectionCheckpoint};
use crate::refinement::ledger::ProblemLedger;
use crate::refinement::overlay::JobAlignmentOverlay;
use crate::refinement::resolution::ResolutionEngine;
use crate::refinement::workflow::{
    Convergence, DiscoverySeed, SegmentWorkflow, WorkflowDeps, WorkflowEvent,
};

/// User-supplied material for one run.
#[derive(Debug, Clone, Default)]
pub struct RefinementInputs {
    /// Draft content per section, in discovery order.
    pub sections: ParsedSections,
    /// Extra facts per section (prior answers, notes).
    pub notes: Vec<(SectionKind, Vec<String>)>,
    pub profile: Option<UserProfile>,
}

impl RefinementInputs {
    /// Parses a draft into inputs. A draft that seeds no section is fatal.
    pub fn from_source(
        raw: &[u8],
        format: DocumentFormat,
        parser: &dyn DocumentParser,
        profile: Option<UserProfile>,
    ) -> Result<Self, RefineError> {
        let sections = parser.parse(raw, format)?;
        if sections.is_empty() {
            return Err(RefineError::Parse("document contains no sections".into()));
        }
        Ok(Self {
            sections,
            notes: Vec::new(),
            profile,
        })
    }

    fn seed_for(&self, kind: &SectionKind) -> DiscoverySeed {
        let draft = self
            .sections
            .iter()
            .filter(|(k, _)| k == kind)
            .map(|(_, content)| content.trim())
            .filter(|content| !content.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n");
        let notes = self
            .notes
            .iter()
            .filter(|(k, _)| k == kind)
            .flat_map(|(_, notes)| notes.iter().cloned())
            .collect();
        DiscoverySeed { draft, notes }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    CompletedWithIssues,
    Aborted,
}

/// A problem the run could not resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportedIssue {
    pub section: SectionKind,
    pub problem_id: ProblemId,
    pub description: String,
    pub category: ProblemCategory,
    pub severity: Severity,
    /// The user was asked and declined (or never answered).
    pub declined: bool,
}

impl ReportedIssue {
    fn from_ledger(ledger: &ProblemLedger, problem: &Problem) -> Self {
        Self {
            section: problem.section.clone(),
            problem_id: problem.id,
            description: problem.description.clone(),
            category: problem.category,
            severity: problem.severity,
            declined: matches!(ledger.answer(problem.id), Some(QueryAnswer::Declined)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageShortfall {
    pub section: SectionKind,
    pub coverage: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionSummary {
    pub section: SectionKind,
    pub status: SectionStatus,
    pub convergence: Option<Convergence>,
    pub quality_score: f32,
    pub revision: u32,
    pub iterations: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssueReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    pub document_version: u64,
    pub abandoned: Vec<ReportedIssue>,
    /// Problems still open when the run was aborted.
    pub unresolved: Vec<ReportedIssue>,
    pub convergence_failures: Vec<SectionKind>,
    pub coverage_shortfalls: Vec<CoverageShortfall>,
    /// One entry per section, in document order.
    pub sections: Vec<SectionSummary>,
}

impl IssueReport {
    pub fn has_issues(&self) -> bool {
        !self.abandoned.is_empty()
            || !self.unresolved.is_empty()
            || !self.convergence_failures.is_empty()
            || !self.coverage_shortfalls.is_empty()
    }
}

/// How a section enters a run.
enum Launch {
    Fresh(SectionKind, DiscoverySeed),
    Restored(SectionCheckpoint),
}

pub struct Orchestrator {
    assessor: Arc<dyn QualityAssessor>,
    generator: Arc<dyn ContentGenerator>,
    channel: Arc<dyn UserInteractionChannel>,
    config: RefinementConfig,
    checkpoints: Option<Arc<dyn CheckpointStore>>,
    abort: CancellationToken,
    document_watch: Option<watch::Sender<ResumeDocument>>,
    run_id: Uuid,
}

impl Orchestrator {
    pub fn new(
        assessor: Arc<dyn QualityAssessor>,
        generator: Arc<dyn ContentGenerator>,
        channel: Arc<dyn UserInteractionChannel>,
        config: RefinementConfig,
    ) -> Self {
        Self {
            assessor,
            generator,
            channel,
            config,
            checkpoints: None,
            abort: CancellationToken::new(),
            document_watch: None,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn with_checkpoints(mut self, store: Arc<dyn CheckpointStore>) -> Self {
        self.checkpoints = Some(store);
        self
    }

    /// Cancelling this token is a user abort.
    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }

    /// Publishes every new document version.
    pub fn with_document_watch(mut self, watch: watch::Sender<ResumeDocument>) -> Self {
        self.document_watch = Some(watch);
        self
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Refines every expected section of `template` to `Done` and assembles
    /// the result in template order.
    pub async fn run(
        &self,
        inputs: RefinementInputs,
        template: &Template,
        job_requirements: Option<Vec<JobRequirement>>,
    ) -> Result<(ResumeDocument, IssueReport), RefineError> {
        let present: Vec<SectionKind> = inputs.sections.iter().map(|(k, _)| k.clone()).collect();
        let expected = template.expected_sections(&present);

        let document = ResumeDocument::new(
            template.id.clone(),
            expected
                .iter()
                .map(|kind| Section::new(kind.clone(), ""))
                .collect(),
        );
        let launches = expected
            .iter()
            .map(|kind| Launch::Fresh(kind.clone(), inputs.seed_for(kind)))
            .collect();

        info!(
            run_id = %self.run_id,
            template = %template.id,
            sections = expected.len(),
            "starting refinement run"
        );

        let run = RunCheckpoint {
            run_id: self.run_id,
            template: template.clone(),
            job_requirements: job_requirements.unwrap_or_default(),
            profile: inputs.profile,
            document,
            sections: Vec::new(),
        };
        self.execute(run, launches).await
    }

    /// Continues a checkpointed run. Finished sections are kept as they are;
    /// the rest restart from their last checkpoint.
    pub async fn resume(
        &self,
        checkpoint: RunCheckpoint,
    ) -> Result<(ResumeDocument, IssueReport), RefineError> {
        let mut launches = Vec::new();
        for section in &checkpoint.document.sections {
            match checkpoint.section(&section.kind) {
                Some(saved) if saved.outcome.as_ref().is_some_and(|o| o.is_final()) => {}
                Some(saved) => launches.push(Launch::Restored(saved.clone())),
                None => launches.push(Launch::Fresh(
                    section.kind.clone(),
                    DiscoverySeed {
                        draft: section.content.clone(),
                        notes: Vec::new(),
                    },
                )),
            }
        }
        info!(
            run_id = %checkpoint.run_id,
            version = checkpoint.document.version,
            restarted = launches.len(),
            "resuming refinement run"
        );
        self.execute(checkpoint, launches).await
    }

    async fn execute(
        &self,
        mut run: RunCheckpoint,
        launches: Vec<Launch>,
    ) -> Result<(ResumeDocument, IssueReport), RefineError> {
        let abort = self.abort.child_token();
        let (escalations, escalation_queue) = mpsc::unbounded_channel();
        let broker = InteractionBroker::new(
            self.channel.clone(),
            self.config.answer_timeout,
            abort.clone(),
        )
        .spawn(escalation_queue);

        let overlay = (!run.job_requirements.is_empty()).then(|| {
            Arc::new(JobAlignmentOverlay::new(
                run.job_requirements.clone(),
                self.config.coverage_threshold,
            ))
        });
        let (events_tx, mut events) = mpsc::unbounded_channel();

        let answer_wait = answer_wait(self.config.answer_timeout, launches.len());
        let deps = WorkflowDeps {
            engine: ResolutionEngine::new(
                self.generator.clone(),
                self.assessor.clone(),
                &self.config,
            ),
            assessor: self.assessor.clone(),
            overlay,
            escalations,
            events: events_tx,
            abort: abort.clone(),
            profile: run.profile.clone().map(Arc::new),
            max_iterations: self.config.max_iterations,
            answer_wait,
        };

        self.publish(&run.document);

        let mut workflows = JoinSet::new();
        for launch in launches {
            let workflow = match launch {
                Launch::Fresh(kind, seed) => SegmentWorkflow::new(kind, seed, deps.clone()),
                Launch::Restored(checkpoint) => SegmentWorkflow::restore(checkpoint, deps.clone()),
            };
            workflows.spawn(workflow.run());
        }
        // Workflows hold the only remaining senders.
        drop(deps);

        let mut fatal: Option<RefineError> = None;
        loop {
            tokio::select! {
                biased;
                Some(event) = events.recv() => self.apply(&mut run, event).await,
                joined = workflows.join_next() => match joined {
                    Some(Ok(Ok(checkpoint))) => run.upsert(checkpoint),
                    Some(Ok(Err(e))) => {
                        error!(run_id = %run.run_id, error = %e, "section workflow failed; stopping run");
                        abort.cancel();
                        fatal.get_or_insert(e);
                    }
                    Some(Err(e)) => {
                        error!(run_id = %run.run_id, error = %e, "section workflow panicked; stopping run");
                        abort.cancel();
                        fatal.get_or_insert(RefineError::Internal(anyhow::anyhow!("workflow task failed: {e}")));
                    }
                    None => break,
                },
            }
        }
        while let Ok(event) = events.try_recv() {
            self.apply(&mut run, event).await;
        }
        broker.abort();

        if let Some(e) = fatal {
            return Err(e);
        }

        let aborted = abort.is_cancelled();
        self.save(&run).await;
        let report = build_report(&run, aborted);
        info!(
            run_id = %run.run_id,
            status = ?report.status,
            version = report.document_version,
            abandoned = report.abandoned.len(),
            convergence_failures = report.convergence_failures.len(),
            "refinement run finished"
        );
        Ok((run.document, report))
    }

    async fn apply(&self, run: &mut RunCheckpoint, event: WorkflowEvent) {
        match event {
            WorkflowEvent::Committed(section) => {
                run.document = run.document.with_section(section);
                self.publish(&run.document);
            }
            WorkflowEvent::Checkpoint(checkpoint) => {
                run.upsert(checkpoint);
                self.save(run).await;
            }
        }
    }

    fn publish(&self, document: &ResumeDocument) {
        if let Some(watch) = &self.document_watch {
            watch.send_replace(document.clone());
        }
    }

    async fn save(&self, run: &RunCheckpoint) {
        if let Some(store) = &self.checkpoints {
            if let Err(e) = store.save(run).await {
                warn!(run_id = %run.run_id, error = %e, "failed to save checkpoint");
            }
        }
    }
}

fn build_report(run: &RunCheckpoint, aborted: bool) -> IssueReport {
    let mut report = IssueReport {
        run_id: run.run_id,
        status: RunStatus::Completed,
        document_version: run.document.version,
        abandoned: Vec::new(),
        unresolved: Vec::new(),
        convergence_failures: Vec::new(),
        coverage_shortfalls: Vec::new(),
        sections: Vec::new(),
    };

    for section in &run.document.sections {
        let Some(saved) = run.section(&section.kind) else {
            report.sections.push(SectionSummary {
                section: section.kind.clone(),
                status: section.status,
                convergence: None,
                quality_score: section.quality_score,
                revision: section.revision,
                iterations: 0,
            });
            continue;
        };

        for problem in saved.ledger.problems() {
            if problem.status == ProblemStatus::Abandoned {
                report
                    .abandoned
                    .push(ReportedIssue::from_ledger(&saved.ledger, problem));
            } else if !problem.status.is_terminal() {
                report
                    .unresolved
                    .push(ReportedIssue::from_ledger(&saved.ledger, problem));
            }
        }

        if let Some(outcome) = &saved.outcome {
            if outcome.convergence == Convergence::ConvergenceFailure {
                report.convergence_failures.push(section.kind.clone());
            }
            if let (true, Some(coverage)) = (outcome.coverage_shortfall, outcome.coverage) {
                report.coverage_shortfalls.push(CoverageShortfall {
                    section: section.kind.clone(),
                    coverage,
                });
            }
        }

        report.sections.push(SectionSummary {
            section: section.kind.clone(),
            status: section.status,
            convergence: saved.outcome.as_ref().map(|o| o.convergence),
            quality_score: section.quality_score,
            revision: section.revision,
            iterations: saved.iterations,
        });
    }

    report.status = if aborted {
        RunStatus::Aborted
    } else if report.has_issues() {
        RunStatus::CompletedWithIssues
    } else {
        RunStatus::Completed
    };
    report
}

/// How long a workflow waits on one batch: a batch may queue behind every
/// other section's batch.
fn answer_wait(answer_timeout: Duration, sections: usize) -> Duration {
    let batches = u32::try_from(sections).unwrap_or(u32::MAX).saturating_add(1);
    answer_timeout.saturating_mul(batches)
}
