//! Refinement sessions — one background run per session, driven over HTTP.
//!
//! The session id is the run id, so a checkpointed run can be resumed under
//! the same id after a restart.

pub mod channel;
pub mod handlers;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, RwLock};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::errors::{AppError, RefineError};
use crate::models::job::JobRequirement;
use crate::models::problem::UserQuery;
use crate::models::resume::ResumeDocument;
use crate::models::template::Template;
use crate::refinement::checkpoint::RunCheckpoint;
use crate::refinement::orchestrator::{IssueReport, Orchestrator, RefinementInputs, RunStatus};
use crate::render::{render_report, MarkdownRenderer, Renderer};
use crate::state::AppState;

pub use channel::SessionChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    AwaitingInput,
    Completed,
    Aborted,
    Failed,
}

struct FinishedRun {
    document: ResumeDocument,
    report: IssueReport,
    markdown: String,
    report_markdown: String,
}

enum SessionState {
    Running,
    Finished(Box<FinishedRun>),
    Failed(String),
}

/// What a client sees when polling a session.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub document_version: u64,
    pub pending_queries: Vec<UserQuery>,
    pub parse_issues: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<ResumeDocument>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<IssueReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_markdown: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Session {
    id: Uuid,
    channel: Arc<SessionChannel>,
    abort: CancellationToken,
    document: watch::Receiver<ResumeDocument>,
    parse_issues: Vec<String>,
    state: RwLock<SessionState>,
    finished_at: RwLock<Option<Instant>>,
}

impl Session {
    pub fn channel(&self) -> &SessionChannel {
        &self.channel
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.read().await, SessionState::Running)
    }

    /// User abort: stops every workflow and fails the waiting batch.
    pub async fn abort(&self) {
        info!(session_id = %self.id, "user abort requested");
        self.abort.cancel();
        self.channel.abort().await;
    }

    pub async fn view(&self) -> SessionView {
        let pending_queries = self.channel.pending_queries().await;
        let mut view = SessionView {
            session_id: self.id,
            status: SessionStatus::Running,
            document_version: self.document.borrow().version,
            pending_queries,
            parse_issues: self.parse_issues.clone(),
            document: None,
            markdown: None,
            report: None,
            report_markdown: None,
            error: None,
        };

        match &*self.state.read().await {
            SessionState::Running => {
                if !view.pending_queries.is_empty() {
                    view.status = SessionStatus::AwaitingInput;
                }
            }
            SessionState::Finished(run) => {
                view.status = match run.report.status {
                    RunStatus::Aborted => SessionStatus::Aborted,
                    RunStatus::Completed | RunStatus::CompletedWithIssues => {
                        SessionStatus::Completed
                    }
                };
                view.document_version = run.document.version;
                view.document = Some(run.document.clone());
                view.markdown = Some(run.markdown.clone());
                view.report = Some(run.report.clone());
                view.report_markdown = Some(run.report_markdown.clone());
            }
            SessionState::Failed(message) => {
                view.status = SessionStatus::Failed;
                view.error = Some(message.clone());
            }
        }
        view
    }

    async fn finish(&self, result: Result<(ResumeDocument, IssueReport), RefineError>) {
        let next = match result {
            Ok((document, report)) => {
                info!(session_id = %self.id, status = ?report.status, "session finished");
                SessionState::Finished(Box::new(FinishedRun {
                    markdown: MarkdownRenderer.to_markdown(&document),
                    report_markdown: render_report(&report),
                    document,
                    report,
                }))
            }
            Err(e) => {
                error!(session_id = %self.id, error = %e, "session failed");
                SessionState::Failed(e.to_string())
            }
        };
        *self.state.write().await = next;
        *self.finished_at.write().await = Some(Instant::now());
    }

    async fn expired(&self, retention: Duration, now: Instant) -> bool {
        match *self.finished_at.read().await {
            Some(finished_at) => now.saturating_duration_since(finished_at) >= retention,
            None => false,
        }
    }
}

/// In-memory session table shared by the handlers. Finished sessions are
/// evicted once they are older than the retention window.
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<Uuid, Arc<Session>>>>,
    retention: Duration,
}

impl SessionRegistry {
    pub fn new(retention: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            retention,
        }
    }

    pub async fn get(&self, id: Uuid) -> Result<Arc<Session>, AppError> {
        self.sessions
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(AppError::SessionNotFound(id))
    }

    async fn insert(&self, session: Arc<Session>) {
        self.evict_expired().await;
        self.sessions.write().await.insert(session.id, session);
    }

    /// Drops finished sessions past retention. Running sessions are kept.
    pub async fn evict_expired(&self) -> usize {
        let now = Instant::now();
        let mut sessions = self.sessions.write().await;
        let mut expired = Vec::new();
        for (id, session) in sessions.iter() {
            if session.expired(self.retention, now).await {
                expired.push(*id);
            }
        }
        for id in &expired {
            sessions.remove(id);
        }
        if !expired.is_empty() {
            debug!(evicted = expired.len(), remaining = sessions.len(), "evicted finished sessions");
        }
        expired.len()
    }
}

/// Everything needed to start a fresh run.
pub struct RunRequest {
    pub inputs: RefinementInputs,
    pub template: Template,
    pub job_requirements: Vec<JobRequirement>,
    pub parse_issues: Vec<String>,
}

/// Starts a run in the background and returns its session id.
pub async fn start_session(state: &AppState, request: RunRequest) -> Uuid {
    let (orchestrator, session) = prepare(state, Uuid::new_v4(), request.parse_issues);
    let RunRequest {
        inputs,
        template,
        job_requirements,
        ..
    } = request;
    let requirements = (!job_requirements.is_empty()).then_some(job_requirements);

    launch(state, session, async move {
        orchestrator.run(inputs, &template, requirements).await
    })
    .await
}

/// Continues a checkpointed run under its original id.
pub async fn resume_session(state: &AppState, checkpoint: RunCheckpoint) -> Result<Uuid, AppError> {
    if let Ok(existing) = state.sessions.get(checkpoint.run_id).await {
        if existing.is_running().await {
            return Err(AppError::Conflict(format!(
                "Session {} is still running",
                checkpoint.run_id
            )));
        }
    }

    let (orchestrator, session) = prepare(state, checkpoint.run_id, Vec::new());
    Ok(launch(state, session, async move { orchestrator.resume(checkpoint).await }).await)
}

fn prepare(state: &AppState, id: Uuid, parse_issues: Vec<String>) -> (Orchestrator, Arc<Session>) {
    let channel = Arc::new(SessionChannel::new());
    let abort = CancellationToken::new();
    let (watch_tx, watch_rx) = watch::channel(ResumeDocument::new("", Vec::new()));

    let mut orchestrator = Orchestrator::new(
        state.assessor.clone(),
        state.generator.clone(),
        channel.clone(),
        state.config.refinement.clone(),
    )
    .with_run_id(id)
    .with_abort(abort.clone())
    .with_document_watch(watch_tx);
    if let Some(store) = &state.checkpoints {
        orchestrator = orchestrator.with_checkpoints(store.clone());
    }

    let session = Arc::new(Session {
        id: orchestrator.run_id(),
        channel,
        abort,
        document: watch_rx,
        parse_issues,
        state: RwLock::new(SessionState::Running),
        finished_at: RwLock::new(None),
    });
    (orchestrator, session)
}

async fn launch<F>(state: &AppState, session: Arc<Session>, run: F) -> Uuid
where
    F: Future<Output = Result<(ResumeDocument, IssueReport), RefineError>> + Send + 'static,
{
    let id = session.id;
    state.sessions.insert(session.clone()).await;
    info!(session_id = %id, "session started");
    tokio::spawn(async move {
        let result = run.await;
        session.finish(result).await;
    });
    id
}
