//! Axum route handlers for the Sessions API.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::errors::AppError;
use crate::generation::jd_parser::{
    extract_requirements_heuristic, merge_requirements, parse_job_description,
};
use crate::models::job::JobRequirement;
use crate::models::profile::UserProfile;
use crate::models::resume::SectionKind;
use crate::models::template::Template;
use crate::parsing::{validate_parsed, DocumentFormat};
use crate::refinement::RefinementInputs;
use crate::sessions::{resume_session, start_session, RunRequest, SessionView};
use crate::state::AppState;

// ────────────────────────────────────────────────────────────────────────────
// Request / Response types
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub draft_markdown: Option<String>,
    pub draft_text: Option<String>,
    pub template: Option<Template>,
    /// Shorthand for a custom template with this section order.
    pub section_order: Option<Vec<SectionKind>>,
    pub job_description: Option<String>,
    /// Takes precedence over `job_description`.
    pub job_requirements: Option<Vec<JobRequirement>>,
    pub profile: Option<UserProfile>,
}

#[derive(Debug, Serialize)]
pub struct SessionCreated {
    pub session_id: Uuid,
    pub parse_issues: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnswersRequest {
    /// One entry per pending question, in order; `null` declines.
    pub answers: Vec<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct ParseJobRequirementsRequest {
    pub jd_text: String,
}

#[derive(Debug, Serialize)]
pub struct ParseJobRequirementsResponse {
    pub requirements: Vec<JobRequirement>,
}

// ────────────────────────────────────────────────────────────────────────────
// Handlers
// ────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/sessions
///
/// Parses the draft up front (422 when nothing usable is found) and starts
/// the refinement run in the background.
pub async fn handle_create_session(
    State(state): State<AppState>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionCreated>), AppError> {
    let (raw, format) = match (request.draft_markdown, request.draft_text) {
        (Some(markdown), _) => (markdown.into_bytes(), DocumentFormat::Markdown),
        (None, Some(text)) => (text.into_bytes(), DocumentFormat::PlainText),
        (None, None) => {
            return Err(AppError::Validation(
                "draft_markdown or draft_text is required".to_string(),
            ))
        }
    };
    check_profile(request.profile.as_ref())?;

    let inputs = RefinementInputs::from_source(&raw, format, state.parser.as_ref(), request.profile)?;
    let template = build_template(request.template, request.section_order);
    let job_requirements =
        resolve_requirements(&state, request.job_requirements, request.job_description).await;

    let created = launch(&state, inputs, template, job_requirements).await;
    Ok((StatusCode::ACCEPTED, Json(created)))
}

/// POST /api/v1/sessions/upload
///
/// Multipart variant: a `file` part (markdown, text or PDF) plus optional
/// `job_description` and `profile` (JSON) text parts.
pub async fn handle_upload_session(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<SessionCreated>), AppError> {
    let mut file: Option<(Vec<u8>, DocumentFormat)> = None;
    let mut job_description = None;
    let mut profile = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {e}")))?
    {
        match field.name() {
            Some("file") => {
                let format = DocumentFormat::detect(field.file_name(), field.content_type())?;
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Failed to read upload: {e}")))?;
                file = Some((bytes.to_vec(), format));
            }
            Some("job_description") => job_description = Some(read_text(field).await?),
            Some("profile") => {
                let raw = read_text(field).await?;
                let parsed: UserProfile = serde_json::from_str(&raw)
                    .map_err(|e| AppError::Validation(format!("Invalid profile: {e}")))?;
                profile = Some(parsed);
            }
            _ => {}
        }
    }

    let (raw, format) =
        file.ok_or_else(|| AppError::Validation("file part is required".to_string()))?;
    check_profile(profile.as_ref())?;

    // PDF extraction is CPU-bound.
    let parser = state.parser.clone();
    let inputs = tokio::task::spawn_blocking(move || {
        RefinementInputs::from_source(&raw, format, parser.as_ref(), profile)
    })
    .await
    .map_err(|e| AppError::Internal(e.into()))??;

    let job_requirements = resolve_requirements(&state, None, job_description).await;
    let created = launch(&state, inputs, Template::default(), job_requirements).await;
    Ok((StatusCode::ACCEPTED, Json(created)))
}

/// GET /api/v1/sessions/:id
pub async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.sessions.get(id).await?;
    Ok(Json(session.view().await))
}

/// POST /api/v1/sessions/:id/answers
///
/// Answers the questions currently pending for the session.
pub async fn handle_answer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<AnswersRequest>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.sessions.get(id).await?;
    session.channel().answer(request.answers).await?;
    Ok(Json(session.view().await))
}

/// POST /api/v1/sessions/:id/abort
///
/// The run stops at the next safe point and finishes with the last committed
/// content of every section.
pub async fn handle_abort(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, AppError> {
    let session = state.sessions.get(id).await?;
    if !session.is_running().await {
        return Err(AppError::Conflict(format!("Session {id} has already finished")));
    }
    session.abort().await;
    Ok(Json(session.view().await))
}

/// POST /api/v1/sessions/:id/resume
///
/// Continues an interrupted run from its checkpoint.
pub async fn handle_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<SessionCreated>), AppError> {
    let store = state
        .checkpoints
        .clone()
        .ok_or_else(|| AppError::Conflict("Checkpoints are not enabled".to_string()))?;
    let checkpoint = store.load(id).await?.ok_or(AppError::SessionNotFound(id))?;

    let session_id = resume_session(&state, checkpoint).await?;
    Ok((
        StatusCode::ACCEPTED,
        Json(SessionCreated {
            session_id,
            parse_issues: Vec::new(),
        }),
    ))
}

/// POST /api/v1/job-requirements/parse
///
/// Previews the requirements a job description yields.
pub async fn handle_parse_job_requirements(
    State(state): State<AppState>,
    Json(request): Json<ParseJobRequirementsRequest>,
) -> Result<Json<ParseJobRequirementsResponse>, AppError> {
    if request.jd_text.trim().is_empty() {
        return Err(AppError::Validation("jd_text cannot be empty".to_string()));
    }

    let requirements = match &state.llm {
        Some(llm) => parse_job_description(&request.jd_text, llm).await?,
        None => extract_requirements_heuristic(&request.jd_text),
    };
    Ok(Json(ParseJobRequirementsResponse { requirements }))
}

// ────────────────────────────────────────────────────────────────────────────
// Helpers
// ────────────────────────────────────────────────────────────────────────────

async fn launch(
    state: &AppState,
    inputs: RefinementInputs,
    template: Template,
    job_requirements: Vec<JobRequirement>,
) -> SessionCreated {
    let parse_issues = validate_parsed(&inputs.sections);
    let session_id = start_session(
        state,
        RunRequest {
            inputs,
            template,
            job_requirements,
            parse_issues: parse_issues.clone(),
        },
    )
    .await;
    SessionCreated {
        session_id,
        parse_issues,
    }
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart field: {e}")))
}

fn check_profile(profile: Option<&UserProfile>) -> Result<(), AppError> {
    match profile.map(UserProfile::validate) {
        Some(issues) if !issues.is_empty() => Err(AppError::Validation(issues.join("; "))),
        _ => Ok(()),
    }
}

/// An explicit template wins; a bare section order becomes a custom template
/// that keeps the default required sections it names.
fn build_template(template: Option<Template>, section_order: Option<Vec<SectionKind>>) -> Template {
    match (template, section_order) {
        (Some(template), _) => template,
        (None, Some(order)) => {
            let required = Template::default()
                .required_sections
                .into_iter()
                .filter(|kind| order.contains(kind))
                .collect();
            Template::new("custom", order).with_required(required)
        }
        (None, None) => Template::default(),
    }
}

/// Explicit requirements, else the job description (LLM when configured,
/// heuristic otherwise or on LLM failure), else none.
async fn resolve_requirements(
    state: &AppState,
    explicit: Option<Vec<JobRequirement>>,
    job_description: Option<String>,
) -> Vec<JobRequirement> {
    if let Some(requirements) = explicit {
        return merge_requirements(requirements);
    }
    let Some(jd_text) = job_description.filter(|jd| !jd.trim().is_empty()) else {
        return Vec::new();
    };

    if let Some(llm) = &state.llm {
        match parse_job_description(&jd_text, llm).await {
            Ok(requirements) => return requirements,
            Err(e) => warn!(error = %e, "LLM job description parsing failed, using heuristics"),
        }
    }
    extract_requirements_heuristic(&jd_text)
}
