use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::models::problem::{ProblemId, ProblemStatus};
use crate::models::resume::SectionKind;

/// Failures of the refinement core. Transient generation failures never reach
/// this type; the resolution engine absorbs them into attempt counters.
#[derive(Debug, Error)]
pub enum RefineError {
    /// The source document could not seed any section. Fatal to the run.
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// Programming-contract violation in the problem lifecycle.
    #[error("Invalid transition for problem {id}: {from} -> {to}")]
    InvalidTransition {
        id: ProblemId,
        from: ProblemStatus,
        to: ProblemStatus,
    },

    #[error("Unknown problem: {0}")]
    UnknownProblem(ProblemId),

    #[error("Stale section {section}: candidate built on revision {expected}, current is {actual}")]
    StaleSection {
        section: SectionKind,
        expected: u32,
        actual: u32,
    },

    #[error("Quality assessment failed: {0}")]
    Assessment(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unprocessable entity: {0}")]
    UnprocessableEntity(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error(transparent)]
    Refine(#[from] RefineError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::SessionNotFound(id) => (
                StatusCode::NOT_FOUND,
                "SESSION_NOT_FOUND",
                format!("No refinement session with id {id}"),
            ),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::UnprocessableEntity(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "UNPROCESSABLE_ENTITY",
                msg.clone(),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Llm(msg) => {
                tracing::error!("LLM error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "LLM_ERROR",
                    "An AI processing error occurred".to_string(),
                )
            }
            AppError::Refine(RefineError::Parse(msg)) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "PARSE_ERROR", msg.clone())
            }
            AppError::Refine(RefineError::UnsupportedFormat(format)) => (
                StatusCode::UNSUPPORTED_MEDIA_TYPE,
                "UNSUPPORTED_FORMAT",
                format!("Unsupported document format: {format}"),
            ),
            AppError::Refine(e) => {
                tracing::error!("Refinement error: {e}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "REFINEMENT_ERROR",
                    "The refinement engine failed".to_string(),
                )
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_error_maps_to_422() {
        let response = AppError::from(RefineError::Parse("empty".into())).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_unsupported_format_maps_to_415() {
        let response =
            AppError::from(RefineError::UnsupportedFormat("docx".into())).into_response();
        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[test]
    fn test_missing_session_maps_to_404() {
        let response = AppError::SessionNotFound(Uuid::new_v4()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_transition_is_internal() {
        let err = RefineError::InvalidTransition {
            id: ProblemId::new(),
            from: ProblemStatus::Resolved,
            to: ProblemStatus::Open,
        };
        assert!(err.to_string().contains("resolved -> open"));
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
