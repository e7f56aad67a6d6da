pub mod health;

use axum::{
    routing::{get, post},
    Router,
};

use crate::sessions::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        // Refinement sessions
        .route("/api/v1/sessions", post(handlers::handle_create_session))
        .route(
            "/api/v1/sessions/upload",
            post(handlers::handle_upload_session),
        )
        .route("/api/v1/sessions/:id", get(handlers::handle_get_session))
        .route(
            "/api/v1/sessions/:id/answers",
            post(handlers::handle_answer),
        )
        .route("/api/v1/sessions/:id/abort", post(handlers::handle_abort))
        .route("/api/v1/sessions/:id/resume", post(handlers::handle_resume))
        // Job requirements preview
        .route(
            "/api/v1/job-requirements/parse",
            post(handlers::handle_parse_job_requirements),
        )
        .with_state(state)
}
