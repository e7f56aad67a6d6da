mod assessment;
mod config;
mod errors;
mod generation;
mod llm_client;
mod models;
mod parsing;
mod refinement;
mod render;
mod routes;
mod sessions;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::assessment::HeuristicAssessor;
use crate::config::Config;
use crate::generation::{ContentGenerator, LlmContentGenerator, RuleBasedGenerator};
use crate::llm_client::LlmClient;
use crate::parsing::ResumeParser;
use crate::refinement::checkpoint::{CheckpointStore, FileCheckpointStore};
use crate::routes::build_router;
use crate::sessions::SessionRegistry;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on malformed env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Redraft API v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client and pick the generator backend
    let llm = match &config.anthropic_api_key {
        Some(key) => Some(LlmClient::new(
            key.clone(),
            config.refinement.generation_timeout,
        )?),
        None => None,
    };
    let generator: Arc<dyn ContentGenerator> = match &llm {
        Some(llm) => {
            info!("LLM client initialized (model: {})", llm_client::MODEL);
            Arc::new(LlmContentGenerator::new(llm.clone()))
        }
        None => {
            info!("ANTHROPIC_API_KEY not set, using rule-based generation");
            Arc::new(RuleBasedGenerator)
        }
    };

    // Checkpoints are optional
    let checkpoints = config.checkpoint_dir.as_ref().map(|dir| {
        info!("Run checkpoints enabled in {}", dir.display());
        Arc::new(FileCheckpointStore::new(dir.clone())) as Arc<dyn CheckpointStore>
    });

    info!(
        "Refinement limits: {} auto attempts, {} iterations, {} concurrent generations",
        config.refinement.max_auto_attempts,
        config.refinement.max_iterations,
        config.refinement.max_concurrent_generations
    );

    // Build app state
    let state = AppState {
        config: config.clone(),
        llm,
        assessor: Arc::new(HeuristicAssessor),
        generator,
        parser: Arc::new(ResumeParser),
        checkpoints,
        sessions: SessionRegistry::new(config.session_retention),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
