use std::sync::Arc;

use crate::assessment::QualityAssessor;
use crate::config::Config;
use crate::generation::ContentGenerator;
use crate::llm_client::LlmClient;
use crate::parsing::DocumentParser;
use crate::refinement::checkpoint::CheckpointStore;
use crate::sessions::SessionRegistry;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Present only when an API key is configured; job descriptions fall back
    /// to heuristic extraction otherwise.
    pub llm: Option<LlmClient>,
    pub assessor: Arc<dyn QualityAssessor>,
    pub generator: Arc<dyn ContentGenerator>,
    pub parser: Arc<dyn DocumentParser>,
    pub checkpoints: Option<Arc<dyn CheckpointStore>>,
    pub sessions: SessionRegistry,
}
