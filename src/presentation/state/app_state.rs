use std::sync::Arc;

use crate::application::services::PipelineOrchestrator;

/// Stage URLs reported by `/healthz`.
#[derive(Debug, Clone)]
pub struct StageEndpoints {
    pub asr: String,
    pub ml: String,
}

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<PipelineOrchestrator>,
    pub endpoints: StageEndpoints,
    pub max_upload_bytes: usize,
}
