use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use crate::application::services::StageCounts;
use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct EndpointsResponse {
    pub asr: String,
    pub ml: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub in_flight: StageCounts,
    pub limits: StageCounts,
    pub queue_depth: StageCounts,
    pub jobs: usize,
    pub endpoints: EndpointsResponse,
}

pub async fn healthz_handler(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.orchestrator.health().await;

    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok".to_string(),
            in_flight: snapshot.in_flight,
            limits: snapshot.limits,
            queue_depth: snapshot.queue_depth,
            jobs: snapshot.jobs,
            endpoints: EndpointsResponse {
                asr: state.endpoints.asr.clone(),
                ml: state.endpoints.ml.clone(),
            },
        }),
    )
}
