use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::application::services::CallbackOutcome;
use crate::domain::MlResult;
use crate::infrastructure::observability::text_preview;
use crate::presentation::state::AppState;

/// ASR completion. The transcription service sends more than this
/// (segments, language, timings); only the correlation id and text matter.
#[derive(Debug, Deserialize)]
pub struct AsrCallbackRequest {
    pub request_id: Option<String>,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct MlCallbackRequest {
    pub request_id: Option<String>,
    #[serde(default)]
    pub service: Value,
    #[serde(default, alias = "urgency")]
    pub priority: Value,
    #[serde(default)]
    pub problem: Value,
}

#[derive(Serialize)]
pub struct CallbackResponse {
    pub status: CallbackOutcome,
}

fn respond(outcome: CallbackOutcome) -> impl IntoResponse {
    (StatusCode::OK, Json(CallbackResponse { status: outcome }))
}

pub async fn asr_callback_handler(
    State(state): State<AppState>,
    Json(body): Json<AsrCallbackRequest>,
) -> impl IntoResponse {
    let Some(request_id) = body.request_id else {
        tracing::warn!("ASR callback without request id");
        return respond(CallbackOutcome::Unknown);
    };

    tracing::debug!(
        request_id = %request_id,
        text = %text_preview(&body.text),
        "ASR callback received"
    );

    let outcome = state
        .orchestrator
        .on_asr_callback(&request_id, body.text)
        .await;
    respond(outcome)
}

pub async fn ml_callback_handler(
    State(state): State<AppState>,
    Json(body): Json<MlCallbackRequest>,
) -> impl IntoResponse {
    let Some(request_id) = body.request_id else {
        tracing::warn!("ML callback without request id");
        return respond(CallbackOutcome::Unknown);
    };

    tracing::debug!(request_id = %request_id, "ML callback received");

    let result = MlResult {
        service: body.service,
        priority: body.priority,
        problem: body.problem,
    };
    let outcome = state.orchestrator.on_ml_callback(&request_id, result).await;
    respond(outcome)
}
