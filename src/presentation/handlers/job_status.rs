use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use super::ErrorResponse;
use crate::domain::{JobId, MlResult};
use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct JobStatusResponse {
    pub request_id: String,
    pub status: String,
    pub filename: String,
    pub audio_ref: String,
    pub transcript: Option<String>,
    pub result: Option<MlResult>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[tracing::instrument(skip(state))]
pub async fn job_status_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> impl IntoResponse {
    let id = match job_id.parse::<JobId>() {
        Ok(id) => id,
        Err(_) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: format!("Invalid job ID: {}", job_id),
                }),
            )
                .into_response();
        }
    };

    match state.orchestrator.status(&id).await {
        Some(job) => {
            let response = JobStatusResponse {
                request_id: job.id.to_string(),
                status: job.status.as_str().to_string(),
                filename: job.filename,
                audio_ref: job.audio_ref.to_string(),
                transcript: job.transcript,
                result: job.result,
                last_error: job.last_error,
                created_at: job.created_at.to_rfc3339(),
                updated_at: job.updated_at.to_rfc3339(),
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Job not found: {}", job_id),
            }),
        )
            .into_response(),
    }
}
