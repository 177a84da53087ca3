use axum::Json;
use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde::Serialize;

use super::ErrorResponse;
use crate::application::services::IngestError;
use crate::presentation::state::AppState;

#[derive(Serialize)]
pub struct IngestResponse {
    pub request_id: String,
}

fn bad_request(error: String) -> axum::response::Response {
    (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
}

#[tracing::instrument(skip(state, multipart))]
pub async fn ingest_audio_handler(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> impl IntoResponse {
    let (filename, data) = loop {
        let field = match multipart.next_field().await {
            Ok(Some(f)) => f,
            Ok(None) => {
                tracing::warn!("Ingest request with no file");
                return bad_request("No file uploaded".to_string());
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to read multipart");
                return bad_request(format!("Failed to read multipart: {}", e));
            }
        };

        if field.name() != Some("file") && field.file_name().is_none() {
            continue;
        }

        let filename = field.file_name().unwrap_or_default().to_string();
        match field.bytes().await {
            Ok(d) => break (filename, d),
            Err(e) => {
                tracing::error!(error = %e, "Failed to read file bytes");
                return bad_request(format!("Failed to read file: {}", e));
            }
        }
    };

    tracing::debug!(filename = %filename, bytes = data.len(), "Audio upload received");

    match state.orchestrator.ingest(&filename, data).await {
        Ok(job_id) => (
            StatusCode::OK,
            Json(IngestResponse {
                request_id: job_id.to_string(),
            }),
        )
            .into_response(),
        Err(IngestError::EmptyAudio) => bad_request("Uploaded file is empty".to_string()),
        Err(e) => {
            tracing::error!(error = %e, "Failed to ingest audio");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("Failed to ingest audio: {}", e),
                }),
            )
                .into_response()
        }
    }
}
