use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Serialize;

use crate::application::ports::{DispatchRequest, StageClient, StageClientError, StagePayload};
use crate::domain::Stage;
use crate::infrastructure::observability::{CALLBACK_URL_HEADER, REQUEST_ID_HEADER};

const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct StageEndpoint {
    pub url: String,
    pub timeout: Duration,
}

/// Posts work to the ASR stage as a multipart `file` upload and to the ML
/// stage as JSON, tagging both with the job id and our callback URL.
pub struct HttpStageClient {
    client: reqwest::Client,
    asr: StageEndpoint,
    ml: StageEndpoint,
}

#[derive(Serialize)]
struct TranscriptBody<'a> {
    request_id: String,
    text: &'a str,
}

impl HttpStageClient {
    pub fn new(asr: StageEndpoint, ml: StageEndpoint) -> Result<Self, StageClientError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| StageClientError::RequestFailed(format!("client: {}", e)))?;
        Ok(Self { client, asr, ml })
    }

    fn endpoint(&self, stage: Stage) -> &StageEndpoint {
        match stage {
            Stage::Asr => &self.asr,
            Stage::Ml => &self.ml,
        }
    }
}

#[async_trait]
impl StageClient for HttpStageClient {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), StageClientError> {
        let endpoint = self.endpoint(request.stage);
        let job_id = request.job_id.to_string();

        let builder = self
            .client
            .post(&endpoint.url)
            .timeout(endpoint.timeout)
            .header(REQUEST_ID_HEADER, &job_id)
            .header(CALLBACK_URL_HEADER, &request.callback_url);

        let builder = match &request.payload {
            StagePayload::Audio { filename, data } => {
                let file_part = multipart::Part::bytes(data.to_vec())
                    .file_name(filename.clone())
                    .mime_str(mime_for(filename))
                    .map_err(|e| StageClientError::InvalidPayload(format!("mime: {}", e)))?;
                builder.multipart(multipart::Form::new().part("file", file_part))
            }
            StagePayload::Transcript(text) => builder.json(&TranscriptBody {
                request_id: job_id.clone(),
                text,
            }),
        };

        tracing::debug!(
            job_id = %job_id,
            stage = %request.stage,
            url = %endpoint.url,
            "Dispatching to stage"
        );

        let response = builder
            .send()
            .await
            .map_err(|e| StageClientError::RequestFailed(format!("request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(StageClientError::Rejected {
                status: status.as_u16(),
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        Ok(())
    }
}

fn mime_for(filename: &str) -> &'static str {
    let ext = Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());

    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("webm") => "audio/webm",
        _ => "application/octet-stream",
    }
}
