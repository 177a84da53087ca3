use async_trait::async_trait;
use bytes::Bytes;

use crate::domain::{JobId, Stage};

/// Unit of work handed to a stage.
#[derive(Debug, Clone)]
pub enum StagePayload {
    Audio { filename: String, data: Bytes },
    Transcript(String),
}

/// One dispatch: the payload plus the correlation fields the stage echoes
/// back when it calls us.
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    pub stage: Stage,
    pub job_id: JobId,
    pub callback_url: String,
    pub payload: StagePayload,
}

/// Sends work to a downstream stage. `Ok` means the stage accepted the work
/// for asynchronous processing; the result arrives later via callback.
#[async_trait]
pub trait StageClient: Send + Sync {
    async fn dispatch(&self, request: &DispatchRequest) -> Result<(), StageClientError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StageClientError {
    #[error("request failed: {0}")]
    RequestFailed(String),
    #[error("stage rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

impl StageClientError {
    /// Transport errors and rejections may succeed on a later attempt; a
    /// payload the client cannot even encode will not.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, StageClientError::InvalidPayload(_))
    }
}
