use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{JobId, JobStatus, MlResult, StoragePath};

#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub filename: String,
    pub audio_ref: StoragePath,
    pub transcript: Option<String>,
    pub result: Option<MlResult>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}

impl Job {
    pub fn new(id: JobId, filename: String, audio_ref: StoragePath) -> Self {
        let now = Utc::now();
        Self {
            id,
            status: JobStatus::New,
            filename,
            audio_ref,
            transcript: None,
            result: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Moves the job along one edge of the state machine and returns the
    /// previous status.
    pub fn transition(&mut self, next: JobStatus) -> Result<JobStatus, TransitionError> {
        let from = self.status;
        if !from.can_transition_to(next) {
            return Err(TransitionError { from, to: next });
        }
        self.status = next;
        self.updated_at = Utc::now();
        tracing::debug!(job_id = %self.id, from = %from, to = %next, "Job status transition");
        Ok(from)
    }

    /// Returns false when a transcript is already present.
    pub fn set_transcript(&mut self, text: String) -> bool {
        if self.transcript.is_some() {
            return false;
        }
        self.transcript = Some(text);
        true
    }

    /// Returns false when a result is already present.
    pub fn set_result(&mut self, result: MlResult) -> bool {
        if self.result.is_some() {
            return false;
        }
        self.result = Some(result);
        true
    }

    pub fn record_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Name used for exported artifacts: the uploaded file's stem, or the job
    /// id when the upload carried no usable name.
    pub fn export_stem(&self) -> String {
        Path::new(&self.filename)
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .unwrap_or_else(|| self.id.to_string())
    }
}
