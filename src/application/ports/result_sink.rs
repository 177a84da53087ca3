use async_trait::async_trait;

use crate::domain::Job;

/// Destination for finished jobs.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn export(&self, job: &Job) -> Result<(), ResultSinkError>;

    /// Whether artifacts named `stem` were already exported.
    async fn is_exported(&self, stem: &str) -> bool;
}

#[derive(Debug, thiserror::Error)]
pub enum ResultSinkError {
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
