use std::path::PathBuf;

use async_trait::async_trait;

use crate::application::ports::{ResultSink, ResultSinkError};
use crate::domain::Job;

/// Writes `<stem>.json` (the full job record) and `<stem>.txt` (the
/// transcript) for every finished job.
pub struct FileResultExporter {
    out_dir: PathBuf,
}

impl FileResultExporter {
    pub fn new(out_dir: PathBuf) -> Result<Self, ResultSinkError> {
        std::fs::create_dir_all(&out_dir)?;
        Ok(Self { out_dir })
    }

    fn paths(&self, stem: &str) -> (PathBuf, PathBuf) {
        (
            self.out_dir.join(format!("{}.json", stem)),
            self.out_dir.join(format!("{}.txt", stem)),
        )
    }
}

#[async_trait]
impl ResultSink for FileResultExporter {
    async fn export(&self, job: &Job) -> Result<(), ResultSinkError> {
        let (json_path, txt_path) = self.paths(&job.export_stem());

        let record = serde_json::to_string_pretty(job)?;
        tokio::fs::write(&json_path, record).await?;

        let text = job.transcript.as_deref().unwrap_or_default().trim();
        tokio::fs::write(&txt_path, text).await?;

        tracing::info!(job_id = %job.id, path = %json_path.display(), "Job result exported");
        Ok(())
    }

    async fn is_exported(&self, stem: &str) -> bool {
        let (json_path, txt_path) = self.paths(stem);
        matches!(tokio::fs::try_exists(&json_path).await, Ok(true))
            && matches!(tokio::fs::try_exists(&txt_path).await, Ok(true))
    }
}
