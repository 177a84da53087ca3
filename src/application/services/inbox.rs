use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;

use super::orchestrator::PipelineOrchestrator;

/// Feeds audio files already sitting in a directory into the pipeline.
pub struct InboxScanner {
    dir: PathBuf,
    extensions: Vec<String>,
}

impl InboxScanner {
    pub fn new(dir: PathBuf, extensions: &[String]) -> Self {
        Self {
            dir,
            extensions: extensions
                .iter()
                .map(|e| e.trim_start_matches('.').to_lowercase())
                .collect(),
        }
    }

    /// Files with an accepted extension, sorted by name, minus those whose
    /// results were already exported.
    pub async fn pending_files(
        &self,
        orchestrator: &PipelineOrchestrator,
    ) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_file() && self.accepts(&path) {
                files.push(path);
            }
        }
        files.sort();

        let Some(sink) = orchestrator.result_sink() else {
            return Ok(files);
        };

        let mut pending = Vec::with_capacity(files.len());
        for path in files {
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default();
            if sink.is_exported(stem).await {
                tracing::debug!(path = %path.display(), "Skipping already processed file");
            } else {
                pending.push(path);
            }
        }
        Ok(pending)
    }

    /// Ingests every pending file and returns how many jobs were created.
    /// A file that cannot be read or stored is logged and skipped.
    pub async fn ingest_all(
        &self,
        orchestrator: &Arc<PipelineOrchestrator>,
    ) -> Result<usize, std::io::Error> {
        let files = self.pending_files(orchestrator).await?;
        tracing::info!(dir = %self.dir.display(), files = files.len(), "Scanning audio inbox");

        let mut ingested = 0;
        for path in files {
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();

            let data = match tokio::fs::read(&path).await {
                Ok(data) => data,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to read inbox file");
                    continue;
                }
            };

            match orchestrator.ingest(&filename, Bytes::from(data)).await {
                Ok(job_id) => {
                    tracing::info!(job_id = %job_id, file = %filename, "Inbox file ingested");
                    ingested += 1;
                }
                Err(e) => {
                    tracing::warn!(file = %filename, error = %e, "Failed to ingest inbox file");
                }
            }
        }

        Ok(ingested)
    }

    fn accepts(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| self.extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
            .unwrap_or(false)
    }
}
