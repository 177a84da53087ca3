use std::fmt;

use serde::{Serialize, Serializer};

use super::JobId;

const FALLBACK_FILENAME: &str = "audio.bin";

/// Location of a job's audio inside the audio store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoragePath(String);

impl StoragePath {
    /// Builds `<job id>/<file name>`, keeping only the last path component of
    /// the uploaded name.
    pub fn new(job_id: &JobId, filename: &str) -> Self {
        Self(format!("{}/{}", job_id.as_uuid(), sanitize_filename(filename)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

fn sanitize_filename(filename: &str) -> &str {
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        FALLBACK_FILENAME
    } else {
        name
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for StoragePath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
