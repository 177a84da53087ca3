use std::fmt;

use serde::Serialize;

use super::JobStatus;

/// A downstream asynchronous processing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Asr,
    Ml,
}

impl Stage {
    pub const ALL: [Stage; 2] = [Stage::Asr, Stage::Ml];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Asr => "asr",
            Stage::Ml => "ml",
        }
    }

    pub fn index(&self) -> usize {
        match self {
            Stage::Asr => 0,
            Stage::Ml => 1,
        }
    }

    /// Status of a job waiting for a free slot in this stage.
    pub fn queued_status(&self) -> JobStatus {
        match self {
            Stage::Asr => JobStatus::QueuedAsr,
            Stage::Ml => JobStatus::QueuedMl,
        }
    }

    /// Status of a job holding a slot in this stage.
    pub fn in_flight_status(&self) -> JobStatus {
        match self {
            Stage::Asr => JobStatus::SentToAsr,
            Stage::Ml => JobStatus::SentToMl,
        }
    }

    /// Status reached when this stage's callback is accepted.
    pub fn done_status(&self) -> JobStatus {
        match self {
            Stage::Asr => JobStatus::AsrDone,
            Stage::Ml => JobStatus::MlDone,
        }
    }

    pub fn callback_path(&self) -> &'static str {
        match self {
            Stage::Asr => "/cb/asr",
            Stage::Ml => "/cb/ml",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
