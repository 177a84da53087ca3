use std::fmt;

use serde::{Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    New,
    QueuedAsr,
    SentToAsr,
    AsrDone,
    QueuedMl,
    SentToMl,
    MlDone,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::New => "NEW",
            JobStatus::QueuedAsr => "QUEUED_ASR",
            JobStatus::SentToAsr => "SENT_TO_ASR",
            JobStatus::AsrDone => "ASR_DONE",
            JobStatus::QueuedMl => "QUEUED_ML",
            JobStatus::SentToMl => "SENT_TO_ML",
            JobStatus::MlDone => "ML_DONE",
        }
    }

    /// Whether `next` is an edge of the pipeline state machine.
    ///
    /// Demotions from `SENT_TO_*` back to `QUEUED_*` are the only edges that
    /// move against pipeline order; they follow a failed dispatch.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;

        matches!(
            (self, next),
            (New, QueuedAsr)
                | (New, SentToAsr)
                | (QueuedAsr, SentToAsr)
                | (SentToAsr, QueuedAsr)
                | (SentToAsr, AsrDone)
                | (AsrDone, QueuedMl)
                | (AsrDone, SentToMl)
                | (QueuedMl, SentToMl)
                | (SentToMl, QueuedMl)
                | (SentToMl, MlDone)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for JobStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
