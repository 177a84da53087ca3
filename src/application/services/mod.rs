mod admission;
mod inbox;
mod job_registry;
mod orchestrator;
mod retry_sender;
mod stage_queues;

pub use admission::{AdmissionController, StageLimits};
pub use inbox::InboxScanner;
pub use job_registry::{
    CallbackOutcome, DispatchPlan, JobRegistry, PlannedWork, RegistryError, RegistrySnapshot,
    StageCounts,
};
pub use orchestrator::{IngestError, OrchestratorConfig, PipelineOrchestrator};
pub use retry_sender::{Accepted, DispatchFailure, RetryPolicy, RetrySender};
pub use stage_queues::StageQueues;
