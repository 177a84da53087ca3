use std::collections::HashMap;

use serde::Serialize;

use super::admission::{AdmissionController, StageLimits};
use super::stage_queues::StageQueues;
use crate::domain::{Job, JobId, MlResult, Stage, StoragePath, TransitionError};

/// What a dispatch has to send, captured while the registry lock is held so
/// the network call itself can run without it.
#[derive(Debug, Clone, PartialEq)]
pub enum PlannedWork {
    Audio {
        audio_ref: StoragePath,
        filename: String,
    },
    Transcript(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct DispatchPlan {
    pub job_id: JobId,
    pub stage: Stage,
    pub work: PlannedWork,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallbackOutcome {
    Accepted,
    Duplicate,
    Unknown,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("job already registered: {0}")]
    DuplicateJob(JobId),
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageCounts {
    pub asr: usize,
    pub ml: usize,
}

impl StageCounts {
    fn collect(f: impl Fn(Stage) -> usize) -> Self {
        Self {
            asr: f(Stage::Asr),
            ml: f(Stage::Ml),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrySnapshot {
    pub in_flight: StageCounts,
    pub limits: StageCounts,
    pub queue_depth: StageCounts,
    pub jobs: usize,
}

/// All orchestrator state: job records, admission counters and stage queues.
///
/// Every method is synchronous; callers hold a single lock around the whole
/// registry, which is what makes each method's check-then-mutate atomic.
#[derive(Debug)]
pub struct JobRegistry {
    jobs: HashMap<JobId, Job>,
    admission: AdmissionController,
    queues: StageQueues,
}

impl JobRegistry {
    pub fn new(limits: StageLimits) -> Self {
        Self {
            jobs: HashMap::new(),
            admission: AdmissionController::new(limits),
            queues: StageQueues::new(),
        }
    }

    pub fn insert(&mut self, job: Job) -> Result<(), RegistryError> {
        if self.jobs.contains_key(&job.id) {
            return Err(RegistryError::DuplicateJob(job.id));
        }
        self.jobs.insert(job.id, job);
        Ok(())
    }

    pub fn get(&self, job_id: &JobId) -> Option<&Job> {
        self.jobs.get(job_id)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn admission(&self) -> &AdmissionController {
        &self.admission
    }

    pub fn queues(&self) -> &StageQueues {
        &self.queues
    }

    /// Sends the job into `stage` if a slot is free and nobody is waiting
    /// ahead of it; otherwise parks it at the back of the stage queue.
    pub fn admit_or_enqueue(
        &mut self,
        job_id: JobId,
        stage: Stage,
    ) -> Result<Option<DispatchPlan>, RegistryError> {
        let job = self
            .jobs
            .get_mut(&job_id)
            .ok_or(RegistryError::NotFound(job_id))?;

        if self.queues.is_empty(stage) && self.admission.try_admit(stage) {
            if let Err(e) = job.transition(stage.in_flight_status()) {
                self.admission.release(stage);
                return Err(e.into());
            }
            return Ok(Some(plan_for(job, stage)));
        }

        job.transition(stage.queued_status())?;
        self.queues.push(stage, job_id);
        tracing::debug!(
            job_id = %job_id,
            stage = %stage,
            queue_depth = self.queues.len(stage),
            "Stage at capacity, job queued"
        );
        Ok(None)
    }

    /// Pops queued jobs into free slots, head first, and marks them sent.
    /// Each id leaves its queue before it is planned, so overlapping drains
    /// never plan the same job twice.
    pub fn plan_dispatches(&mut self) -> Vec<DispatchPlan> {
        let mut plans = Vec::new();

        for stage in Stage::ALL {
            while !self.queues.is_empty(stage) && self.admission.try_admit(stage) {
                let Some(job_id) = self.queues.pop(stage) else {
                    self.admission.release(stage);
                    break;
                };

                let Some(job) = self.jobs.get_mut(&job_id) else {
                    tracing::warn!(job_id = %job_id, stage = %stage, "Queued job has no record");
                    self.admission.release(stage);
                    continue;
                };

                match job.transition(stage.in_flight_status()) {
                    Ok(_) => plans.push(plan_for(job, stage)),
                    Err(e) => {
                        tracing::warn!(job_id = %job_id, error = %e, "Skipping queued job");
                        self.admission.release(stage);
                    }
                }
            }
        }

        plans
    }

    /// Applies an ASR completion. On acceptance the ASR slot is freed and the
    /// job is admitted to (or queued for) the ML stage; the returned plan is
    /// set when ML admission succeeded immediately.
    pub fn accept_transcript(
        &mut self,
        job_id: JobId,
        text: String,
    ) -> (CallbackOutcome, Option<DispatchPlan>) {
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return (CallbackOutcome::Unknown, None);
        };

        if job.status != Stage::Asr.in_flight_status() {
            tracing::debug!(job_id = %job_id, status = %job.status, "Duplicate ASR callback ignored");
            return (CallbackOutcome::Duplicate, None);
        }

        if let Err(e) = job.transition(Stage::Asr.done_status()) {
            tracing::error!(job_id = %job_id, error = %e, "ASR completion rejected");
            return (CallbackOutcome::Duplicate, None);
        }
        job.set_transcript(text);
        self.admission.release(Stage::Asr);

        match self.admit_or_enqueue(job_id, Stage::Ml) {
            Ok(plan) => (CallbackOutcome::Accepted, plan),
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "ML admission failed");
                (CallbackOutcome::Accepted, None)
            }
        }
    }

    /// Applies an ML completion, freeing the ML slot.
    pub fn accept_result(&mut self, job_id: JobId, result: MlResult) -> CallbackOutcome {
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return CallbackOutcome::Unknown;
        };

        if job.status != Stage::Ml.in_flight_status() {
            tracing::debug!(job_id = %job_id, status = %job.status, "Duplicate ML callback ignored");
            return CallbackOutcome::Duplicate;
        }

        if let Err(e) = job.transition(Stage::Ml.done_status()) {
            tracing::error!(job_id = %job_id, error = %e, "ML completion rejected");
            return CallbackOutcome::Duplicate;
        }
        job.set_result(result);
        self.admission.release(Stage::Ml);
        CallbackOutcome::Accepted
    }

    /// Rolls a failed dispatch back: records the error, demotes the job to
    /// the stage's queued state, frees the slot and re-enqueues it.
    ///
    /// Returns false, changing nothing, when the job is no longer in flight
    /// for `stage` (its callback arrived while the dispatch was still
    /// retrying).
    pub fn record_dispatch_failure(&mut self, job_id: JobId, stage: Stage, error: &str) -> bool {
        let Some(job) = self.jobs.get_mut(&job_id) else {
            return false;
        };

        if job.status != stage.in_flight_status() {
            return false;
        }

        if let Err(e) = job.transition(stage.queued_status()) {
            tracing::error!(job_id = %job_id, error = %e, "Dispatch rollback rejected");
            return false;
        }
        job.record_error(error);
        self.admission.release(stage);
        self.queues.push(stage, job_id);
        true
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            in_flight: StageCounts::collect(|s| self.admission.in_flight(s)),
            limits: StageCounts::collect(|s| self.admission.limit(s)),
            queue_depth: StageCounts::collect(|s| self.queues.len(s)),
            jobs: self.jobs.len(),
        }
    }
}

fn plan_for(job: &Job, stage: Stage) -> DispatchPlan {
    let work = match stage {
        Stage::Asr => PlannedWork::Audio {
            audio_ref: job.audio_ref.clone(),
            filename: job.audio_ref.file_name().to_string(),
        },
        Stage::Ml => PlannedWork::Transcript(job.transcript.clone().unwrap_or_default()),
    };
    DispatchPlan {
        job_id: job.id,
        stage,
        work,
    }
}
