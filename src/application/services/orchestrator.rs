use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Mutex;
use tokio_util::task::TaskTracker;

use super::admission::StageLimits;
use super::job_registry::{
    CallbackOutcome, DispatchPlan, JobRegistry, PlannedWork, RegistryError, RegistrySnapshot,
};
use super::retry_sender::{RetryPolicy, RetrySender};
use crate::application::ports::{
    AudioStore, AudioStoreError, DispatchRequest, ResultSink, StageClient, StagePayload,
};
use crate::domain::{Job, JobId, MlResult, Stage, StoragePath};

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub limits: StageLimits,
    pub retry: RetryPolicy,
    /// Base URL under which stages reach `/cb/asr` and `/cb/ml`.
    pub callback_base_url: String,
    pub delete_audio_after_transcription: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("uploaded audio is empty")]
    EmptyAudio,
    #[error("audio storage: {0}")]
    Storage(#[from] AudioStoreError),
    #[error("registry: {0}")]
    Registry(#[from] RegistryError),
}

/// Routes jobs through the ASR and ML stages.
///
/// State changes happen under one registry lock. Network calls never do:
/// a dispatch is planned (and the job marked sent) under the lock, performed
/// on a tracked task without it, and only its failure re-takes the lock.
pub struct PipelineOrchestrator {
    registry: Mutex<JobRegistry>,
    sender: RetrySender,
    audio_store: Arc<dyn AudioStore>,
    result_sink: Option<Arc<dyn ResultSink>>,
    callback_base_url: String,
    delete_audio_after_transcription: bool,
    tasks: TaskTracker,
}

impl PipelineOrchestrator {
    pub fn new(
        config: OrchestratorConfig,
        client: Arc<dyn StageClient>,
        audio_store: Arc<dyn AudioStore>,
    ) -> Self {
        Self {
            registry: Mutex::new(JobRegistry::new(config.limits)),
            sender: RetrySender::new(client, config.retry),
            audio_store,
            result_sink: None,
            callback_base_url: config.callback_base_url.trim_end_matches('/').to_string(),
            delete_audio_after_transcription: config.delete_audio_after_transcription,
            tasks: TaskTracker::new(),
        }
    }

    pub fn with_result_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.result_sink = Some(sink);
        self
    }

    pub fn result_sink(&self) -> Option<&Arc<dyn ResultSink>> {
        self.result_sink.as_ref()
    }

    pub fn callback_url(&self, stage: Stage) -> String {
        format!("{}{}", self.callback_base_url, stage.callback_path())
    }

    /// Stores the audio, registers a job and admits it to ASR (or queues it).
    #[tracing::instrument(skip(self, data), fields(bytes = data.len()))]
    pub async fn ingest(self: &Arc<Self>, filename: &str, data: Bytes) -> Result<JobId, IngestError> {
        if data.is_empty() {
            return Err(IngestError::EmptyAudio);
        }

        let job_id = JobId::new();
        let audio_ref = StoragePath::new(&job_id, filename);
        let size = self.audio_store.store(&audio_ref, data).await?;

        let display_name = if filename.trim().is_empty() {
            String::new()
        } else {
            audio_ref.file_name().to_string()
        };
        let job = Job::new(job_id, display_name, audio_ref);

        let plans = {
            let mut registry = self.registry.lock().await;
            registry.insert(job)?;
            let mut plans: Vec<DispatchPlan> = registry
                .admit_or_enqueue(job_id, Stage::Asr)?
                .into_iter()
                .collect();
            plans.extend(registry.plan_dispatches());
            plans
        };

        tracing::info!(job_id = %job_id, bytes = size, "Audio job ingested");
        self.launch(plans);
        Ok(job_id)
    }

    pub async fn on_asr_callback(self: &Arc<Self>, request_id: &str, text: String) -> CallbackOutcome {
        let Ok(job_id) = request_id.parse::<JobId>() else {
            tracing::warn!(request_id = %request_id, "ASR callback with malformed request id");
            return CallbackOutcome::Unknown;
        };

        let (outcome, audio_ref, plans) = {
            let mut registry = self.registry.lock().await;
            let (outcome, ml_plan) = registry.accept_transcript(job_id, text);
            let mut plans: Vec<DispatchPlan> = ml_plan.into_iter().collect();
            let mut audio_ref = None;
            if outcome == CallbackOutcome::Accepted {
                plans.extend(registry.plan_dispatches());
                audio_ref = registry.get(&job_id).map(|job| job.audio_ref.clone());
            }
            (outcome, audio_ref, plans)
        };

        log_callback(Stage::Asr, job_id, outcome);
        self.launch(plans);

        if self.delete_audio_after_transcription {
            if let Some(path) = audio_ref {
                self.discard_audio(path);
            }
        }

        outcome
    }

    pub async fn on_ml_callback(self: &Arc<Self>, request_id: &str, result: MlResult) -> CallbackOutcome {
        let Ok(job_id) = request_id.parse::<JobId>() else {
            tracing::warn!(request_id = %request_id, "ML callback with malformed request id");
            return CallbackOutcome::Unknown;
        };

        let (outcome, finished, plans) = {
            let mut registry = self.registry.lock().await;
            let outcome = registry.accept_result(job_id, result);
            if outcome == CallbackOutcome::Accepted {
                let finished = registry.get(&job_id).cloned();
                (outcome, finished, registry.plan_dispatches())
            } else {
                (outcome, None, Vec::new())
            }
        };

        log_callback(Stage::Ml, job_id, outcome);
        self.launch(plans);

        if let (Some(job), Some(sink)) = (finished, self.result_sink.clone()) {
            self.tasks.spawn(async move {
                if let Err(e) = sink.export(&job).await {
                    tracing::warn!(job_id = %job.id, error = %e, "Result export failed");
                }
            });
        }

        outcome
    }

    /// Moves queued jobs into free admission slots and dispatches them.
    pub async fn drain(self: &Arc<Self>) {
        let plans = self.registry.lock().await.plan_dispatches();
        if !plans.is_empty() {
            tracing::debug!(count = plans.len(), "Draining stage queues");
        }
        self.launch(plans);
    }

    pub async fn status(&self, job_id: &JobId) -> Option<Job> {
        self.registry.lock().await.get(job_id).cloned()
    }

    pub async fn health(&self) -> RegistrySnapshot {
        self.registry.lock().await.snapshot()
    }

    /// Waits until no dispatch, export or cleanup task is running. A dispatch
    /// that fails and re-queues its job keeps this waiting through the pause
    /// and the retry, so a job that can never be sent keeps it waiting until
    /// the caller's own timeout.
    pub async fn wait_for_dispatches(&self) {
        self.tasks.close();
        self.tasks.wait().await;
        self.tasks.reopen();
    }

    fn launch(self: &Arc<Self>, plans: Vec<DispatchPlan>) {
        for plan in plans {
            self.tasks.spawn(Arc::clone(self).dispatch(plan));
        }
    }

    fn dispatch(self: Arc<Self>, plan: DispatchPlan) -> BoxFuture<'static, ()> {
        async move {
            let request = match self.build_request(&plan).await {
                Ok(request) => request,
                Err(e) => {
                    self.dispatch_failed(&plan, format!("audio unavailable: {}", e))
                        .await;
                    return;
                }
            };

            match self.sender.send(&request).await {
                Ok(accepted) => tracing::info!(
                    job_id = %plan.job_id,
                    stage = %plan.stage,
                    attempts = accepted.attempts,
                    "Stage accepted job"
                ),
                Err(failure) => self.dispatch_failed(&plan, failure.to_string()).await,
            }
        }
        .boxed()
    }

    async fn build_request(&self, plan: &DispatchPlan) -> Result<DispatchRequest, AudioStoreError> {
        let payload = match &plan.work {
            PlannedWork::Audio {
                audio_ref,
                filename,
            } => StagePayload::Audio {
                filename: filename.clone(),
                data: self.audio_store.fetch(audio_ref).await?,
            },
            PlannedWork::Transcript(text) => StagePayload::Transcript(text.clone()),
        };

        Ok(DispatchRequest {
            stage: plan.stage,
            job_id: plan.job_id,
            callback_url: self.callback_url(plan.stage),
            payload,
        })
    }

    async fn dispatch_failed(self: &Arc<Self>, plan: &DispatchPlan, error: String) {
        let requeued = self
            .registry
            .lock()
            .await
            .record_dispatch_failure(plan.job_id, plan.stage, &error);

        if requeued {
            let pause = self.redispatch_pause();
            tracing::warn!(
                job_id = %plan.job_id,
                stage = %plan.stage,
                error = %error,
                retry_in_ms = pause.as_millis() as u64,
                "Dispatch failed, job re-queued"
            );
            tokio::time::sleep(pause).await;
            self.drain().await;
        } else {
            tracing::debug!(
                job_id = %plan.job_id,
                stage = %plan.stage,
                "Dispatch failure ignored, job already advanced"
            );
        }
    }

    /// Wait between a failed dispatch and the drain that retries it: the
    /// backoff the sender would use after its final attempt. Failures that
    /// never reached the sender (audio fetch, unencodable payload) get the
    /// same pause.
    fn redispatch_pause(&self) -> Duration {
        let policy = self.sender.policy();
        policy.delay_after(policy.max_attempts)
    }

    fn discard_audio(&self, path: StoragePath) {
        let store = Arc::clone(&self.audio_store);
        self.tasks.spawn(async move {
            if let Err(e) = store.delete(&path).await {
                tracing::warn!(error = %e, path = %path, "Failed to delete transcribed audio");
            }
        });
    }
}

fn log_callback(stage: Stage, job_id: JobId, outcome: CallbackOutcome) {
    match outcome {
        CallbackOutcome::Accepted => {
            tracing::info!(job_id = %job_id, stage = %stage, "Stage callback accepted")
        }
        CallbackOutcome::Duplicate => {
            tracing::info!(job_id = %job_id, stage = %stage, "Duplicate stage callback")
        }
        CallbackOutcome::Unknown => {
            tracing::warn!(job_id = %job_id, stage = %stage, "Callback for unknown job")
        }
    }
}
