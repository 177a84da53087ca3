use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use raai::application::ports::{AudioStore, AudioStoreError, StagePayload};
use raai::application::services::{
    CallbackOutcome, IngestError, PipelineOrchestrator, RetryPolicy,
};
use raai::domain::{JobId, JobStatus, MlResult, Stage, StoragePath};
use raai::infrastructure::export::FileResultExporter;
use raai::infrastructure::storage::ObjectAudioStore;
use serde_json::json;

use crate::helpers::{CALLBACK_BASE, FakeStageClient, build_orchestrator, test_config, wav_bytes};

fn result() -> MlResult {
    MlResult {
        service: json!({"label": "billing", "score": 0.88}),
        priority: json!("high"),
        problem: json!("double charge"),
    }
}

/// Accepts uploads but loses them: every fetch reports the object missing.
#[derive(Default)]
struct VanishingAudioStore {
    fetches: AtomicUsize,
}

#[async_trait::async_trait]
impl AudioStore for VanishingAudioStore {
    async fn store(&self, _path: &StoragePath, data: Bytes) -> Result<u64, AudioStoreError> {
        Ok(data.len() as u64)
    }

    async fn fetch(&self, path: &StoragePath) -> Result<Bytes, AudioStoreError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Err(AudioStoreError::NotFound(path.to_string()))
    }

    async fn delete(&self, _path: &StoragePath) -> Result<(), AudioStoreError> {
        Ok(())
    }
}

async fn status(orchestrator: &PipelineOrchestrator, id: &JobId) -> JobStatus {
    orchestrator.status(id).await.unwrap().status
}

#[tokio::test]
async fn given_uploaded_audio_when_both_stages_complete_then_job_done() {
    let client = FakeStageClient::new();
    let orchestrator = build_orchestrator(1, 1, &client);

    let id = orchestrator.ingest("call.wav", wav_bytes()).await.unwrap();
    orchestrator.wait_for_dispatches().await;

    let asr = client.attempts_for(Stage::Asr);
    assert_eq!(asr.len(), 1);
    assert_eq!(asr[0].job_id, id);
    assert_eq!(asr[0].callback_url, format!("{}/cb/asr", CALLBACK_BASE));
    match &asr[0].payload {
        StagePayload::Audio { filename, data } => {
            assert_eq!(filename, "call.wav");
            assert_eq!(data, &wav_bytes());
        }
        other => panic!("expected audio payload, got {:?}", other),
    }
    assert_eq!(status(&orchestrator, &id).await, JobStatus::SentToAsr);

    let outcome = orchestrator
        .on_asr_callback(&id.to_string(), "I was charged twice".to_string())
        .await;
    orchestrator.wait_for_dispatches().await;

    assert_eq!(outcome, CallbackOutcome::Accepted);
    let ml = client.attempts_for(Stage::Ml);
    assert_eq!(ml.len(), 1);
    assert_eq!(ml[0].callback_url, format!("{}/cb/ml", CALLBACK_BASE));
    assert!(matches!(&ml[0].payload, StagePayload::Transcript(t) if t == "I was charged twice"));
    assert_eq!(status(&orchestrator, &id).await, JobStatus::SentToMl);

    let outcome = orchestrator.on_ml_callback(&id.to_string(), result()).await;
    orchestrator.wait_for_dispatches().await;

    assert_eq!(outcome, CallbackOutcome::Accepted);
    let job = orchestrator.status(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::MlDone);
    assert_eq!(job.transcript.as_deref(), Some("I was charged twice"));
    assert_eq!(job.result, Some(result()));

    let health = orchestrator.health().await;
    assert_eq!(health.in_flight.asr, 0);
    assert_eq!(health.in_flight.ml, 0);
}

#[tokio::test]
async fn given_empty_upload_when_ingesting_then_rejected_without_job() {
    let client = FakeStageClient::new();
    let orchestrator = build_orchestrator(1, 1, &client);

    let err = orchestrator
        .ingest("call.wav", bytes::Bytes::new())
        .await
        .unwrap_err();

    assert!(matches!(err, IngestError::EmptyAudio));
    assert_eq!(orchestrator.health().await.jobs, 0);
}

#[tokio::test]
async fn given_asr_limit_one_when_three_jobs_ingested_then_one_sent_two_queued() {
    let client = FakeStageClient::new();
    let orchestrator = build_orchestrator(1, 1, &client);

    let mut ids = Vec::new();
    for name in ["a.wav", "b.wav", "c.wav"] {
        ids.push(orchestrator.ingest(name, wav_bytes()).await.unwrap());
    }
    orchestrator.wait_for_dispatches().await;

    assert_eq!(client.accepted_ids(Stage::Asr), vec![ids[0]]);
    assert_eq!(status(&orchestrator, &ids[1]).await, JobStatus::QueuedAsr);
    assert_eq!(status(&orchestrator, &ids[2]).await, JobStatus::QueuedAsr);
    let health = orchestrator.health().await;
    assert_eq!(health.in_flight.asr, 1);
    assert_eq!(health.queue_depth.asr, 2);

    orchestrator
        .on_asr_callback(&ids[0].to_string(), "first".to_string())
        .await;
    orchestrator.wait_for_dispatches().await;

    assert_eq!(client.accepted_ids(Stage::Asr), vec![ids[0], ids[1]]);
    assert_eq!(status(&orchestrator, &ids[1]).await, JobStatus::SentToAsr);
    assert_eq!(status(&orchestrator, &ids[2]).await, JobStatus::QueuedAsr);
}

#[tokio::test]
async fn given_repeated_asr_callback_when_delivered_then_duplicate_and_single_ml_dispatch() {
    let client = FakeStageClient::new();
    let orchestrator = build_orchestrator(1, 1, &client);
    let id = orchestrator.ingest("call.wav", wav_bytes()).await.unwrap();
    orchestrator.wait_for_dispatches().await;

    let first = orchestrator
        .on_asr_callback(&id.to_string(), "original".to_string())
        .await;
    let second = orchestrator
        .on_asr_callback(&id.to_string(), "replayed".to_string())
        .await;
    orchestrator.wait_for_dispatches().await;

    assert_eq!(first, CallbackOutcome::Accepted);
    assert_eq!(second, CallbackOutcome::Duplicate);
    assert_eq!(client.attempts_for(Stage::Ml).len(), 1);
    let job = orchestrator.status(&id).await.unwrap();
    assert_eq!(job.transcript.as_deref(), Some("original"));
    assert_eq!(orchestrator.health().await.in_flight.ml, 1);
}

#[tokio::test]
async fn given_unknown_or_malformed_id_when_callback_delivered_then_unknown() {
    let client = FakeStageClient::new();
    let orchestrator = build_orchestrator(1, 1, &client);

    let malformed = orchestrator
        .on_asr_callback("not-a-job", "text".to_string())
        .await;
    let missing = orchestrator
        .on_ml_callback(&JobId::new().to_string(), result())
        .await;

    assert_eq!(malformed, CallbackOutcome::Unknown);
    assert_eq!(missing, CallbackOutcome::Unknown);
    assert!(client.attempts().is_empty());
}

#[tokio::test]
async fn given_stage_rejecting_all_retries_when_dispatching_then_requeued_and_redispatched() {
    let client = FakeStageClient::new();
    client.fail_next(Stage::Asr, 3);
    let orchestrator = build_orchestrator(1, 1, &client);

    let id = orchestrator.ingest("call.wav", wav_bytes()).await.unwrap();
    orchestrator.wait_for_dispatches().await;

    let attempts = client.attempts_for(Stage::Asr);
    assert_eq!(attempts.len(), 4);
    assert!(attempts[..3].iter().all(|a| !a.accepted));
    assert!(attempts[3].accepted);

    let job = orchestrator.status(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::SentToAsr);
    assert!(job.last_error.as_deref().unwrap_or_default().contains("503"));
    assert_eq!(orchestrator.health().await.in_flight.asr, 1);
}

#[tokio::test]
async fn given_failed_dispatch_with_waiting_job_when_requeued_then_waiting_job_goes_first() {
    let client = FakeStageClient::new();
    client.fail_next(Stage::Asr, 3);
    let orchestrator = build_orchestrator(1, 1, &client);

    let failing = orchestrator.ingest("a.wav", wav_bytes()).await.unwrap();
    let waiting = orchestrator.ingest("b.wav", wav_bytes()).await.unwrap();
    orchestrator.wait_for_dispatches().await;

    assert_eq!(client.accepted_ids(Stage::Asr), vec![waiting]);
    assert_eq!(status(&orchestrator, &failing).await, JobStatus::QueuedAsr);
    assert_eq!(status(&orchestrator, &waiting).await, JobStatus::SentToAsr);

    orchestrator
        .on_asr_callback(&waiting.to_string(), "b".to_string())
        .await;
    orchestrator.wait_for_dispatches().await;

    assert_eq!(client.accepted_ids(Stage::Asr), vec![waiting, failing]);
    assert_eq!(status(&orchestrator, &failing).await, JobStatus::SentToAsr);
}

#[tokio::test]
async fn given_ml_stage_failing_when_transcript_accepted_then_ml_redispatched() {
    let client = FakeStageClient::new();
    client.fail_next(Stage::Ml, 3);
    let orchestrator = build_orchestrator(1, 1, &client);
    let id = orchestrator.ingest("call.wav", wav_bytes()).await.unwrap();
    orchestrator.wait_for_dispatches().await;

    orchestrator
        .on_asr_callback(&id.to_string(), "text".to_string())
        .await;
    orchestrator.wait_for_dispatches().await;

    assert_eq!(client.attempts_for(Stage::Ml).len(), 4);
    assert_eq!(client.accepted_ids(Stage::Ml), vec![id]);
    assert_eq!(status(&orchestrator, &id).await, JobStatus::SentToMl);
}

#[tokio::test]
async fn given_hung_stage_when_dispatch_pending_then_status_health_and_callbacks_respond() {
    let client = FakeStageClient::gated();
    let orchestrator = build_orchestrator(1, 1, &client);

    let id = orchestrator.ingest("call.wav", wav_bytes()).await.unwrap();
    tokio::task::yield_now().await;

    let status = tokio::time::timeout(Duration::from_secs(1), orchestrator.status(&id))
        .await
        .expect("status blocked by pending dispatch")
        .unwrap();
    assert_eq!(status.status, JobStatus::SentToAsr);

    let health = tokio::time::timeout(Duration::from_secs(1), orchestrator.health())
        .await
        .expect("health blocked by pending dispatch");
    assert_eq!(health.in_flight.asr, 1);

    let outcome = tokio::time::timeout(
        Duration::from_secs(1),
        orchestrator.on_asr_callback(&id.to_string(), "fast stage".to_string()),
    )
    .await
    .expect("callback blocked by pending dispatch");
    assert_eq!(outcome, CallbackOutcome::Accepted);

    client.open_gate();
    orchestrator.wait_for_dispatches().await;

    assert_eq!(client.accepted_ids(Stage::Asr), vec![id]);
    assert_eq!(client.accepted_ids(Stage::Ml), vec![id]);
}

#[tokio::test]
async fn given_delete_after_transcription_when_asr_accepted_then_audio_removed() {
    let client = FakeStageClient::new();
    let store = Arc::new(ObjectAudioStore::in_memory());
    let mut config = test_config(1, 1);
    config.delete_audio_after_transcription = true;
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        config,
        client.clone(),
        store.clone(),
    ));

    let id = orchestrator.ingest("call.wav", wav_bytes()).await.unwrap();
    orchestrator.wait_for_dispatches().await;
    let audio_ref = orchestrator.status(&id).await.unwrap().audio_ref;
    assert!(store.fetch(&audio_ref).await.is_ok());

    orchestrator
        .on_asr_callback(&id.to_string(), "text".to_string())
        .await;
    orchestrator.wait_for_dispatches().await;

    assert!(store.fetch(&audio_ref).await.is_err());
}

#[tokio::test]
async fn given_result_sink_when_ml_accepted_then_result_exported() {
    let out_dir = tempfile::tempdir().unwrap();
    let client = FakeStageClient::new();
    let exporter = Arc::new(FileResultExporter::new(out_dir.path().to_path_buf()).unwrap());
    let orchestrator = Arc::new(
        PipelineOrchestrator::new(
            test_config(1, 1),
            client.clone(),
            Arc::new(ObjectAudioStore::in_memory()),
        )
        .with_result_sink(exporter),
    );

    let id = orchestrator.ingest("call_17.wav", wav_bytes()).await.unwrap();
    orchestrator.wait_for_dispatches().await;
    orchestrator
        .on_asr_callback(&id.to_string(), "  refund please \n".to_string())
        .await;
    orchestrator.wait_for_dispatches().await;
    orchestrator.on_ml_callback(&id.to_string(), result()).await;
    orchestrator.wait_for_dispatches().await;

    let txt = std::fs::read_to_string(out_dir.path().join("call_17.txt")).unwrap();
    assert_eq!(txt, "refund please");

    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(out_dir.path().join("call_17.json")).unwrap())
            .unwrap();
    assert_eq!(json["status"], "ML_DONE");
    assert_eq!(json["id"], id.to_string());
    assert_eq!(json["result"]["problem"], "double charge");
}

#[tokio::test]
async fn given_many_jobs_when_pipeline_runs_then_limits_never_exceeded_and_all_finish() {
    let client = FakeStageClient::new();
    let orchestrator = build_orchestrator(2, 1, &client);

    let mut ids = Vec::new();
    for i in 0..8 {
        ids.push(
            orchestrator
                .ingest(&format!("{}.wav", i), wav_bytes())
                .await
                .unwrap(),
        );
    }

    for _ in 0..50 {
        orchestrator.wait_for_dispatches().await;

        let health = orchestrator.health().await;
        assert!(health.in_flight.asr <= health.limits.asr);
        assert!(health.in_flight.ml <= health.limits.ml);

        let mut progressed = false;
        for id in &ids {
            match status(&orchestrator, id).await {
                JobStatus::SentToAsr => {
                    orchestrator
                        .on_asr_callback(&id.to_string(), format!("transcript {}", id))
                        .await;
                    progressed = true;
                }
                JobStatus::SentToMl => {
                    orchestrator.on_ml_callback(&id.to_string(), result()).await;
                    progressed = true;
                }
                _ => {}
            }
        }
        if !progressed {
            break;
        }
    }

    for id in &ids {
        assert_eq!(status(&orchestrator, id).await, JobStatus::MlDone);
    }
    assert_eq!(client.accepted_ids(Stage::Asr), ids);
    assert_eq!(client.accepted_ids(Stage::Ml).len(), ids.len());
}

#[tokio::test(start_paused = true)]
async fn given_audio_missing_at_dispatch_when_fetch_fails_then_job_requeued_and_retried_after_backoff() {
    let client = FakeStageClient::new();
    let store = Arc::new(VanishingAudioStore::default());
    let mut config = test_config(1, 1);
    config.retry = RetryPolicy::new(3, Duration::from_millis(500));
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        config,
        client.clone(),
        store.clone(),
    ));

    let id = orchestrator.ingest("a.wav", wav_bytes()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let job = orchestrator.status(&id).await.unwrap();
    assert_eq!(job.status, JobStatus::QueuedAsr);
    assert!(job
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("audio unavailable"));
    let health = orchestrator.health().await;
    assert_eq!(health.in_flight.asr, 0);
    assert_eq!(health.queue_depth.asr, 1);
    assert_eq!(store.fetches.load(Ordering::SeqCst), 1);
    assert!(client.attempts().is_empty());

    // 500ms * 2^2: the pause after a third failed attempt.
    tokio::time::sleep(Duration::from_millis(2000)).await;

    assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
    assert_eq!(status(&orchestrator, &id).await, JobStatus::QueuedAsr);
}

#[tokio::test(start_paused = true)]
async fn given_failed_fetch_pausing_when_new_job_arrives_then_both_wait_queued() {
    let client = FakeStageClient::new();
    let store = Arc::new(VanishingAudioStore::default());
    let mut config = test_config(1, 1);
    config.retry = RetryPolicy::new(3, Duration::from_millis(500));
    let orchestrator = Arc::new(PipelineOrchestrator::new(
        config,
        client.clone(),
        store.clone(),
    ));

    let lost = orchestrator.ingest("lost.wav", wav_bytes()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let later = orchestrator.ingest("later.wav", wav_bytes()).await.unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // The second ingest admits the queue head, whose fetch fails again.
    assert_eq!(store.fetches.load(Ordering::SeqCst), 2);
    assert_eq!(status(&orchestrator, &lost).await, JobStatus::QueuedAsr);
    assert_eq!(status(&orchestrator, &later).await, JobStatus::QueuedAsr);
    let health = orchestrator.health().await;
    assert_eq!(health.in_flight.asr, 0);
    assert_eq!(health.queue_depth.asr, 2);
    assert!(client.attempts().is_empty());
}
