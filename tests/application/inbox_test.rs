use std::sync::Arc;

use raai::application::services::{InboxScanner, PipelineOrchestrator};
use raai::domain::Stage;
use raai::infrastructure::export::FileResultExporter;
use raai::infrastructure::storage::ObjectAudioStore;

use crate::helpers::{FakeStageClient, build_orchestrator, test_config};

fn wav_extensions() -> Vec<String> {
    vec!["wav".to_string(), ".MP3".to_string()]
}

#[tokio::test]
async fn given_inbox_with_mixed_files_when_listing_then_only_audio_sorted() {
    let inbox = tempfile::tempdir().unwrap();
    std::fs::write(inbox.path().join("b.wav"), b"bbbb").unwrap();
    std::fs::write(inbox.path().join("a.WAV"), b"aaaa").unwrap();
    std::fs::write(inbox.path().join("c.mp3"), b"cccc").unwrap();
    std::fs::write(inbox.path().join("notes.txt"), b"skip").unwrap();
    std::fs::create_dir(inbox.path().join("nested.wav")).unwrap();

    let client = FakeStageClient::new();
    let orchestrator = build_orchestrator(1, 1, &client);
    let scanner = InboxScanner::new(inbox.path().to_path_buf(), &wav_extensions());

    let files = scanner.pending_files(&orchestrator).await.unwrap();
    let names: Vec<String> = files
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();

    assert_eq!(names, vec!["a.WAV", "b.wav", "c.mp3"]);
}

#[tokio::test]
async fn given_exported_result_when_scanning_then_file_skipped_and_rest_ingested() {
    let inbox = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    std::fs::write(inbox.path().join("done.wav"), b"done").unwrap();
    std::fs::write(inbox.path().join("fresh.wav"), b"fresh").unwrap();
    std::fs::write(out.path().join("done.json"), b"{}").unwrap();
    std::fs::write(out.path().join("done.txt"), b"text").unwrap();

    let client = FakeStageClient::new();
    let exporter = Arc::new(FileResultExporter::new(out.path().to_path_buf()).unwrap());
    let orchestrator = Arc::new(
        PipelineOrchestrator::new(
            test_config(1, 1),
            client.clone(),
            Arc::new(ObjectAudioStore::in_memory()),
        )
        .with_result_sink(exporter),
    );
    let scanner = InboxScanner::new(inbox.path().to_path_buf(), &wav_extensions());

    let ingested = scanner.ingest_all(&orchestrator).await.unwrap();
    orchestrator.wait_for_dispatches().await;

    assert_eq!(ingested, 1);
    let attempts = client.attempts_for(Stage::Asr);
    assert_eq!(attempts.len(), 1);
    let job = orchestrator.status(&attempts[0].job_id).await.unwrap();
    assert_eq!(job.filename, "fresh.wav");
}

#[tokio::test]
async fn given_missing_inbox_dir_when_scanning_then_io_error() {
    let client = FakeStageClient::new();
    let orchestrator = build_orchestrator(1, 1, &client);
    let scanner = InboxScanner::new("/nonexistent/raai-inbox".into(), &wav_extensions());

    assert!(scanner.ingest_all(&orchestrator).await.is_err());
}
