use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;

use raai::application::services::{InboxScanner, PipelineOrchestrator};
use raai::infrastructure::export::FileResultExporter;
use raai::infrastructure::observability::{TracingConfig, init_tracing};
use raai::infrastructure::stages::HttpStageClient;
use raai::infrastructure::storage::AudioStoreFactory;
use raai::presentation::{AppState, Environment, Settings, StageEndpoints, create_router};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let environment = Environment::from_env().map_err(anyhow::Error::msg)?;
    let settings = Settings::load(environment)?;

    init_tracing(
        TracingConfig::from_settings(&settings.logging, environment),
        settings.server.port,
    );

    let audio_store = AudioStoreFactory::create(&settings.storage)?;
    let stage_client = Arc::new(HttpStageClient::new(
        settings.asr_endpoint(),
        settings.ml_endpoint(),
    )?);

    let mut orchestrator =
        PipelineOrchestrator::new(settings.orchestrator_config(), stage_client, audio_store);
    if let Some(out_dir) = &settings.export.out_dir {
        let exporter = FileResultExporter::new(PathBuf::from(out_dir))?;
        orchestrator = orchestrator.with_result_sink(Arc::new(exporter));
    }
    let orchestrator = Arc::new(orchestrator);

    tracing::info!(
        asr_endpoint = %settings.asr.endpoint,
        asr_limit = settings.asr.limit,
        ml_endpoint = %settings.ml.endpoint,
        ml_limit = settings.ml.limit,
        callback_base = %settings.server.public_url,
        "Pipeline configured"
    );

    if let Some(dir) = &settings.inbox.dir {
        let scanner = InboxScanner::new(PathBuf::from(dir), &settings.inbox.extensions);
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            match scanner.ingest_all(&orchestrator).await {
                Ok(count) => tracing::info!(jobs = count, "Inbox scan finished"),
                Err(e) => tracing::error!(error = %e, "Inbox scan failed"),
            }
        });
    }

    let state = AppState {
        orchestrator: Arc::clone(&orchestrator),
        endpoints: StageEndpoints {
            asr: settings.asr.endpoint.clone(),
            ml: settings.ml.endpoint.clone(),
        },
        max_upload_bytes: settings.max_upload_bytes(),
    };

    let router = create_router(state);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port).parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Waiting for in-flight dispatches");
    if tokio::time::timeout(SHUTDOWN_GRACE, orchestrator.wait_for_dispatches())
        .await
        .is_err()
    {
        tracing::warn!("Shutdown timed out after {:?}, abandoning dispatches", SHUTDOWN_GRACE);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
