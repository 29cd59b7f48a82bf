//! dam-worker: runs document enrichment jobs from the PostgreSQL queue.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dam_core::{ChannelLayer, EmbeddingBackend, Translator};
use dam_db::{log_pool_metrics, Database, LocalObjectStorage, StorageConfig};
use dam_inference::{HttpAnalysisClient, OpenAIBackend};
use dam_jobs::{
    DocumentPipeline, EmbeddingMode, EnrichmentHandler, PipelineConfig, PipelineServices,
    WorkerBuilder, WorkerConfig,
};

/// Initialize tracing.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, daily rotation)
///   RUST_LOG    - standard env filter (default: "dam_jobs=debug,dam_db=info")
fn init_tracing() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "dam_jobs=debug,dam_db=info,dam_inference=info".into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = match log_file {
        Some(ref path) => {
            let path = std::path::Path::new(path);
            let dir = path.parent().unwrap_or(std::path::Path::new("."));
            let name = path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("dam-worker.log");
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, name));
            if log_format == "json" {
                registry
                    .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                    .init();
            } else {
                registry
                    .with(
                        tracing_subscriber::fmt::layer()
                            .with_ansi(false)
                            .with_writer(writer),
                    )
                    .init();
            }
            Some(guard)
        }
        None => {
            if log_format == "json" {
                registry.with(tracing_subscriber::fmt::layer().json()).init();
            } else {
                registry.with(tracing_subscriber::fmt::layer()).init();
            }
            None
        }
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing();

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let db = Database::connect(&database_url)
        .await
        .context("Failed to connect to database")?;
    db.migrate().await.context("Failed to run migrations")?;
    log_pool_metrics(&db.pool);

    let Database {
        documents, jobs, ..
    } = db;
    let wake = jobs.job_notify();
    let jobs = Arc::new(jobs);

    let storage = Arc::new(LocalObjectStorage::new(
        StorageConfig::from_env().context("Invalid storage configuration")?,
    ));
    let analysis = Arc::new(HttpAnalysisClient::from_env()?);

    let config = PipelineConfig::from_env()?;
    let embedder: Option<Arc<dyn EmbeddingBackend>> = match config.embedding_mode {
        EmbeddingMode::Provider => Some(Arc::new(OpenAIBackend::from_env()?)),
        EmbeddingMode::Simulated => None,
    };
    let translator: Option<Arc<dyn Translator>> = config
        .translation
        .as_ref()
        .map(|_| analysis.clone() as Arc<dyn Translator>);

    let pipeline = DocumentPipeline::new(
        config,
        PipelineServices {
            documents: Arc::new(documents),
            storage,
            text_detector: analysis.clone(),
            text_jobs: analysis.clone(),
            labels: analysis,
            translator,
            embedder,
            channel: Arc::new(ChannelLayer::default()),
        },
    )?;

    // The pipeline's run deadline has to fire before the worker drops the job.
    let mut worker_config = WorkerConfig::from_env();
    let min_job_timeout = pipeline.run_deadline().as_secs() + 60;
    if worker_config.job_timeout_secs < min_job_timeout {
        warn!(
            configured = worker_config.job_timeout_secs,
            raised_to = min_job_timeout,
            "JOB_TIMEOUT_SECS is below the pipeline run deadline"
        );
        worker_config.job_timeout_secs = min_job_timeout;
    }

    let worker = WorkerBuilder::new(jobs)
        .with_config(worker_config)
        .with_wake(wake)
        .with_handler(EnrichmentHandler::new(Arc::new(pipeline)))
        .build()
        .await;
    let handle = worker.start();
    info!("dam-worker running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    info!("Shutting down");
    if let Err(e) = handle.shutdown().await {
        info!(error = %e, "Worker already stopped");
    }
    handle.join().await;
    Ok(())
}
