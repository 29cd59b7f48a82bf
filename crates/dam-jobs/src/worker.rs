//! Job worker: claims queued jobs and runs their handlers concurrently.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc, Notify, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use dam_core::{defaults, Error, Job, JobRepository, JobType, Result};

use crate::guard::panic_message;
use crate::handler::{JobContext, JobHandler, JobResult};

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Polling interval in milliseconds when the queue is empty.
    pub poll_interval_ms: u64,
    /// Maximum number of concurrent jobs.
    pub max_concurrent_jobs: usize,
    /// Upper bound for a single job, in seconds.
    pub job_timeout_secs: u64,
    /// Whether to enable job processing.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: defaults::JOB_POLL_INTERVAL_MS,
            max_concurrent_jobs: defaults::JOB_MAX_CONCURRENT,
            job_timeout_secs: defaults::JOB_TIMEOUT_SECS,
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables (with defaults).
    ///
    /// | Variable | Default | Description |
    /// |----------|---------|-------------|
    /// | `JOB_WORKER_ENABLED` | `true` | Enable/disable job processing |
    /// | `JOB_MAX_CONCURRENT` | `4` | Max concurrent jobs |
    /// | `JOB_POLL_INTERVAL_MS` | `500` | Polling interval when queue is empty |
    /// | `JOB_TIMEOUT_SECS` | `3600` | Upper bound for a single job |
    pub fn from_env() -> Self {
        let enabled = std::env::var("JOB_WORKER_ENABLED")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let max_concurrent_jobs = std::env::var("JOB_MAX_CONCURRENT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(defaults::JOB_MAX_CONCURRENT)
            .max(1);

        let poll_interval_ms = std::env::var("JOB_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_POLL_INTERVAL_MS);

        let job_timeout_secs = std::env::var("JOB_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults::JOB_TIMEOUT_SECS)
            .max(1);

        Self {
            poll_interval_ms,
            max_concurrent_jobs,
            job_timeout_secs,
            enabled,
        }
    }

    pub fn with_poll_interval(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    pub fn with_max_concurrent(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max.max(1);
        self
    }

    pub fn with_job_timeout(mut self, secs: u64) -> Self {
        self.job_timeout_secs = secs;
        self
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    JobStarted {
        job_id: Uuid,
        job_type: JobType,
    },
    JobCompleted {
        job_id: Uuid,
        job_type: JobType,
    },
    JobFailed {
        job_id: Uuid,
        job_type: JobType,
        error: String,
        /// Whether the job went back to the queue.
        retrying: bool,
    },
    WorkerStarted,
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    /// Signal the worker to shut down after its current batch.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| Error::Internal("Failed to send shutdown signal".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }

    /// Wait for the worker loop to exit.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(error = ?e, "Job worker task ended abnormally");
        }
    }
}

type HandlerMap = Arc<RwLock<HashMap<JobType, Arc<dyn JobHandler>>>>;

/// Job worker that processes jobs from the queue.
pub struct JobWorker {
    jobs: Arc<dyn JobRepository>,
    config: WorkerConfig,
    handlers: HandlerMap,
    event_tx: broadcast::Sender<WorkerEvent>,
    wake: Option<Arc<Notify>>,
}

impl JobWorker {
    pub fn new(jobs: Arc<dyn JobRepository>, config: WorkerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(defaults::EVENT_BUS_CAPACITY);
        Self {
            jobs,
            config,
            handlers: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            wake: None,
        }
    }

    /// Cut the idle sleep short whenever `notify` fires (new job queued).
    pub fn with_wake(mut self, notify: Arc<Notify>) -> Self {
        self.wake = Some(notify);
        self
    }

    /// Register a handler for a job type.
    pub async fn register_handler<H: JobHandler + 'static>(&self, handler: H) {
        let job_type = handler.job_type();
        let mut handlers = self.handlers.write().await;
        handlers.insert(job_type, Arc::new(handler));
        debug!(job_type = job_type.as_str(), "Registered job handler");
    }

    /// Start the worker and return a handle for control.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let task = tokio::spawn(async move {
            self.run(&mut shutdown_rx).await;
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
            task,
        }
    }

    /// Claim up to `max_concurrent_jobs`, run them, repeat. Sleeps only when
    /// the queue is empty.
    #[instrument(skip(self, shutdown_rx))]
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        info!(
            poll_interval_ms = self.config.poll_interval_ms,
            max_concurrent = self.config.max_concurrent_jobs,
            "Job worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);
        let fallback_wake = Arc::new(Notify::new());
        let wake = self.wake.clone().unwrap_or(fallback_wake);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            let mut tasks = tokio::task::JoinSet::new();
            for _ in 0..self.config.max_concurrent_jobs {
                match self.claim_job().await {
                    Some(job) => {
                        let runner = self.runner();
                        tasks.spawn(async move { runner.execute_job(job).await });
                    }
                    None => break,
                }
            }

            if tasks.is_empty() {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job worker received shutdown signal");
                        break;
                    }
                    _ = wake.notified() => {}
                    _ = sleep(poll_interval) => {}
                }
            } else {
                debug!(claimed = tasks.len(), "Processing concurrent job batch");
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Job task panicked");
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    async fn claim_job(&self) -> Option<Job> {
        let job_types: Vec<JobType> = {
            let handlers = self.handlers.read().await;
            handlers.keys().copied().collect()
        };
        if job_types.is_empty() {
            return None;
        }

        match self.jobs.claim_next_for_types(&job_types).await {
            Ok(job) => job,
            Err(e) => {
                error!(error = ?e, "Failed to claim job");
                None
            }
        }
    }

    fn runner(&self) -> JobRunner {
        JobRunner {
            jobs: self.jobs.clone(),
            handlers: self.handlers.clone(),
            event_tx: self.event_tx.clone(),
            timeout: Duration::from_secs(self.config.job_timeout_secs),
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    pub async fn pending_count(&self) -> Result<i64> {
        self.jobs.pending_count().await
    }
}

/// What a spawned task needs to run one claimed job.
struct JobRunner {
    jobs: Arc<dyn JobRepository>,
    handlers: HandlerMap,
    event_tx: broadcast::Sender<WorkerEvent>,
    timeout: Duration,
}

impl JobRunner {
    async fn execute_job(self, job: Job) {
        let start = Instant::now();
        let job_id = job.id;
        let job_type = job.job_type;
        let attempts_left = job.retry_count < job.max_retries;

        info!(%job_id, job_type = job_type.as_str(), "Processing job");
        let _ = self
            .event_tx
            .send(WorkerEvent::JobStarted { job_id, job_type });

        let handler = {
            let handlers = self.handlers.read().await;
            handlers.get(&job_type).cloned()
        };

        let result = match handler {
            Some(handler) => self.guarded(handler, job).await,
            None => {
                warn!(job_type = job_type.as_str(), "No handler registered for job type");
                JobResult::Failed(format!("No handler for job type: {}", job_type.as_str()))
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let (error, retryable) = match result {
            JobResult::Success(result_data) => {
                if let Err(e) = self.jobs.complete(job_id, result_data).await {
                    error!(error = ?e, %job_id, "Failed to mark job as completed");
                    return;
                }
                info!(%job_id, duration_ms, "Job completed successfully");
                let _ = self
                    .event_tx
                    .send(WorkerEvent::JobCompleted { job_id, job_type });
                return;
            }
            JobResult::Retry(error) => (error, true),
            JobResult::Failed(error) => (error, false),
        };

        if let Err(e) = self.jobs.fail(job_id, &error, retryable).await {
            error!(error = ?e, %job_id, "Failed to mark job as failed");
            return;
        }
        let retrying = retryable && attempts_left;
        warn!(%job_id, %error, retrying, duration_ms, "Job failed");
        let _ = self.event_tx.send(WorkerEvent::JobFailed {
            job_id,
            job_type,
            error,
            retrying,
        });
    }

    /// Run the handler under the job timeout, turning a panic into a failure
    /// so the job never stays `running`. On timeout the handler gets
    /// [`JobHandler::on_timeout`] to undo what the dropped run left behind.
    async fn guarded(&self, handler: Arc<dyn JobHandler>, job: Job) -> JobResult {
        let ctx = JobContext::new(job.clone());
        let run = AssertUnwindSafe(handler.execute(ctx)).catch_unwind();
        match tokio::time::timeout(self.timeout, run).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => {
                JobResult::Failed(format!("Job panicked: {}", panic_message(&*payload)))
            }
            Err(_) => {
                let ctx = JobContext::new(job);
                if let Err(payload) = AssertUnwindSafe(handler.on_timeout(&ctx))
                    .catch_unwind()
                    .await
                {
                    error!(
                        job_id = %ctx.job.id,
                        error = %panic_message(&*payload),
                        "Timeout cleanup panicked"
                    );
                }
                JobResult::Failed(format!(
                    "Job exceeded timeout of {}s",
                    self.timeout.as_secs()
                ))
            }
        }
    }
}

/// Builder for creating a job worker with handlers.
pub struct WorkerBuilder {
    jobs: Arc<dyn JobRepository>,
    config: WorkerConfig,
    handlers: Vec<Box<dyn JobHandler>>,
    wake: Option<Arc<Notify>>,
}

impl WorkerBuilder {
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        Self {
            jobs,
            config: WorkerConfig::default(),
            handlers: Vec::new(),
            wake: None,
        }
    }

    pub fn with_config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_handler<H: JobHandler + 'static>(mut self, handler: H) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    pub fn with_wake(mut self, notify: Arc<Notify>) -> Self {
        self.wake = Some(notify);
        self
    }

    /// Build and return the worker.
    pub async fn build(self) -> JobWorker {
        let mut worker = JobWorker::new(self.jobs, self.config);
        worker.wake = self.wake;
        {
            let mut handlers = worker.handlers.write().await;
            for handler in self.handlers {
                handlers.insert(handler.job_type(), Arc::from(handler));
            }
        }
        worker
    }
}
