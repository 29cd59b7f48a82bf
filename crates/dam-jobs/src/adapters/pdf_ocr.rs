//! PdfOcr extraction adapter - asynchronous multi-page text detection.
//!
//! The service runs PDF text detection as a job. The adapter starts the job
//! and polls it with exponential backoff until it reaches a terminal state
//! or runs out of attempts. Each remote call carries its own timeout,
//! so the total wait is bounded by `max_attempts` and the backoff cap.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use dam_core::{
    defaults, join_lines, Error, ExtractionAdapter, ExtractionStrategy, Result,
    TextDetectionJobs, TextDetectionStatus,
};

/// Polling schedule for text detection jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Delay after the first unfinished poll.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Multiplier applied after each unfinished poll.
    pub factor: u32,
    /// Polls before giving up.
    pub max_attempts: u32,
    /// Timeout for each start/poll request.
    pub call_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(defaults::OCR_POLL_INITIAL_MS),
            max_delay: Duration::from_millis(defaults::OCR_POLL_MAX_MS),
            factor: defaults::OCR_POLL_BACKOFF_FACTOR,
            max_attempts: defaults::OCR_MAX_POLL_ATTEMPTS,
            call_timeout: Duration::from_secs(defaults::CALL_TIMEOUT_SECS),
        }
    }
}

impl PollConfig {
    /// Delay to wait after unfinished poll number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self
            .initial_delay
            .saturating_mul(self.factor.max(1).saturating_pow(exp));
        delay.min(self.max_delay)
    }

    /// Longest a job can take: the start call and every poll at their
    /// timeout, plus the sleeps between polls.
    pub fn worst_case(&self) -> Duration {
        let calls = self
            .call_timeout
            .saturating_mul(self.max_attempts.saturating_add(1));
        (1..self.max_attempts)
            .map(|attempt| self.delay_for(attempt))
            .fold(calls, Duration::saturating_add)
    }
}

/// Starts a text detection job for a PDF and waits for its result.
pub struct PdfOcrAdapter {
    jobs: Arc<dyn TextDetectionJobs>,
    poll: PollConfig,
}

impl PdfOcrAdapter {
    pub fn new(jobs: Arc<dyn TextDetectionJobs>, poll: PollConfig) -> Self {
        Self { jobs, poll }
    }

    async fn timed<T>(
        &self,
        what: &str,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::time::timeout(self.poll.call_timeout, fut)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "{} after {}s",
                    what,
                    self.poll.call_timeout.as_secs()
                ))
            })?
    }
}

#[async_trait]
impl ExtractionAdapter for PdfOcrAdapter {
    fn strategy(&self) -> ExtractionStrategy {
        ExtractionStrategy::PdfOcr
    }

    async fn extract(&self, storage_key: &str) -> Result<String> {
        let job_id = self
            .timed("starting text detection job", self.jobs.start_job(storage_key))
            .await?;
        debug!(storage_key, ocr_job_id = %job_id, "Polling text detection job");

        for attempt in 1..=self.poll.max_attempts {
            let job = self
                .timed("polling text detection job", self.jobs.poll(&job_id))
                .await?;
            match job.status {
                TextDetectionStatus::Succeeded => {
                    debug!(ocr_job_id = %job_id, attempt, "Text detection job succeeded");
                    return Ok(join_lines(&job.blocks));
                }
                TextDetectionStatus::Failed => {
                    let message = job.message.unwrap_or_else(|| "no reason given".to_string());
                    warn!(ocr_job_id = %job_id, attempt, error = %message, "Text detection job failed");
                    return Err(Error::Ocr(format!("job {} failed: {}", job_id, message)));
                }
                TextDetectionStatus::Running if attempt < self.poll.max_attempts => {
                    tokio::time::sleep(self.poll.delay_for(attempt)).await;
                }
                TextDetectionStatus::Running => {}
            }
        }

        Err(Error::Timeout(format!(
            "text detection job {} still running after {} polls",
            job_id, self.poll.max_attempts
        )))
    }

    fn name(&self) -> &str {
        "pdf_ocr"
    }
}
