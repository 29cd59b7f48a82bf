//! Job handler abstraction.

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use dam_core::{Job, JobType};

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
}

impl JobContext {
    pub fn new(job: Job) -> Self {
        Self { job }
    }

    /// Target document: `payload.document_id` when present and valid,
    /// otherwise the job's own document reference.
    pub fn document_id(&self) -> Option<Uuid> {
        self.payload()
            .and_then(|p| p.get("document_id"))
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
            .or(self.job.document_id)
    }

    pub fn payload(&self) -> Option<&JsonValue> {
        self.job.payload.as_ref()
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully with optional result data.
    Success(Option<JsonValue>),
    /// Job failed permanently.
    Failed(String),
    /// Job failed transiently and goes back to the queue while retries remain.
    Retry(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// The job type this handler processes.
    fn job_type(&self) -> JobType;

    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;

    /// Called after the worker dropped `execute` for exceeding the job
    /// timeout. Handlers that moved external state put it back here.
    async fn on_timeout(&self, _ctx: &JobContext) {}

    /// Check if this handler can process the given job type.
    fn can_handle(&self, job_type: JobType) -> bool {
        self.job_type() == job_type
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_id_prefers_payload() {
        let from_payload = Uuid::from_u128(1);
        let from_job = Uuid::from_u128(2);
        let job = Job::pending(
            Some(from_job),
            JobType::DocumentEnrichment,
            Some(json!({ "document_id": from_payload.to_string() })),
        );
        assert_eq!(JobContext::new(job).document_id(), Some(from_payload));
    }

    #[test]
    fn test_document_id_falls_back_to_job() {
        let from_job = Uuid::from_u128(2);
        let job = Job::pending(
            Some(from_job),
            JobType::DocumentEnrichment,
            Some(json!({ "document_id": "not-a-uuid" })),
        );
        assert_eq!(JobContext::new(job).document_id(), Some(from_job));

        let job = Job::pending(None, JobType::DocumentEnrichment, None);
        assert_eq!(JobContext::new(job).document_id(), None);
    }
}
