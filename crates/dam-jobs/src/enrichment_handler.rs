//! EnrichmentHandler: runs the document pipeline for queued uploads.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{error, info, warn};

use dam_core::{Error, JobType};

use crate::handler::{JobContext, JobHandler, JobResult};
use crate::pipeline::DocumentPipeline;

pub struct EnrichmentHandler {
    pipeline: Arc<DocumentPipeline>,
}

impl EnrichmentHandler {
    pub fn new(pipeline: Arc<DocumentPipeline>) -> Self {
        Self { pipeline }
    }
}

/// Errors worth another attempt. A retry after a successful claim ends as a
/// run conflict. Run timeouts only happen after the claim and are final.
fn is_transient(e: &Error) -> bool {
    matches!(e, Error::Database(_) | Error::Request(_))
}

#[async_trait]
impl JobHandler for EnrichmentHandler {
    fn job_type(&self) -> JobType {
        JobType::DocumentEnrichment
    }

    async fn execute(&self, ctx: JobContext) -> JobResult {
        let Some(document_id) = ctx.document_id() else {
            return JobResult::Failed("Missing document_id in enrichment job".into());
        };

        match self.pipeline.run(document_id).await {
            Ok(report) => {
                info!(
                    job_id = %ctx.job.id,
                    document_id = %document_id,
                    status = %report.document.status,
                    "Enrichment job completed"
                );
                JobResult::Success(Some(json!({
                    "document_id": document_id,
                    "status": report.document.status,
                    "extraction": report.stages.extraction,
                    "visual": report.stages.visual,
                    "embedding": report.stages.embedding,
                    "warnings": report.stages.warnings,
                    "duration_ms": report.duration_ms,
                })))
            }
            Err(e @ (Error::DocumentNotFound(_) | Error::RunConflict { .. })) => {
                warn!(job_id = %ctx.job.id, error = %e, "Enrichment skipped");
                JobResult::Failed(e.to_string())
            }
            Err(e) if is_transient(&e) => JobResult::Retry(e.to_string()),
            Err(e) => JobResult::Failed(e.to_string()),
        }
    }

    async fn on_timeout(&self, ctx: &JobContext) {
        let Some(document_id) = ctx.document_id() else {
            return;
        };
        match self.pipeline.fail_stalled(document_id).await {
            Ok(true) => {}
            Ok(false) => info!(
                job_id = %ctx.job.id,
                document_id = %document_id,
                "Timed-out job left no document in processing"
            ),
            Err(e) => error!(
                job_id = %ctx.job.id,
                document_id = %document_id,
                error = %e,
                "Failed to mark stalled document as error"
            ),
        }
    }
}
