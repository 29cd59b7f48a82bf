//! Enrichment orchestrator: the per-document state machine.
//!
//! ```text
//! pending ──claim──▶ processing ──save──▶ completed
//!                         │                completed_with_warnings
//!                         └──fault────────▶ error
//! ```
//!
//! One run loads the document, claims it, runs extraction, visual analysis
//! (images only) and embedding in sequence, merges the stage outcomes,
//! persists them in a single versioned write and notifies the owner. Stage
//! faults are folded into [`StageOutcome`]s by the stages themselves; faults
//! in the orchestrator's own bookkeeping after the claim, panics and an
//! exceeded run deadline included, move the document to `error` best-effort.

use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use tracing::field::Empty;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};
use uuid::Uuid;

use dam_core::events::preview;
use dam_core::{
    defaults, logging, ClaimOutcome, Document, DocumentRepository, DocumentStatus,
    EmbeddingBackend, EnrichmentResult, Error, LabelDetector, NotificationChannel, ObjectStorage,
    OutcomeKind, Result, StageOutcome, TextDetectionJobs, TextDetector, Translator, Vector,
};

use crate::adapters::{DocxAdapter, ImageOcrAdapter, PdfOcrAdapter, PlainTextAdapter, PollConfig};
use crate::embedding::{EmbeddingMode, EmbeddingStage};
use crate::extraction::{ExtractedText, ExtractionRouter};
use crate::guard::panic_message;
use crate::notification::NotificationBridge;
use crate::visual::{TranslationConfig, VisualConfig, VisualStage};

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Explicit pipeline configuration, fixed at construction.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub embedding_mode: EmbeddingMode,
    pub visual: VisualConfig,
    /// Label translation; disabled when `None`.
    pub translation: Option<TranslationConfig>,
    pub poll: PollConfig,
    /// Timeout for every single call to an external collaborator.
    pub call_timeout: Duration,
    /// Deadline for one run after the claim. `None` derives it from the
    /// polling schedule and call timeouts, see [`PipelineConfig::run_budget`].
    pub run_timeout: Option<Duration>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            embedding_mode: EmbeddingMode::default(),
            visual: VisualConfig::default(),
            translation: None,
            poll: PollConfig::default(),
            call_timeout: Duration::from_secs(defaults::CALL_TIMEOUT_SECS),
            run_timeout: None,
        }
    }
}

impl PipelineConfig {
    /// Read the `DAM_*` pipeline variables. Unparseable numbers fall back to
    /// their defaults; an unknown embedding mode is an error.
    pub fn from_env() -> Result<Self> {
        let embedding_mode = match std::env::var("DAM_EMBEDDING_MODE") {
            Ok(v) if !v.trim().is_empty() => v.parse()?,
            _ => EmbeddingMode::default(),
        };

        let call_timeout = Duration::from_secs(env_or(
            "DAM_CALL_TIMEOUT_SECS",
            defaults::CALL_TIMEOUT_SECS,
        ));

        let translation = match (
            std::env::var("DAM_TRANSLATE_SOURCE"),
            std::env::var("DAM_TRANSLATE_TARGET"),
        ) {
            (Ok(source), Ok(target)) if !source.is_empty() && !target.is_empty() => {
                Some(TranslationConfig {
                    source_lang: source,
                    target_lang: target,
                })
            }
            _ => None,
        };

        Ok(Self {
            embedding_mode,
            visual: VisualConfig {
                min_confidence: env_or("DAM_LABEL_MIN_CONFIDENCE", defaults::LABEL_MIN_CONFIDENCE),
                max_labels: env_or("DAM_LABEL_MAX_COUNT", defaults::LABEL_MAX_COUNT),
                call_timeout,
            },
            translation,
            poll: PollConfig {
                initial_delay: Duration::from_millis(env_or(
                    "DAM_OCR_POLL_INITIAL_MS",
                    defaults::OCR_POLL_INITIAL_MS,
                )),
                max_delay: Duration::from_millis(env_or(
                    "DAM_OCR_POLL_MAX_MS",
                    defaults::OCR_POLL_MAX_MS,
                )),
                factor: defaults::OCR_POLL_BACKOFF_FACTOR,
                max_attempts: env_or("DAM_OCR_MAX_POLL_ATTEMPTS", defaults::OCR_MAX_POLL_ATTEMPTS)
                    .max(1),
                call_timeout,
            },
            call_timeout,
            run_timeout: std::env::var("DAM_RUN_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.trim().parse().ok())
                .map(Duration::from_secs),
        })
    }

    /// Longest a run can legitimately take: the PDF polling worst case, a
    /// label call plus one translation per label, the embedding call and the
    /// final save.
    pub fn run_budget(&self) -> Duration {
        let visual_calls = self.visual.max_labels.saturating_add(1);
        self.poll
            .worst_case()
            .saturating_add(self.visual.call_timeout.saturating_mul(visual_calls))
            .saturating_add(self.call_timeout.saturating_mul(2))
    }

    /// Effective run deadline.
    pub fn run_deadline(&self) -> Duration {
        self.run_timeout.unwrap_or_else(|| self.run_budget())
    }

    pub fn with_run_timeout(mut self, timeout: Duration) -> Self {
        self.run_timeout = Some(timeout);
        self
    }

    pub fn with_embedding_mode(mut self, mode: EmbeddingMode) -> Self {
        self.embedding_mode = mode;
        self
    }

    pub fn with_translation(mut self, source_lang: &str, target_lang: &str) -> Self {
        self.translation = Some(TranslationConfig {
            source_lang: source_lang.to_string(),
            target_lang: target_lang.to_string(),
        });
        self
    }
}

/// External collaborators the pipeline talks to.
#[derive(Clone)]
pub struct PipelineServices {
    pub documents: Arc<dyn DocumentRepository>,
    pub storage: Arc<dyn ObjectStorage>,
    pub text_detector: Arc<dyn TextDetector>,
    pub text_jobs: Arc<dyn TextDetectionJobs>,
    pub labels: Arc<dyn LabelDetector>,
    /// Required when translation is configured.
    pub translator: Option<Arc<dyn Translator>>,
    /// Required in provider mode.
    pub embedder: Option<Arc<dyn EmbeddingBackend>>,
    pub channel: Arc<dyn NotificationChannel>,
}

/// Outcome of each stage in one run.
#[derive(Debug, Clone, PartialEq)]
pub struct StageSummary {
    pub extraction: OutcomeKind,
    /// `None` when the visual stage did not apply.
    pub visual: Option<OutcomeKind>,
    pub embedding: OutcomeKind,
    pub warnings: Vec<String>,
}

impl StageSummary {
    fn kinds(&self) -> Vec<OutcomeKind> {
        std::iter::once(self.extraction)
            .chain(self.visual)
            .chain(std::iter::once(self.embedding))
            .collect()
    }
}

/// Result of a completed run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub document: Document,
    pub stages: StageSummary,
    pub duration_ms: u64,
}

/// Final status from the outcomes of the stages that ran.
///
/// All ok is `completed`, all failed is `error`, anything in between is
/// `completed_with_warnings`.
pub fn decide_status(outcomes: &[OutcomeKind]) -> DocumentStatus {
    if outcomes.iter().all(|k| *k == OutcomeKind::Ok) {
        DocumentStatus::Completed
    } else if outcomes.iter().all(|k| *k == OutcomeKind::Failed) {
        DocumentStatus::Error
    } else {
        DocumentStatus::CompletedWithWarnings
    }
}

/// Runs enrichment for one document at a time.
pub struct DocumentPipeline {
    documents: Arc<dyn DocumentRepository>,
    router: ExtractionRouter,
    visual: VisualStage,
    embedding: EmbeddingStage,
    notifier: NotificationBridge,
    run_deadline: Duration,
}

impl DocumentPipeline {
    /// Wire the stages from `config` and `services`.
    ///
    /// Fails when the configuration asks for a collaborator that was not
    /// supplied (provider mode without an embedder, translation without a
    /// translator).
    pub fn new(config: PipelineConfig, services: PipelineServices) -> Result<Self> {
        let run_deadline = config.run_deadline();
        let router = ExtractionRouter::new(config.call_timeout)
            .with_adapter(Arc::new(PlainTextAdapter::new(services.storage.clone())))
            .with_adapter(Arc::new(DocxAdapter::new(services.storage.clone())))
            .with_adapter(Arc::new(ImageOcrAdapter::new(services.text_detector)))
            .with_adapter(Arc::new(PdfOcrAdapter::new(services.text_jobs, config.poll)));

        let mut visual = VisualStage::new(services.labels, config.visual);
        if let Some(languages) = config.translation {
            let translator = services.translator.ok_or_else(|| {
                Error::Config("label translation is configured but no translator was given".into())
            })?;
            visual = visual.with_translation(translator, languages);
        }

        let embedding = match config.embedding_mode {
            EmbeddingMode::Simulated => EmbeddingStage::simulated(),
            EmbeddingMode::Provider => {
                let backend = services.embedder.ok_or_else(|| {
                    Error::Config("provider embedding mode requires an embedding backend".into())
                })?;
                EmbeddingStage::provider(backend, config.call_timeout)
            }
        };

        info!(
            subsystem = "jobs",
            component = "pipeline",
            embedding_mode = %embedding.mode(),
            strategies = router.available_strategies().len(),
            run_deadline_secs = run_deadline.as_secs(),
            "Enrichment pipeline configured"
        );

        Ok(Self {
            documents: services.documents,
            router,
            visual,
            embedding,
            notifier: NotificationBridge::new(services.channel),
            run_deadline,
        })
    }

    pub fn embedding_mode(&self) -> EmbeddingMode {
        self.embedding.mode()
    }

    /// Deadline applied to each run after the claim.
    pub fn run_deadline(&self) -> Duration {
        self.run_deadline
    }

    /// Enrich one document.
    ///
    /// Returns `Error::DocumentNotFound` without touching anything when the
    /// document is gone, and `Error::RunConflict` when another run owns it.
    pub async fn run(&self, document_id: Uuid) -> Result<RunReport> {
        let span = info_span!(
            "enrichment",
            document_id = %document_id,
            owner_id = Empty,
            extension = Empty,
            status = Empty,
            duration_ms = Empty,
        );
        self.run_inner(document_id).instrument(span).await
    }

    async fn run_inner(&self, document_id: Uuid) -> Result<RunReport> {
        let start = Instant::now();

        let Some(doc) = self.documents.fetch(document_id).await? else {
            warn!("Document not found, nothing to enrich");
            return Err(Error::DocumentNotFound(document_id));
        };
        Span::current()
            .record(logging::OWNER_ID, tracing::field::display(doc.owner_id))
            .record(logging::EXTENSION, doc.extension().as_str());

        let claimed = match self.documents.claim_for_processing(document_id).await? {
            ClaimOutcome::Claimed(claimed) => claimed,
            ClaimOutcome::NotFound => {
                warn!("Document deleted before claim");
                return Err(Error::DocumentNotFound(document_id));
            }
            ClaimOutcome::AlreadyClaimed(status) => {
                info!(current = %status, "Document already claimed by another run");
                return Err(Error::RunConflict {
                    id: document_id,
                    status,
                });
            }
        };
        debug!(version = claimed.version, "Document claimed");

        let guarded = AssertUnwindSafe(self.enrich(&claimed, start)).catch_unwind();
        let outcome = match tokio::time::timeout(self.run_deadline, guarded).await {
            Ok(Ok(result)) => result,
            Ok(Err(payload)) => Err(Error::Internal(format!(
                "pipeline panicked: {}",
                panic_message(&*payload)
            ))),
            Err(_) => Err(Error::Timeout(format!(
                "enrichment exceeded {}s",
                self.run_deadline.as_secs()
            ))),
        };

        match outcome {
            Ok(report) => {
                Span::current()
                    .record(logging::STATUS, report.document.status.as_str())
                    .record(logging::DURATION_MS, report.duration_ms);
                Ok(report)
            }
            Err(e) => {
                Span::current().record(logging::STATUS, DocumentStatus::Error.as_str());
                self.abort(&claimed, &e).await;
                Err(e)
            }
        }
    }

    /// Stages, merge, single save, notification.
    async fn enrich(&self, claimed: &Document, start: Instant) -> Result<RunReport> {
        let key = claimed.storage_key.as_str();
        let extension = claimed.extension();

        let extraction = self.router.extract_text(key, &extension).await;
        let shown = ExtractedText::from(extraction.clone());
        debug!(
            outcome = %shown.kind,
            preview = %preview(&shown.text, 60),
            "Extraction stage done"
        );

        let visual = if VisualStage::applies_to(&extension) {
            let outcome = self.visual.detect_labels(key).await;
            debug!(outcome = %outcome.kind(), "Visual stage done");
            Some(outcome)
        } else {
            None
        };

        let embedding = self.embedding.embed(shown.usable().unwrap_or("")).await;
        debug!(outcome = %embedding.kind(), "Embedding stage done");

        let (result, stages) = merge(extraction, visual, embedding);
        for warning in &stages.warnings {
            warn!(warning = %warning, "Stage degraded");
        }

        let saved = self
            .documents
            .save_result(claimed.id, claimed.version, &result)
            .await?;
        let duration_ms = start.elapsed().as_millis() as u64;

        info!(
            status = %saved.status,
            extraction = %stages.extraction,
            visual = stages.visual.map(|k| k.as_str()).unwrap_or("skipped"),
            embedding = %stages.embedding,
            text_len = saved.extracted_text.as_ref().map(|t| t.len()).unwrap_or(0),
            label_count = saved.tags.as_ref().map(|t| t.len()).unwrap_or(0),
            duration_ms,
            "Enrichment finished"
        );

        self.notifier.notify(&saved).await;

        Ok(RunReport {
            document: saved,
            stages,
            duration_ms,
        })
    }

    /// Move a document whose run was abandoned from outside (the job
    /// timed out and its future was dropped) to `error` and tell the owner.
    ///
    /// Returns `false` when the document is no longer `processing`.
    pub async fn fail_stalled(&self, document_id: Uuid) -> Result<bool> {
        if !self.documents.force_error(document_id).await? {
            return Ok(false);
        }
        warn!(document_id = %document_id, "Stalled enrichment moved to error");
        if let Some(doc) = self.documents.fetch(document_id).await? {
            self.notifier.notify(&doc).await;
        }
        Ok(true)
    }

    /// Move a claimed document to `error` and tell the owner.
    ///
    /// A lost race leaves the row to the run that owns it.
    async fn abort(&self, claimed: &Document, cause: &Error) {
        if matches!(cause, Error::RunConflict { .. }) {
            warn!(error = %cause, "Result discarded, another run owns the document");
            return;
        }
        error!(error = %cause, "Enrichment aborted");
        match self.documents.force_error(claimed.id).await {
            Ok(true) => {
                let mut failed = claimed.clone();
                failed.status = DocumentStatus::Error;
                self.notifier.notify(&failed).await;
            }
            Ok(false) => debug!("Document left processing before it could be marked as error"),
            Err(e) => error!(error = %e, "Failed to mark document as error"),
        }
    }
}

/// Merge stage outcomes into the persisted result. Failed stages leave their
/// field unset.
fn merge(
    extraction: StageOutcome<String>,
    visual: Option<StageOutcome<Vec<String>>>,
    embedding: StageOutcome<Vector>,
) -> (EnrichmentResult, StageSummary) {
    let mut warnings = Vec::new();
    collect_warnings("extraction", &extraction, &mut warnings);
    if let Some(v) = &visual {
        collect_warnings("visual", v, &mut warnings);
    }
    collect_warnings("embedding", &embedding, &mut warnings);

    let stages = StageSummary {
        extraction: extraction.kind(),
        visual: visual.as_ref().map(|v| v.kind()),
        embedding: embedding.kind(),
        warnings,
    };
    let result = EnrichmentResult {
        status: decide_status(&stages.kinds()),
        tags: visual.and_then(StageOutcome::into_value),
        extracted_text: extraction.into_value(),
        embedding: embedding.into_value(),
    };
    (result, stages)
}

fn collect_warnings<T>(stage: &str, outcome: &StageOutcome<T>, out: &mut Vec<String>) {
    match outcome {
        StageOutcome::Failed(reason) => out.push(format!("{} failed: {}", stage, reason)),
        StageOutcome::Partial(_, w) => out.extend(w.iter().map(|w| format!("{}: {}", stage, w))),
        StageOutcome::Ok(_) => {}
    }
}
