//! Core traits for retail-dam abstractions.
//!
//! Every external collaborator of the enrichment pipeline sits behind one of
//! these traits so stages can be exercised against in-memory doubles.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::Result;
use crate::events::ChannelEvent;
use crate::models::*;

// =============================================================================
// DOCUMENT REPOSITORY
// =============================================================================

/// Persistence for documents.
///
/// Pipeline writes are guarded: only [`claim_for_processing`] may leave
/// `pending`, and only the holder of the claimed version may write a
/// terminal status.
///
/// [`claim_for_processing`]: DocumentRepository::claim_for_processing
#[async_trait]
pub trait DocumentRepository: Send + Sync {
    /// Insert a pending document and enqueue its enrichment job atomically.
    async fn create(&self, req: NewDocument) -> Result<Document>;

    /// Fetch a document by id.
    async fn fetch(&self, id: Uuid) -> Result<Option<Document>>;

    /// Move a pending document to processing and bump its version.
    async fn claim_for_processing(&self, id: Uuid) -> Result<ClaimOutcome>;

    /// Persist merged results in one write.
    ///
    /// Fails with `Error::RunConflict` unless the row is still `processing`
    /// at `expected_version`.
    async fn save_result(
        &self,
        id: Uuid,
        expected_version: i64,
        result: &EnrichmentResult,
    ) -> Result<Document>;

    /// Best-effort transition of a processing document to `error`.
    /// Returns whether a row was updated.
    async fn force_error(&self, id: Uuid) -> Result<bool>;

    /// Documents of one owner, newest first.
    async fn list_for_owner(&self, owner_id: Uuid, limit: i64, offset: i64)
        -> Result<Vec<Document>>;

    /// Case-insensitive substring search over tags and extracted text.
    async fn search(&self, query: &str, owner_id: Option<Uuid>) -> Result<Vec<Document>>;

    /// Nearest documents by cosine similarity of their embeddings.
    async fn find_similar(&self, query: &Vector, limit: i64) -> Result<Vec<SimilarDocument>>;

    /// Delete a document. Returns whether it existed.
    async fn delete(&self, id: Uuid) -> Result<bool>;
}

// =============================================================================
// JOB REPOSITORY
// =============================================================================

/// Repository for the job queue.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Queue a new job.
    async fn queue(
        &self,
        document_id: Option<Uuid>,
        job_type: JobType,
        priority: i32,
        payload: Option<JsonValue>,
    ) -> Result<Uuid>;

    /// Claim the next pending job of one of the given types.
    async fn claim_next_for_types(&self, job_types: &[JobType]) -> Result<Option<Job>>;

    /// Mark a job as completed.
    async fn complete(&self, job_id: Uuid, result: Option<JsonValue>) -> Result<()>;

    /// Mark a job as failed. Retryable failures go back to pending while
    /// retries remain.
    async fn fail(&self, job_id: Uuid, error: &str, retryable: bool) -> Result<()>;

    /// Get a job by ID.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Number of pending jobs.
    async fn pending_count(&self) -> Result<i64>;
}

// =============================================================================
// OBJECT STORAGE
// =============================================================================

/// Read access to uploaded binaries.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Read the full object.
    async fn get_object(&self, key: &str) -> Result<Vec<u8>>;

    /// Store an object (upload path).
    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Remove an object. Missing objects are not an error.
    async fn delete_object(&self, key: &str) -> Result<()>;

    /// Time-limited download URL for the object.
    fn presigned_download_url(&self, key: &str, ttl_secs: u64) -> Result<String>;
}

// =============================================================================
// TEXT DETECTION (OCR)
// =============================================================================

/// Kind of a detected text block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockType {
    Page,
    Line,
    Word,
    #[serde(other)]
    Other,
}

/// A block returned by text detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBlock {
    pub block_type: BlockType,
    #[serde(default)]
    pub text: Option<String>,
}

impl TextBlock {
    pub fn line(text: impl Into<String>) -> Self {
        Self {
            block_type: BlockType::Line,
            text: Some(text.into()),
        }
    }
}

/// Join the text of every LINE block with `\n`, in order.
pub fn join_lines(blocks: &[TextBlock]) -> String {
    blocks
        .iter()
        .filter(|b| b.block_type == BlockType::Line)
        .filter_map(|b| b.text.as_deref())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Synchronous text detection on a single image.
#[async_trait]
pub trait TextDetector: Send + Sync {
    async fn detect_text(&self, storage_key: &str) -> Result<Vec<TextBlock>>;
}

/// Status of an asynchronous text detection job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextDetectionStatus {
    Running,
    Succeeded,
    Failed,
}

/// Snapshot of an asynchronous text detection job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextDetectionJob {
    pub status: TextDetectionStatus,
    #[serde(default)]
    pub blocks: Vec<TextBlock>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Asynchronous, multi-page text detection.
#[async_trait]
pub trait TextDetectionJobs: Send + Sync {
    /// Start a job and return its identifier.
    async fn start_job(&self, storage_key: &str) -> Result<String>;

    /// Current state of a job.
    async fn poll(&self, job_id: &str) -> Result<TextDetectionJob>;
}

// =============================================================================
// VISUAL ANALYSIS
// =============================================================================

/// A label detected in an image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    /// Confidence in percent (0-100).
    pub confidence: f32,
}

/// Object/scene label detection.
#[async_trait]
pub trait LabelDetector: Send + Sync {
    async fn detect_labels(
        &self,
        storage_key: &str,
        max_labels: u32,
        min_confidence: f32,
    ) -> Result<Vec<Label>>;
}

/// Machine translation of short strings.
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate(&self, text: &str, source_lang: &str, target_lang: &str) -> Result<String>;
}

// =============================================================================
// EMBEDDING
// =============================================================================

/// Backend for generating embeddings.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts, one per input.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Model name being used.
    fn model_name(&self) -> &str;
}

// =============================================================================
// EXTRACTION
// =============================================================================

/// Extraction strategy selected from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// UTF-8 plain text
    PlainText,
    /// Word (OOXML) paragraphs
    Docx,
    /// Synchronous OCR of a single image
    ImageOcr,
    /// Asynchronous OCR of a PDF
    PdfOcr,
}

impl ExtractionStrategy {
    /// Strategy for a lowercased extension, `None` when unsupported.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "txt" => Some(Self::PlainText),
            "docx" => Some(Self::Docx),
            "pdf" => Some(Self::PdfOcr),
            e if crate::defaults::OCR_IMAGE_EXTENSIONS.contains(&e) => Some(Self::ImageOcr),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PlainText => "plain_text",
            Self::Docx => "docx",
            Self::ImageOcr => "image_ocr",
            Self::PdfOcr => "pdf_ocr",
        }
    }
}

/// Adapter that turns a stored object into text.
#[async_trait]
pub trait ExtractionAdapter: Send + Sync {
    /// The extraction strategy this adapter handles.
    fn strategy(&self) -> ExtractionStrategy;

    /// Extract text from the object at `storage_key`.
    async fn extract(&self, storage_key: &str) -> Result<String>;

    /// Human-readable name of this adapter.
    fn name(&self) -> &str;
}

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Publish side of the live channel layer.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Publish an event to every subscriber of `group`.
    async fn publish(&self, group: &str, event: ChannelEvent) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_from_extension() {
        assert_eq!(
            ExtractionStrategy::from_extension("txt"),
            Some(ExtractionStrategy::PlainText)
        );
        assert_eq!(
            ExtractionStrategy::from_extension("docx"),
            Some(ExtractionStrategy::Docx)
        );
        assert_eq!(
            ExtractionStrategy::from_extension("pdf"),
            Some(ExtractionStrategy::PdfOcr)
        );
        for ext in ["jpg", "jpeg", "png", "tiff", "tif"] {
            assert_eq!(
                ExtractionStrategy::from_extension(ext),
                Some(ExtractionStrategy::ImageOcr)
            );
        }
        assert_eq!(ExtractionStrategy::from_extension("xlsx"), None);
        assert_eq!(ExtractionStrategy::from_extension(""), None);
    }

    #[test]
    fn test_join_lines_keeps_only_line_blocks() {
        let blocks = vec![
            TextBlock {
                block_type: BlockType::Page,
                text: None,
            },
            TextBlock::line("Eau de parfum"),
            TextBlock {
                block_type: BlockType::Word,
                text: Some("Eau".into()),
            },
            TextBlock::line("100 ml"),
        ];
        assert_eq!(join_lines(&blocks), "Eau de parfum\n100 ml");
        assert_eq!(join_lines(&[]), "");
    }

    #[test]
    fn test_block_type_deserializes_unknown_as_other() {
        let block: TextBlock =
            serde_json::from_str(r#"{"block_type":"KEY_VALUE_SET","text":null}"#).unwrap();
        assert_eq!(block.block_type, BlockType::Other);

        let line: TextBlock = serde_json::from_str(r#"{"block_type":"LINE","text":"hi"}"#).unwrap();
        assert_eq!(line, TextBlock::line("hi"));
    }

    #[test]
    fn test_detection_job_status_wire_format() {
        let job: TextDetectionJob =
            serde_json::from_str(r#"{"status":"succeeded","blocks":[]}"#).unwrap();
        assert_eq!(job.status, TextDetectionStatus::Succeeded);
        assert!(job.message.is_none());
    }
}
