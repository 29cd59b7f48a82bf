//! Data model: documents, enrichment results, and queued jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::defaults;

/// Embedding vector type (re-exported from pgvector).
pub use pgvector::Vector;

// =============================================================================
// DOCUMENTS
// =============================================================================

/// Processing status of a document.
///
/// Transitions are monotonic: `Pending -> Processing -> terminal`. Terminal
/// states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    CompletedWithWarnings,
    Error,
}

impl DocumentStatus {
    /// Database / wire representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::CompletedWithWarnings => "completed_with_warnings",
            Self::Error => "error",
        }
    }

    /// Whether the pipeline has finished with this document.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::CompletedWithWarnings | Self::Error
        )
    }

    /// Whether moving from `self` to `next` respects the state machine.
    pub fn can_transition_to(&self, next: DocumentStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::CompletedWithWarnings)
                | (Self::Processing, Self::Error)
        )
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for DocumentStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "completed_with_warnings" => Ok(Self::CompletedWithWarnings),
            "error" => Ok(Self::Error),
            _ => Err(format!("Invalid document status: {}", s)),
        }
    }
}

/// An uploaded document and its enrichment results.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    /// Key of the binary content in object storage. Immutable.
    pub storage_key: String,
    pub owner_id: Uuid,
    pub status: DocumentStatus,
    /// `None` until the visual stage succeeds; `Some(vec![])` means it ran
    /// and found nothing.
    pub tags: Option<Vec<String>>,
    pub extracted_text: Option<String>,
    pub confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vector>,
    pub created_at: DateTime<Utc>,
    /// Optimistic concurrency counter, bumped by every pipeline write.
    pub version: i64,
}

impl Document {
    /// Lowercased extension of the storage key (text after the last `.`).
    pub fn extension(&self) -> String {
        extension_of(&self.storage_key)
    }

    /// Live channel group for the owning user.
    pub fn owner_group(&self) -> String {
        owner_group(self.owner_id)
    }
}

/// Lowercased extension of a key or filename; empty when there is none.
pub fn extension_of(key: &str) -> String {
    let name = key.rsplit('/').next().unwrap_or(key);
    match name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

/// Channel group name for a user (`user_{id}`).
pub fn owner_group(owner_id: Uuid) -> String {
    format!("user_{}", owner_id)
}

/// Object storage key for a new upload: `documents/{owner}/{id}.{ext}`.
pub fn storage_key_for(owner_id: Uuid, document_id: Uuid, filename: &str) -> String {
    let ext = extension_of(filename);
    if ext.is_empty() {
        format!("documents/{}/{}", owner_id, document_id)
    } else {
        format!("documents/{}/{}.{}", owner_id, document_id, ext)
    }
}

/// Request to register an uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    /// Optional display title; defaults to `filename`.
    pub title: Option<String>,
    /// Original filename as uploaded.
    pub filename: String,
    /// Storage key the binary was written under.
    pub storage_key: String,
    pub owner_id: Uuid,
}

impl NewDocument {
    /// Title to persist: the supplied one unless blank, else the filename.
    pub fn resolved_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => self.filename.clone(),
        }
    }
}

/// Result of trying to move a document from `pending` to `processing`.
#[derive(Debug, Clone)]
pub enum ClaimOutcome {
    /// The caller now owns the run; carries the post-claim row.
    Claimed(Document),
    /// The row no longer exists.
    NotFound,
    /// The row exists but is not pending.
    AlreadyClaimed(DocumentStatus),
}

/// Merged pipeline output persisted in a single write.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentResult {
    pub status: DocumentStatus,
    pub tags: Option<Vec<String>>,
    pub extracted_text: Option<String>,
    pub embedding: Option<Vector>,
}

/// A similarity search hit.
#[derive(Debug, Clone)]
pub struct SimilarDocument {
    pub document: Document,
    /// Cosine similarity in [-1, 1].
    pub score: f64,
}

// =============================================================================
// JOB TYPES
// =============================================================================

/// Status of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Invalid job status: {}", s)),
        }
    }
}

/// Type of job to process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Run the enrichment pipeline for one document
    DocumentEnrichment,
}

impl JobType {
    /// Default priority for this job type (higher = more urgent)
    pub fn default_priority(&self) -> i32 {
        match self {
            JobType::DocumentEnrichment => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::DocumentEnrichment => "document_enrichment",
        }
    }
}

impl std::str::FromStr for JobType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "document_enrichment" => Ok(Self::DocumentEnrichment),
            _ => Err(format!("Invalid job type: {}", s)),
        }
    }
}

/// A job in the processing queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub document_id: Option<Uuid>,
    pub job_type: JobType,
    pub status: JobStatus,
    pub priority: i32,
    pub payload: Option<JsonValue>,
    pub result: Option<JsonValue>,
    pub error_message: Option<String>,
    pub retry_count: i32,
    pub max_retries: i32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Build a fresh pending job.
    pub fn pending(document_id: Option<Uuid>, job_type: JobType, payload: Option<JsonValue>) -> Self {
        Self {
            id: crate::new_v7(),
            document_id,
            job_type,
            status: JobStatus::Pending,
            priority: job_type.default_priority(),
            payload,
            result: None,
            error_message: None,
            retry_count: 0,
            max_retries: defaults::JOB_MAX_RETRIES,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Payload of an enrichment job.
pub fn enrichment_payload(document_id: Uuid) -> JsonValue {
    serde_json::json!({ "document_id": document_id })
}
