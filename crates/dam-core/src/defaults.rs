//! Centralized default constants for retail-dam.
//!
//! **This module is the single source of truth** for shared default values.
//! Configuration structs in the other crates fall back to these when the
//! corresponding environment variable is unset.

// =============================================================================
// EMBEDDING
// =============================================================================

/// Fixed embedding dimension persisted for every document.
pub const EMBED_DIMENSION: usize = 1536;

/// Default embedding model (OpenAI-compatible endpoint).
pub const EMBED_MODEL: &str = "text-embedding-3-small";

// =============================================================================
// EXTRACTION
// =============================================================================

/// Text stored for extensions with no extraction strategy.
pub const UNSUPPORTED_FORMAT_TEXT: &str = "Unsupported format for automatic extraction.";

/// Prefix of the placeholder text returned when extraction fails.
pub const EXTRACTION_ERROR_PREFIX: &str = "Read error: ";

/// Zip entry holding the body of a Word document.
pub const DOCX_BODY_ENTRY: &str = "word/document.xml";

/// Extensions routed to synchronous OCR.
pub const OCR_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tiff", "tif"];

/// Extensions that qualify for label detection.
pub const LABEL_IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Initial delay between asynchronous OCR job polls (milliseconds).
pub const OCR_POLL_INITIAL_MS: u64 = 2_000;

/// Upper bound for the backoff delay between polls (milliseconds).
pub const OCR_POLL_MAX_MS: u64 = 30_000;

/// Backoff multiplier applied after every unfinished poll.
pub const OCR_POLL_BACKOFF_FACTOR: u32 = 2;

/// Maximum number of polls before an OCR job is treated as failed.
pub const OCR_MAX_POLL_ATTEMPTS: u32 = 40;

// =============================================================================
// VISUAL ANALYSIS
// =============================================================================

/// Minimum label confidence (percent) accepted from label detection.
pub const LABEL_MIN_CONFIDENCE: f32 = 90.0;

/// Maximum number of labels requested per image.
pub const LABEL_MAX_COUNT: u32 = 5;

// =============================================================================
// EXTERNAL CALLS
// =============================================================================

/// Per-call timeout for remote services (seconds).
pub const CALL_TIMEOUT_SECS: u64 = 30;

/// HTTP client timeout for the analysis service (seconds).
pub const ANALYSIS_HTTP_TIMEOUT_SECS: u64 = 60;

// =============================================================================
// NOTIFICATIONS
// =============================================================================

/// Maximum characters of extracted text carried in a status notification.
pub const NOTIFY_PREVIEW_CHARS: usize = 100;

/// Broadcast buffer per channel group.
pub const CHANNEL_GROUP_CAPACITY: usize = 64;

/// Event type name published on status changes.
pub const DOC_STATUS_EVENT: &str = "doc.status";

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Maximum retries for retryable job failures.
pub const JOB_MAX_RETRIES: i32 = 3;

/// Worker polling interval when the queue is empty (milliseconds).
pub const JOB_POLL_INTERVAL_MS: u64 = 500;

/// Maximum number of jobs processed concurrently by one worker.
pub const JOB_MAX_CONCURRENT: usize = 4;

/// Hard timeout for a single job (seconds). Sits above the default pipeline
/// run deadline (2550s with the defaults above) so the pipeline's own
/// deadline fires first.
pub const JOB_TIMEOUT_SECS: u64 = 3_600;

/// Broadcast buffer for worker events.
pub const EVENT_BUS_CAPACITY: usize = 256;
