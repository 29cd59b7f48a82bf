//! Structured logging schema and field name constants for retail-dam.
//!
//! All crates use these names for structured `tracing` fields so log
//! aggregation can query one pipeline run end to end.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, stage failure isolated or fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), run completions |
//! | DEBUG | Decision points, dispatch choices, config values |
//! | TRACE | Per-item iteration (labels, blocks, poll attempts) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Subsystem originating the log event.
/// Values: "db", "inference", "jobs", "storage"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "router", "visual", "embedding", "pipeline", "worker"
pub const COMPONENT: &str = "component";

/// Logical operation name.
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Document UUID being enriched.
pub const DOCUMENT_ID: &str = "document_id";

/// Owning user UUID.
pub const OWNER_ID: &str = "owner_id";

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Lowercased file extension driving dispatch.
pub const EXTENSION: &str = "extension";

/// Pipeline stage name ("extraction", "visual", "embedding").
pub const STAGE: &str = "stage";

/// Asynchronous OCR job identifier.
pub const OCR_JOB_ID: &str = "ocr_job_id";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Length in bytes of extracted text.
pub const TEXT_LEN: &str = "text_len";

/// Number of labels produced by the visual stage.
pub const LABEL_COUNT: &str = "label_count";

/// Poll attempt counter.
pub const ATTEMPT: &str = "attempt";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Stage outcome ("ok", "partial", "failed").
pub const OUTCOME: &str = "outcome";

/// Final document status.
pub const STATUS: &str = "status";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
