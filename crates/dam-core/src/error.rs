//! Error types for retail-dam.

use thiserror::Error;
use uuid::Uuid;

use crate::models::DocumentStatus;

/// Result type alias using retail-dam's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for retail-dam operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Document vanished before or during a pipeline run
    #[error("Document not found: {0}")]
    DocumentNotFound(Uuid),

    /// Another pipeline run owns (or already finished) this document
    #[error("Document {id} is not claimable (status: {status})")]
    RunConflict { id: Uuid, status: DocumentStatus },

    /// Object storage read/write or URL signing failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Text detection (sync or async OCR) failed
    #[error("OCR error: {0}")]
    Ocr(String),

    /// Label detection failed
    #[error("Vision error: {0}")]
    Vision(String),

    /// Translation failed
    #[error("Translation error: {0}")]
    Translation(String),

    /// Embedding generation failed
    #[error("Embedding error: {0}")]
    Embedding(String),

    /// Document container (zip/xml) could not be parsed
    #[error("Parse error: {0}")]
    Parse(String),

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// External call exceeded its deadline
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
