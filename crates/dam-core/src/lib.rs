//! # dam-core
//!
//! Core types, traits, and abstractions for the retail-dam document pipeline.
//!
//! This crate provides the data model (documents, jobs, stage outcomes), the
//! error type, and the trait seams for every external collaborator the
//! enrichment pipeline talks to: object storage, OCR, label detection,
//! translation, embeddings, persistence and the live notification channel.

pub mod defaults;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod outcome;
pub mod traits;

// Re-export commonly used types at crate root
pub use error::{Error, Result};
pub use events::{ChannelEvent, ChannelLayer, DocumentStatusEvent};
pub use models::*;
pub use outcome::{OutcomeKind, StageOutcome};
pub use traits::*;

/// Generate a new time-ordered UUIDv7.
pub fn new_v7() -> uuid::Uuid {
    uuid::Uuid::now_v7()
}
