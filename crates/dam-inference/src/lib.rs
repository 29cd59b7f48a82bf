//! # dam-inference
//!
//! Clients for the remote services the enrichment pipeline depends on.
//!
//! This crate provides:
//! - [`HttpAnalysisClient`]: text detection (sync and job-based), label
//!   detection and translation against the analysis service
//! - [`OpenAIBackend`]: embeddings from any OpenAI-compatible endpoint
//!
//! # Feature Flags
//!
//! - `mock`: deterministic in-process doubles for every collaborator trait
//!
//! # Example
//!
//! ```rust,no_run
//! use dam_core::EmbeddingBackend;
//! use dam_inference::OpenAIBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OpenAIBackend::from_env().unwrap();
//!     let texts = vec!["Eau de parfum 100 ml".to_string()];
//!     let embeddings = backend.embed_texts(&texts).await.unwrap();
//! }
//! ```

pub mod analysis;
pub mod openai;

#[cfg(feature = "mock")]
pub mod mock;

pub use analysis::{AnalysisConfig, HttpAnalysisClient};
pub use openai::{OpenAIBackend, OpenAIConfig};
