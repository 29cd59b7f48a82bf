//! # dam-jobs
//!
//! Document enrichment for retail-dam.
//!
//! This crate provides:
//! - The extraction router and its adapters (plain text, docx, image OCR,
//!   PDF OCR jobs with bounded polling)
//! - The visual analysis stage (labels plus optional translation)
//! - The embedding stage (provider or simulated)
//! - [`DocumentPipeline`], the per-document state machine that runs the
//!   stages, persists one merged result and notifies the owner
//! - A concurrent job worker that runs the pipeline for queued uploads
//!
//! ## Example
//!
//! ```ignore
//! use dam_jobs::{DocumentPipeline, EnrichmentHandler, PipelineConfig, WorkerBuilder};
//!
//! let pipeline = Arc::new(DocumentPipeline::new(PipelineConfig::from_env()?, services)?);
//!
//! let worker = WorkerBuilder::new(jobs.clone())
//!     .with_config(WorkerConfig::from_env())
//!     .with_handler(EnrichmentHandler::new(pipeline))
//!     .build()
//!     .await;
//!
//! let handle = worker.start();
//! // ...
//! handle.shutdown().await?;
//! handle.join().await;
//! ```

pub mod adapters;
pub mod embedding;
pub mod enrichment_handler;
pub mod extraction;
mod guard;
pub mod handler;
pub mod notification;
pub mod pipeline;
pub mod visual;
pub mod worker;

// Re-export core types
pub use dam_core::*;

pub use adapters::{DocxAdapter, ImageOcrAdapter, PdfOcrAdapter, PlainTextAdapter, PollConfig};
pub use embedding::{EmbeddingMode, EmbeddingStage};
pub use enrichment_handler::EnrichmentHandler;
pub use extraction::{ExtractedText, ExtractionRouter};
pub use handler::{JobContext, JobHandler, JobResult};
pub use notification::NotificationBridge;
pub use pipeline::{
    decide_status, DocumentPipeline, PipelineConfig, PipelineServices, RunReport, StageSummary,
};
pub use visual::{TranslationConfig, VisualConfig, VisualStage};
pub use worker::{JobWorker, WorkerBuilder, WorkerConfig, WorkerEvent, WorkerHandle};
