//! Document ingestion pipeline.

pub mod service;
pub mod types;

pub use service::DocumentPipeline;
pub use types::{
    DocumentProgress, DocumentState, DocumentStatus, IngestOutcome, PROGRESS_EMBEDDING,
    PROGRESS_EXTRACTED, PROGRESS_READY, PROGRESS_STARTED, PipelineError,
};
