//! Document state, progress milestones, and pipeline errors.

use crate::extraction::{ExtractionError, FileKind};
use crate::gateway::{Chunk, GatewayError, QUOTA_GUIDANCE};
use crate::session::{SessionError, SourceType};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use time::OffsetDateTime;

/// Progress when a run starts.
pub const PROGRESS_STARTED: u8 = 0;
/// Progress once text has been extracted.
pub const PROGRESS_EXTRACTED: u8 = 50;
/// Progress right before the embedding call.
pub const PROGRESS_EMBEDDING: u8 = 75;
/// Progress once the document is queryable.
pub const PROGRESS_READY: u8 = 100;

/// Stage of a document in the ingestion state machine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Nothing ingested, or reset.
    #[default]
    Idle,
    /// Raw text is being extracted locally.
    Extracting,
    /// The backend is segmenting the text.
    Chunking,
    /// The backend is embedding the chunks.
    Embedding,
    /// The document can be queried.
    Ready,
    /// The last run failed; see [`DocumentState::error`].
    Error,
}

impl DocumentStatus {
    /// Lowercase label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Extracting => "extracting",
            Self::Chunking => "chunking",
            Self::Embedding => "embedding",
            Self::Ready => "ready",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single observable transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DocumentProgress {
    /// Stage entered.
    pub status: DocumentStatus,
    /// Coarse milestone, one of 0, 50, 75, 100.
    pub progress: u8,
}

/// Everything the pipeline knows about the current document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentState {
    /// Source file name; `None` for pasted text.
    pub file_name: Option<String>,
    /// Inferred format; `None` for pasted text or unknown extensions.
    pub file_kind: Option<FileKind>,
    /// Document kind the run was started for.
    pub source_type: Option<SourceType>,
    /// Current stage.
    pub status: DocumentStatus,
    /// Coarse progress marker.
    pub progress: u8,
    /// Normalized extracted text.
    pub raw_text: Option<String>,
    /// Chunks returned by the backend.
    pub chunks: Vec<Chunk>,
    /// Number of chunks reported by the backend.
    pub chunk_count: usize,
    /// When the file was recorded.
    pub uploaded_at: Option<OffsetDateTime>,
    /// Wall time from start of the run to `ready`.
    pub processing_time: Option<Duration>,
    /// Display text of the failure that stopped the last run.
    pub error: Option<String>,
}

impl DocumentState {
    /// Current `(status, progress)` pair.
    pub fn progress(&self) -> DocumentProgress {
        DocumentProgress {
            status: self.status,
            progress: self.progress,
        }
    }

    /// Whether the document can be queried.
    pub fn is_ready(&self) -> bool {
        self.status == DocumentStatus::Ready
    }
}

/// Summary of a successful ingestion run.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestOutcome {
    /// Session the document was ingested into.
    pub session_id: String,
    /// Chunks produced by the backend.
    pub chunk_count: usize,
    /// Vectors stored by the backend.
    pub embedding_count: usize,
    /// Wall time of the run.
    pub processing_time: Duration,
}

/// Errors that stop an ingestion run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Local text extraction failed.
    #[error("Failed to extract text: {0}")]
    Extraction(#[from] ExtractionError),
    /// No session could be created for the document.
    #[error(transparent)]
    Session(#[from] SessionError),
    /// The backend failed to chunk the text.
    #[error("Failed to chunk document: {0}")]
    Chunking(#[source] GatewayError),
    /// The backend failed to embed the chunks.
    #[error("Failed to generate embeddings: {0}")]
    Embedding(#[source] GatewayError),
    /// Another ingestion run has not finished; the current document state is untouched.
    #[error("A document is already being processed. Wait for it to finish before uploading another.")]
    Busy,
    /// The session was cleared or expired while a remote stage was running.
    #[error("Session expired during {stage}. Create a new session and upload the document again.")]
    SessionLost {
        /// Stage that was in flight.
        stage: DocumentStatus,
    },
}

impl PipelineError {
    /// Text stored in [`DocumentState::error`].
    pub fn user_message(&self) -> String {
        match self {
            Self::Chunking(error) | Self::Embedding(error) if error.is_quota() => {
                QUOTA_GUIDANCE.to_string()
            }
            Self::Chunking(error) => format!("Failed to chunk document: {}", error.user_message()),
            Self::Embedding(error) => {
                format!("Failed to generate embeddings: {}", error.user_message())
            }
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn quota_failures_render_guidance() {
        let error = PipelineError::Embedding(GatewayError::Quota {
            status: StatusCode::TOO_MANY_REQUESTS,
            detail: "quota exceeded".into(),
        });
        assert_eq!(error.user_message(), QUOTA_GUIDANCE);

        let error = PipelineError::Chunking(GatewayError::Backend {
            status: StatusCode::BAD_REQUEST,
            detail: "Text is empty".into(),
        });
        assert_eq!(error.user_message(), "Failed to chunk document: Text is empty");
    }

    #[test]
    fn session_lost_names_the_stage() {
        let error = PipelineError::SessionLost {
            stage: DocumentStatus::Embedding,
        };
        assert!(error.user_message().starts_with("Session expired during embedding"));
    }

    #[test]
    fn busy_asks_to_wait() {
        assert!(PipelineError::Busy.user_message().contains("already being processed"));
    }
}
